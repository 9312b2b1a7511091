//! Stochastic Gradient Descent (SGD) optimizer.
//!
//! # Example
//!
//! ```
//! use pricecast_optimizer::{Optimizer, Sgd, OptimizerConfig};
//!
//! let mut sgd = Sgd::new(OptimizerConfig::Sgd { learning_rate: 0.01 }).unwrap();
//! let mut bias = vec![1.0, 2.0, 3.0];
//! sgd.apply_gradients(&mut bias, &[0.1, 0.2, 0.3]);
//! ```

use crate::{Optimizer, OptimizerConfig, OptimizerError};
use serde::{Deserialize, Serialize};

/// Stochastic Gradient Descent: `param = param - learning_rate * gradient`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sgd {
    learning_rate: f32,
    config: OptimizerConfig,
}

impl Optimizer for Sgd {
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError> {
        match config {
            OptimizerConfig::Sgd { learning_rate } => Ok(Self {
                learning_rate,
                config,
            }),
            _ => Err(OptimizerError::ConfigMismatch {
                expected: "Sgd".to_string(),
                got: config.name().to_string(),
            }),
        }
    }

    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]) {
        for (p, g) in params.iter_mut().zip(gradients.iter()) {
            *p -= self.learning_rate * g;
        }
    }

    fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sgd_exact_update() {
        let mut sgd = Sgd::new(OptimizerConfig::Sgd { learning_rate: 0.1 }).unwrap();
        let mut params = vec![1.0, 2.0];
        sgd.apply_gradients(&mut params, &[1.0, -2.0]);
        assert!((params[0] - 0.9).abs() < 1e-6);
        assert!((params[1] - 2.2).abs() < 1e-6);
    }

    #[test]
    fn test_sgd_config_mismatch() {
        assert!(Sgd::new(OptimizerConfig::default()).is_err());
    }
}
