//! Adam optimizer.
//!
//! One instance serves one parameter tensor. Moment buffers are sized lazily
//! on the first update. The learning rate is mutable so plateau scheduling can
//! lower it mid-run without losing the moments.
//!
//! # Example
//!
//! ```
//! use pricecast_optimizer::{Optimizer, Adam, OptimizerConfig};
//!
//! let mut adam = Adam::new(OptimizerConfig::adam(0.001)).unwrap();
//! let mut kernel = vec![1.0, 2.0, 3.0];
//! adam.apply_gradients(&mut kernel, &[0.1, 0.2, 0.3]);
//! ```

use crate::{Optimizer, OptimizerConfig, OptimizerError};
use serde::{Deserialize, Serialize};

/// Adam optimizer with adaptive learning rates and momentum.
///
/// Updates parameters using the formula:
/// ```text
/// m = beta1 * m + (1 - beta1) * gradient
/// v = beta2 * v + (1 - beta2) * gradient^2
/// m_hat = m / (1 - beta1^t)
/// v_hat = v / (1 - beta2^t)
/// param = param - learning_rate * m_hat / (sqrt(v_hat) + epsilon)
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adam {
    /// Current learning rate; may be decayed by a scheduler.
    learning_rate: f32,
    /// Exponential decay rate for first moment estimates.
    beta1: f32,
    /// Exponential decay rate for second moment estimates.
    beta2: f32,
    /// Small constant for numerical stability.
    epsilon: f32,
    /// First moment estimates (mean of gradients).
    m: Vec<f32>,
    /// Second moment estimates (mean of squared gradients).
    v: Vec<f32>,
    /// Current timestep for bias correction.
    t: u64,
    /// Configuration used to create this optimizer.
    config: OptimizerConfig,
}

impl Adam {
    /// Returns the current timestep.
    pub fn timestep(&self) -> u64 {
        self.t
    }

    /// Resets the moment estimates and timestep.
    pub fn reset_state(&mut self) {
        self.m.clear();
        self.v.clear();
        self.t = 0;
    }
}

impl Optimizer for Adam {
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError> {
        match config {
            OptimizerConfig::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => Ok(Self {
                learning_rate,
                beta1,
                beta2,
                epsilon,
                m: Vec::new(),
                v: Vec::new(),
                t: 0,
                config,
            }),
            _ => Err(OptimizerError::ConfigMismatch {
                expected: "Adam".to_string(),
                got: config.name().to_string(),
            }),
        }
    }

    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]) {
        if self.m.len() != params.len() {
            self.m = vec![0.0; params.len()];
            self.v = vec![0.0; params.len()];
        }

        self.t += 1;
        let bias_correction1 = 1.0 - self.beta1.powi(self.t as i32);
        let bias_correction2 = 1.0 - self.beta2.powi(self.t as i32);

        for (i, (p, g)) in params.iter_mut().zip(gradients.iter()).enumerate() {
            self.m[i] = self.beta1 * self.m[i] + (1.0 - self.beta1) * g;
            self.v[i] = self.beta2 * self.v[i] + (1.0 - self.beta2) * g * g;

            let m_hat = self.m[i] / bias_correction1;
            let v_hat = self.v[i] / bias_correction2;

            *p -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
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
    fn test_adam_basic_update() {
        let mut adam = Adam::new(OptimizerConfig::adam(0.1)).unwrap();
        let mut params = vec![1.0, 2.0, 3.0];
        adam.apply_gradients(&mut params, &[1.0, 1.0, 1.0]);

        assert!(params[0] < 1.0);
        assert!(params[1] < 2.0);
        assert!(params[2] < 3.0);
    }

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        // After bias correction the first step is lr * g / |g|.
        let mut adam = Adam::new(OptimizerConfig::adam(0.01)).unwrap();
        let mut params = vec![0.0];
        adam.apply_gradients(&mut params, &[5.0]);
        assert!((params[0] + 0.01).abs() < 1e-5);
    }

    #[test]
    fn test_set_learning_rate_keeps_state() {
        let mut adam = Adam::new(OptimizerConfig::adam(0.01)).unwrap();
        let mut params = vec![0.0];
        adam.apply_gradients(&mut params, &[1.0]);
        adam.set_learning_rate(0.005);
        assert_eq!(adam.timestep(), 1);
        assert!((adam.learning_rate() - 0.005).abs() < 1e-9);
        assert!((adam.config().learning_rate() - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_adam_reset_state() {
        let mut adam = Adam::new(OptimizerConfig::adam(0.01)).unwrap();
        let mut params = vec![1.0];
        adam.apply_gradients(&mut params, &[1.0]);
        adam.reset_state();
        assert_eq!(adam.timestep(), 0);
    }

    #[test]
    fn test_adam_config_mismatch() {
        let result = Adam::new(OptimizerConfig::Sgd { learning_rate: 0.01 });
        assert!(matches!(result, Err(OptimizerError::ConfigMismatch { .. })));
    }
}
