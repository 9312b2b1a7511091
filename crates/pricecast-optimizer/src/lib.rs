//! Gradient-based optimizers for pricecast models.
//!
//! Each optimizer owns the per-element state for ONE parameter tensor and
//! implements the [`Optimizer`] trait. A model keeps one optimizer instance
//! per parameter, created from a shared [`OptimizerConfig`] through
//! [`create_optimizer`].
//!
//! # Available Optimizers
//!
//! - [`Adam`] - Adaptive Moment Estimation (the default)
//! - [`Sgd`] - Plain stochastic gradient descent
//!
//! The learning rate is mutable after construction so that plateau schedulers
//! can decay it between epochs.
//!
//! # Example
//!
//! ```
//! use pricecast_optimizer::{create_optimizer, OptimizerConfig};
//!
//! let mut optimizer = create_optimizer(OptimizerConfig::default()).unwrap();
//! let mut weights = vec![1.0, 2.0, 3.0];
//! optimizer.apply_gradients(&mut weights, &[0.1, 0.2, 0.3]);
//! optimizer.set_learning_rate(optimizer.learning_rate() * 0.5);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod adam;
mod sgd;

pub use adam::Adam;
pub use sgd::Sgd;

/// Errors that can occur when working with optimizers.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Configuration type does not match the optimizer type.
    #[error("Config mismatch: expected {expected}, got {got}")]
    ConfigMismatch { expected: String, got: String },

    /// Invalid configuration parameter.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Configuration for the supported optimizer types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptimizerConfig {
    /// Stochastic Gradient Descent configuration.
    Sgd {
        /// Learning rate for gradient updates.
        learning_rate: f32,
    },
    /// Adam configuration.
    Adam {
        /// Learning rate for gradient updates.
        learning_rate: f32,
        /// Exponential decay rate for first moment estimates.
        beta1: f32,
        /// Exponential decay rate for second moment estimates.
        beta2: f32,
        /// Small constant for numerical stability.
        epsilon: f32,
    },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::adam(0.001)
    }
}

impl OptimizerConfig {
    /// Adam with the usual moment decay rates and the given learning rate.
    pub fn adam(learning_rate: f32) -> Self {
        OptimizerConfig::Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
        }
    }

    /// Returns the name of the optimizer type.
    pub fn name(&self) -> &'static str {
        match self {
            OptimizerConfig::Sgd { .. } => "Sgd",
            OptimizerConfig::Adam { .. } => "Adam",
        }
    }

    /// Returns the initial learning rate.
    pub fn learning_rate(&self) -> f32 {
        match self {
            OptimizerConfig::Sgd { learning_rate } => *learning_rate,
            OptimizerConfig::Adam { learning_rate, .. } => *learning_rate,
        }
    }

    /// Returns a copy with the learning rate replaced.
    pub fn with_learning_rate(mut self, lr: f32) -> Self {
        match &mut self {
            OptimizerConfig::Sgd { learning_rate } => *learning_rate = lr,
            OptimizerConfig::Adam { learning_rate, .. } => *learning_rate = lr,
        }
        self
    }

    /// Checks that every hyperparameter is in range.
    pub fn validate(&self) -> Result<(), OptimizerError> {
        let lr = self.learning_rate();
        if !(lr.is_finite() && lr > 0.0) {
            return Err(OptimizerError::InvalidParameter(format!(
                "learning_rate must be positive, got {lr}"
            )));
        }
        if let OptimizerConfig::Adam {
            beta1,
            beta2,
            epsilon,
            ..
        } = self
        {
            for (name, beta) in [("beta1", beta1), ("beta2", beta2)] {
                if !(0.0..1.0).contains(beta) {
                    return Err(OptimizerError::InvalidParameter(format!(
                        "{name} must be in [0, 1), got {beta}"
                    )));
                }
            }
            if *epsilon <= 0.0 {
                return Err(OptimizerError::InvalidParameter(format!(
                    "epsilon must be positive, got {epsilon}"
                )));
            }
        }
        Ok(())
    }
}

/// Trait for optimization algorithms.
pub trait Optimizer: Sized {
    /// Creates a new optimizer from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizerError::ConfigMismatch`] if the configuration type
    /// does not match the optimizer type.
    fn new(config: OptimizerConfig) -> Result<Self, OptimizerError>;

    /// Applies gradients to update a parameter buffer in place.
    ///
    /// # Panics
    ///
    /// May panic if `params` and `gradients` have different lengths.
    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]);

    /// Returns a reference to the optimizer's configuration.
    fn config(&self) -> &OptimizerConfig;

    /// Returns the current learning rate.
    fn learning_rate(&self) -> f32;

    /// Replaces the learning rate, keeping all accumulated state.
    fn set_learning_rate(&mut self, learning_rate: f32);
}

/// Creates an optimizer from the given configuration.
///
/// # Errors
///
/// Returns [`OptimizerError::InvalidParameter`] if the configuration fails validation.
pub fn create_optimizer(config: OptimizerConfig) -> Result<Box<dyn OptimizerDyn>, OptimizerError> {
    config.validate()?;
    Ok(match &config {
        OptimizerConfig::Sgd { .. } => Box::new(Sgd::new(config)?),
        OptimizerConfig::Adam { .. } => Box::new(Adam::new(config)?),
    })
}

/// Dynamic dispatch version of the Optimizer trait.
pub trait OptimizerDyn: Send + Sync {
    /// Applies gradients to update a parameter buffer in place.
    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]);
    /// Returns a reference to the optimizer's configuration.
    fn config(&self) -> &OptimizerConfig;
    /// Returns the current learning rate.
    fn learning_rate(&self) -> f32;
    /// Replaces the learning rate.
    fn set_learning_rate(&mut self, learning_rate: f32);
}

impl<T: Optimizer + Send + Sync> OptimizerDyn for T {
    fn apply_gradients(&mut self, params: &mut [f32], gradients: &[f32]) {
        Optimizer::apply_gradients(self, params, gradients)
    }

    fn config(&self) -> &OptimizerConfig {
        Optimizer::config(self)
    }

    fn learning_rate(&self) -> f32 {
        Optimizer::learning_rate(self)
    }

    fn set_learning_rate(&mut self, learning_rate: f32) {
        Optimizer::set_learning_rate(self, learning_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimizer_config_name() {
        assert_eq!(OptimizerConfig::Sgd { learning_rate: 0.01 }.name(), "Sgd");
        assert_eq!(OptimizerConfig::default().name(), "Adam");
    }

    #[test]
    fn test_default_is_adam_with_small_learning_rate() {
        let config = OptimizerConfig::default();
        assert!((config.learning_rate() - 0.001).abs() < 1e-9);
    }

    #[test]
    fn test_with_learning_rate() {
        let config = OptimizerConfig::default().with_learning_rate(0.05);
        assert!((config.learning_rate() - 0.05).abs() < 1e-9);
        assert_eq!(config.name(), "Adam");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(OptimizerConfig::Sgd { learning_rate: 0.0 }.validate().is_err());
        let bad_beta = OptimizerConfig::Adam {
            learning_rate: 0.001,
            beta1: 1.0,
            beta2: 0.999,
            epsilon: 1e-7,
        };
        assert!(bad_beta.validate().is_err());
        assert!(create_optimizer(bad_beta).is_err());
    }

    #[test]
    fn test_create_optimizer_updates_params() {
        for config in [OptimizerConfig::Sgd { learning_rate: 0.01 }, OptimizerConfig::default()] {
            let mut optimizer = create_optimizer(config).unwrap();
            let mut params = vec![1.0, 2.0];
            optimizer.apply_gradients(&mut params, &[1.0, 1.0]);
            assert!(params[0] < 1.0);
            assert!(params[1] < 2.0);
        }
    }
}
