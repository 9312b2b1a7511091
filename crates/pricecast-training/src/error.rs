//! Errors raised while training, evaluating or serving a sequence model.

use pricecast_checkpoint::CheckpointError;
use pricecast_features::FeatureError;
use pricecast_layers::LayerError;
use pricecast_optimizer::OptimizerError;
use thiserror::Error;

use crate::hooks::HookError;
use crate::model::ModelState;

/// Errors that can occur during training and inference.
#[derive(Debug, Error)]
pub enum TrainingError {
    /// Feature assembly, scaling or windowing failed.
    #[error(transparent)]
    Feature(#[from] FeatureError),

    /// A network layer rejected its input.
    #[error("Layer error: {0}")]
    Layer(#[from] LayerError),

    /// Optimizer construction failed.
    #[error("Optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),

    /// Loading or saving an artifact failed.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// A hook error occurred.
    #[error("Hook error: {0}")]
    Hook(#[from] HookError),

    /// The model was used in a state that does not allow the operation.
    #[error("Model is {actual:?}, operation requires {expected}")]
    InvalidState {
        /// Human-readable list of accepted states.
        expected: &'static str,
        /// State the model was in.
        actual: ModelState,
    },

    /// Training was cancelled between epochs.
    #[error("Training cancelled before epoch {epoch}")]
    Cancelled {
        /// Epoch that would have run next.
        epoch: usize,
    },

    /// Invalid pipeline configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for training operations.
pub type TrainingResult<T> = Result<T, TrainingError>;
