//! Errors raised by network layers.

use thiserror::Error;

/// Faults in layer construction or in the forward/backward protocol.
#[derive(Debug, Error)]
pub enum LayerError {
    /// A tensor did not have the shape the layer requires.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Required shape
        expected: Vec<usize>,
        /// Shape received
        actual: Vec<usize>,
    },

    /// The feature axis of the input does not match the layer's input width.
    #[error("Input width mismatch: layer takes {expected} features, got {actual}")]
    InvalidInputDimension {
        /// Input width the layer was built for
        expected: usize,
        /// Width of the tensor received
        actual: usize,
    },

    /// Paired sublayers disagree on their output width.
    #[error("Output width mismatch: expected {expected}, got {actual}")]
    InvalidOutputDimension {
        /// Width required by the caller
        expected: usize,
        /// Width the sublayer produces
        actual: usize,
    },

    /// The input has the wrong rank for this layer, e.g. a 2-D tensor fed to
    /// a recurrent layer.
    #[error("Bad layer input: {message}")]
    ForwardError {
        /// What was wrong with the input
        message: String,
    },

    /// `backward` was called without a preceding `forward_train`.
    #[error("No cached activations: forward_train must run before backward")]
    NotInitialized,

    /// A layer was constructed with unusable settings.
    #[error("Invalid layer configuration: {message}")]
    ConfigError {
        /// Which setting was rejected
        message: String,
    },
}

/// Result type alias for layer operations.
pub type LayerResult<T> = Result<T, LayerError>;
