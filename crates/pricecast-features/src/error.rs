//! Error types for feature construction.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading inputs or building features, scalers and windows.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// Not enough rows survive to satisfy the caller's requirement.
    #[error("Insufficient data: need at least {required} rows, have {available}")]
    DataInsufficient {
        /// Minimum number of rows needed.
        required: usize,
        /// Rows actually available.
        available: usize,
    },

    /// The most recent rows are not consecutive in the source series.
    #[error("Latest {length}-row window spans dropped bars between source positions {before} and {after}")]
    WindowGap {
        /// Window length.
        length: usize,
        /// Source position of the row before the gap.
        before: usize,
        /// Source position of the row after the gap.
        after: usize,
    },

    /// A scaler was used before `fit`.
    #[error("Scaler has not been fitted")]
    ScalerNotFitted,

    /// Column layout differs from the one the consumer was built with.
    #[error("Feature schema mismatch: {message}")]
    SchemaMismatch {
        /// What differed.
        message: String,
    },

    /// Malformed input series (ordering, duplicates, non-finite values).
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Description of the problem.
        message: String,
    },

    /// Invalid parameter such as a zero-length period.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// CSV decoding failure.
    #[error("CSV error in {path}: {source}")]
    Csv {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: csv::Error,
    },

    /// File-system failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for feature operations.
pub type FeatureResult<T> = Result<T, FeatureError>;

impl FeatureError {
    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        FeatureError::InvalidInput {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        FeatureError::InvalidConfig {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FeatureError::DataInsufficient {
            required: 61,
            available: 12,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient data: need at least 61 rows, have 12"
        );
        assert!(FeatureError::ScalerNotFitted.to_string().contains("not been fitted"));
    }
}
