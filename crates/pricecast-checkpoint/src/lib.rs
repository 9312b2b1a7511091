//! Model artifact persistence for pricecast.
//!
//! This crate provides functionality for:
//!
//! - **Save/Load**: Persist a trained model's weights, scalers and
//!   configuration as a directory of JSON files and load them back
//! - **Best-weights snapshots**: Write parameter tensors alone during training
//! - **Comparison**: Diff the recorded metrics of two artifacts
//!
//! # Core Components
//!
//! - [`Checkpointer`]: Trait for artifact serialization implementations
//! - [`JsonCheckpointer`]: JSON implementation
//! - [`ModelArtifact`]: Everything inference needs from a training run
//!
//! # Examples
//!
//! ```no_run
//! use pricecast_checkpoint::{Checkpointer, JsonCheckpointer};
//! use std::path::Path;
//!
//! fn main() -> pricecast_checkpoint::Result<()> {
//!     let checkpointer = JsonCheckpointer::new();
//!     let artifact = checkpointer.load(Path::new("models/btc"))?;
//!     println!("trained on {} features", artifact.config.feature_names.len());
//!     Ok(())
//! }
//! ```
//!
//! Loading validates the parts against each other: scaler widths must match
//! the feature count, the target scaler must have one column, and every
//! tensor's data must fill its shape. Any violation is reported as
//! [`CheckpointError::Corrupt`].

pub mod artifact;
pub mod checkpointer;
pub mod compare;

// Re-export main types
pub use artifact::{
    ArtifactConfig, EpochRecord, ModelArtifact, StoredTensor, WeightSet, FORMAT_VERSION,
};
pub use checkpointer::{
    Checkpointer, JsonCheckpointer, CONFIG_FILE, FEATURE_SCALER_FILE, TARGET_SCALER_FILE,
    WEIGHTS_FILE,
};
pub use compare::{compare, MetricDelta, ModelComparison};

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during checkpoint operations.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// I/O error during checkpoint operations.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Artifact directory or weights file not found.
    #[error("Checkpoint not found: {0}")]
    NotFound(PathBuf),

    /// Error during serialization.
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),

    /// Artifact written by an incompatible format version.
    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected version.
        expected: u32,
        /// Found version.
        found: u32,
    },

    /// A part is missing, unreadable, or inconsistent with the others.
    #[error("Corrupt artifact at {path}: {message}")]
    Corrupt {
        /// Offending file or directory.
        path: PathBuf,
        /// What was wrong.
        message: String,
    },
}

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_end_to_end_save_load_compare() {
        let dir = tempdir().unwrap();
        let checkpointer = JsonCheckpointer::pretty();

        let first = artifact::tests::sample_artifact();
        let mut second = first.clone();
        second.config.metrics.insert("rmse".into(), 1.2);

        checkpointer.save(&dir.path().join("a"), &first).unwrap();
        checkpointer.save(&dir.path().join("b"), &second).unwrap();

        let a = checkpointer.load(&dir.path().join("a")).unwrap();
        let b = checkpointer.load(&dir.path().join("b")).unwrap();
        let cmp = compare(&a.config, &b.config);
        assert_eq!(cmp.improvements(), 1);

        let scaler = b.target_scaler(&dir.path().join("b")).unwrap();
        assert_eq!(scaler.inverse_column(&[0.5]).unwrap(), vec![150.0]);
    }

    #[test]
    fn test_error_handling() {
        let checkpointer = JsonCheckpointer::new();
        let err = checkpointer
            .load(std::path::Path::new("/nonexistent/model"))
            .expect_err("loading a missing artifact should fail");
        assert!(
            matches!(
                &err,
                CheckpointError::NotFound(path)
                    if path.to_str().is_some_and(|p| p.contains("nonexistent"))
            ),
            "expected NotFound with the missing path, got: {err:?}"
        );
    }
}
