//! Saving and loading model artifacts.
//!
//! An artifact directory holds four JSON files that are always written and
//! read together:
//!
//! | file                  | content                           |
//! |-----------------------|-----------------------------------|
//! | `weights.json`        | named parameter tensors           |
//! | `feature_scaler.json` | feature min/max statistics        |
//! | `target_scaler.json`  | target min/max statistics         |
//! | `config.json`         | training configuration and results |

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::artifact::{corrupt, ModelArtifact, WeightSet};
use crate::{CheckpointError, Result};

/// File holding the parameter tensors.
pub const WEIGHTS_FILE: &str = "weights.json";
/// File holding the feature scaler.
pub const FEATURE_SCALER_FILE: &str = "feature_scaler.json";
/// File holding the target scaler.
pub const TARGET_SCALER_FILE: &str = "target_scaler.json";
/// File holding the configuration.
pub const CONFIG_FILE: &str = "config.json";

/// Persists and restores [`ModelArtifact`]s.
pub trait Checkpointer: Send + Sync {
    /// Writes every part of `artifact` into `dir`, creating it if needed.
    fn save(&self, dir: &Path, artifact: &ModelArtifact) -> Result<()>;

    /// Reads and validates an artifact from `dir`.
    ///
    /// # Errors
    ///
    /// [`CheckpointError::NotFound`] if `dir` does not exist,
    /// [`CheckpointError::Corrupt`] if any part is missing, unreadable or
    /// inconsistent with the others.
    fn load(&self, dir: &Path) -> Result<ModelArtifact>;

    /// Writes only parameter tensors to a single file.
    fn save_weights(&self, path: &Path, weights: &WeightSet) -> Result<()>;

    /// Reads parameter tensors written by [`save_weights`](Self::save_weights).
    fn load_weights(&self, path: &Path) -> Result<WeightSet>;
}

/// JSON implementation of [`Checkpointer`].
#[derive(Debug, Clone, Default)]
pub struct JsonCheckpointer {
    /// Whether to pretty-print JSON output.
    pub pretty: bool,
}

impl JsonCheckpointer {
    /// Compact output.
    pub fn new() -> Self {
        Self { pretty: false }
    }

    /// Indented output, easier to inspect by hand.
    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        }
        .map_err(CheckpointError::Serialization)?;
        fs::write(path, json).map_err(|e| CheckpointError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
        if !path.is_file() {
            return Err(corrupt(path, "missing artifact part"));
        }
        let json = fs::read_to_string(path).map_err(|e| CheckpointError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| corrupt(path, e.to_string()))
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| CheckpointError::Io {
        path: dir.to_path_buf(),
        source: e,
    })
}

impl Checkpointer for JsonCheckpointer {
    fn save(&self, dir: &Path, artifact: &ModelArtifact) -> Result<()> {
        tracing::info!(
            path = %dir.display(),
            tensors = artifact.weights.len(),
            features = artifact.config.feature_names.len(),
            "Saving model artifact"
        );
        artifact.validate(dir)?;
        ensure_dir(dir)?;

        self.write_json(&dir.join(WEIGHTS_FILE), &artifact.weights)?;
        self.write_json(&dir.join(FEATURE_SCALER_FILE), &artifact.feature_scaler)?;
        self.write_json(&dir.join(TARGET_SCALER_FILE), &artifact.target_scaler)?;
        self.write_json(&dir.join(CONFIG_FILE), &artifact.config)?;

        tracing::debug!(
            path = %dir.display(),
            parameters = artifact.weights.total_parameters(),
            "Model artifact saved"
        );
        Ok(())
    }

    fn load(&self, dir: &Path) -> Result<ModelArtifact> {
        tracing::info!(path = %dir.display(), "Loading model artifact");

        if !dir.is_dir() {
            return Err(CheckpointError::NotFound(dir.to_path_buf()));
        }

        let artifact = ModelArtifact {
            weights: Self::read_json(&dir.join(WEIGHTS_FILE))?,
            feature_scaler: Self::read_json(&dir.join(FEATURE_SCALER_FILE))?,
            target_scaler: Self::read_json(&dir.join(TARGET_SCALER_FILE))?,
            config: Self::read_json(&dir.join(CONFIG_FILE))?,
        };
        artifact.validate(dir)?;

        tracing::info!(
            path = %dir.display(),
            tensors = artifact.weights.len(),
            sequence_length = artifact.config.sequence_length,
            horizon = artifact.config.horizon,
            "Model artifact loaded"
        );
        Ok(artifact)
    }

    fn save_weights(&self, path: &Path, weights: &WeightSet) -> Result<()> {
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        self.write_json(path, weights)?;
        tracing::debug!(path = %path.display(), tensors = weights.len(), "Weights saved");
        Ok(())
    }

    fn load_weights(&self, path: &Path) -> Result<WeightSet> {
        if !path.exists() {
            return Err(CheckpointError::NotFound(path.to_path_buf()));
        }
        Self::read_json(path)
    }
}
