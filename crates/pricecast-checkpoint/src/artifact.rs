//! In-memory representation of a trained model artifact.
//!
//! An artifact bundles everything inference needs: named parameter tensors,
//! the fitted feature and target scalers, and the configuration the model was
//! trained with (window length, horizon, layer widths, feature order, metrics).

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use pricecast_features::{FeatureSchema, MinMaxScaler, ScalerState};
use serde::{Deserialize, Serialize};

use crate::{CheckpointError, Result};

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// A parameter tensor in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTensor {
    /// Dimensions.
    pub shape: Vec<usize>,
    /// Flattened values.
    pub data: Vec<f32>,
}

impl StoredTensor {
    /// Creates a stored tensor.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self { shape, data }
    }

    /// Number of elements implied by `shape`.
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Named parameter tensors, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightSet {
    tensors: BTreeMap<String, StoredTensor>,
}

impl WeightSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a tensor.
    pub fn insert(&mut self, name: impl Into<String>, tensor: StoredTensor) {
        self.tensors.insert(name.into(), tensor);
    }

    /// Looks up a tensor by name.
    pub fn get(&self, name: &str) -> Option<&StoredTensor> {
        self.tensors.get(name)
    }

    /// Iterates tensors in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &StoredTensor)> {
        self.tensors.iter()
    }

    /// Number of tensors.
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Total scalar parameter count.
    pub fn total_parameters(&self) -> usize {
        self.tensors.values().map(|t| t.data.len()).sum()
    }

    /// Checks that exactly the `expected` names are present with matching shapes.
    pub fn check_shapes(&self, expected: &BTreeMap<String, Vec<usize>>, path: &Path) -> Result<()> {
        for (name, shape) in expected {
            let tensor = self
                .tensors
                .get(name)
                .ok_or_else(|| corrupt(path, format!("missing parameter tensor {name:?}")))?;
            if &tensor.shape != shape || tensor.data.len() != tensor.numel() {
                return Err(corrupt(
                    path,
                    format!(
                        "parameter {name:?} has shape {:?} with {} values, expected {shape:?}",
                        tensor.shape,
                        tensor.data.len()
                    ),
                ));
            }
        }
        if let Some(extra) = self.tensors.keys().find(|k| !expected.contains_key(*k)) {
            return Err(corrupt(path, format!("unexpected parameter tensor {extra:?}")));
        }
        Ok(())
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.tensors.is_empty() {
            return Err(corrupt(path, "no parameter tensors"));
        }
        for (name, tensor) in &self.tensors {
            if tensor.numel() != tensor.data.len() {
                return Err(corrupt(
                    path,
                    format!(
                        "parameter {name:?} has {} values for shape {:?}",
                        tensor.data.len(),
                        tensor.shape
                    ),
                ));
            }
            if tensor.data.iter().any(|v| !v.is_finite()) {
                return Err(corrupt(path, format!("parameter {name:?} has non-finite values")));
            }
        }
        Ok(())
    }
}

/// One epoch of the training curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// Zero-based epoch.
    pub epoch: usize,
    /// Mean training loss (MSE, scaled units).
    pub loss: f64,
    /// Mean training MAE (scaled units).
    pub mae: f64,
    /// Validation loss, if a validation partition existed.
    pub val_loss: Option<f64>,
    /// Validation MAE.
    pub val_mae: Option<f64>,
    /// Learning rate in effect during the epoch.
    pub learning_rate: f64,
}

/// Training-time configuration and results stored in `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Format version; see [`FORMAT_VERSION`].
    pub format_version: u32,
    /// Window length L.
    pub sequence_length: usize,
    /// Forecast horizon in bars.
    pub horizon: usize,
    /// Units of the three recurrent layers.
    pub lstm_units: Vec<usize>,
    /// Dropout rate used in training.
    pub dropout_rate: f32,
    /// Feature order the model was trained on.
    pub feature_names: Vec<String>,
    /// Final evaluation metrics by name (`mse`, `rmse`, `mae`, `r2`, `mape`).
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    /// Per-epoch history.
    #[serde(default)]
    pub training_curve: Vec<EpochRecord>,
    /// When the artifact was produced.
    pub created_at: DateTime<Utc>,
}

impl ArtifactConfig {
    /// Feature schema recorded in the artifact; `path` labels errors.
    pub fn schema(&self, path: &Path) -> Result<FeatureSchema> {
        FeatureSchema::from_names(self.feature_names.clone())
            .map_err(|e| corrupt(path, e.to_string()))
    }
}

/// Weights, scalers and configuration of one trained model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    /// Parameter tensors.
    pub weights: WeightSet,
    /// Statistics of the feature scaler.
    pub feature_scaler: ScalerState,
    /// Statistics of the target scaler (one column).
    pub target_scaler: ScalerState,
    /// Configuration and results.
    pub config: ArtifactConfig,
}

impl ModelArtifact {
    /// Checks the parts against each other.
    ///
    /// `path` is only used for error reporting.
    pub fn validate(&self, path: &Path) -> Result<()> {
        if self.config.format_version != FORMAT_VERSION {
            return Err(CheckpointError::VersionMismatch {
                expected: FORMAT_VERSION,
                found: self.config.format_version,
            });
        }
        let features = self.config.feature_names.len();
        if features == 0 {
            return Err(corrupt(path, "no feature names"));
        }
        FeatureSchema::from_names(self.config.feature_names.clone())
            .map_err(|e| corrupt(path, e.to_string()))?;
        if self.config.sequence_length == 0 || self.config.horizon == 0 {
            return Err(corrupt(path, "sequence_length and horizon must be positive"));
        }
        if self.config.lstm_units.len() != 3 || self.config.lstm_units.contains(&0) {
            return Err(corrupt(
                path,
                format!("expected three non-zero lstm_units, got {:?}", self.config.lstm_units),
            ));
        }
        self.feature_scaler
            .validate()
            .map_err(|e| corrupt(path, format!("feature scaler: {e}")))?;
        self.target_scaler
            .validate()
            .map_err(|e| corrupt(path, format!("target scaler: {e}")))?;
        if self.feature_scaler.n_features() != features {
            return Err(corrupt(
                path,
                format!(
                    "feature scaler has {} columns for {features} features",
                    self.feature_scaler.n_features()
                ),
            ));
        }
        if self.target_scaler.n_features() != 1 {
            return Err(corrupt(
                path,
                format!(
                    "target scaler has {} columns, expected 1",
                    self.target_scaler.n_features()
                ),
            ));
        }
        self.weights.validate(path)
    }

    /// Restores the feature scaler.
    pub fn feature_scaler(&self, path: &Path) -> Result<MinMaxScaler> {
        MinMaxScaler::from_state(self.feature_scaler.clone())
            .map_err(|e| corrupt(path, format!("feature scaler: {e}")))
    }

    /// Restores the target scaler.
    pub fn target_scaler(&self, path: &Path) -> Result<MinMaxScaler> {
        MinMaxScaler::from_state(self.target_scaler.clone())
            .map_err(|e| corrupt(path, format!("target scaler: {e}")))
    }
}

pub(crate) fn corrupt(path: &Path, message: impl Into<String>) -> CheckpointError {
    CheckpointError::Corrupt {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A small artifact with two features and one dense parameter pair.
    pub(crate) fn sample_artifact() -> ModelArtifact {
        let mut weights = WeightSet::new();
        weights.insert("dense/kernel", StoredTensor::new(vec![2, 1], vec![0.5, -0.25]));
        weights.insert("dense/bias", StoredTensor::new(vec![1], vec![0.1]));
        ModelArtifact {
            weights,
            feature_scaler: ScalerState {
                min: vec![0.0, 10.0],
                max: vec![1.0, 20.0],
            },
            target_scaler: ScalerState {
                min: vec![100.0],
                max: vec![200.0],
            },
            config: ArtifactConfig {
                format_version: FORMAT_VERSION,
                sequence_length: 5,
                horizon: 1,
                lstm_units: vec![8, 4, 2],
                dropout_rate: 0.2,
                feature_names: vec!["close".into(), "volume".into()],
                metrics: BTreeMap::from([("rmse".to_string(), 1.5), ("r2".to_string(), 0.8)]),
                training_curve: vec![EpochRecord {
                    epoch: 0,
                    loss: 0.1,
                    mae: 0.2,
                    val_loss: Some(0.15),
                    val_mae: Some(0.25),
                    learning_rate: 0.001,
                }],
                created_at: Utc::now(),
            },
        }
    }

    #[test]
    fn test_sample_is_valid() {
        sample_artifact().validate(Path::new("mem")).unwrap();
    }

    #[test]
    fn test_scaler_width_mismatch_is_corrupt() {
        let mut artifact = sample_artifact();
        artifact.feature_scaler.min.push(0.0);
        artifact.feature_scaler.max.push(1.0);
        assert!(matches!(
            artifact.validate(Path::new("mem")),
            Err(CheckpointError::Corrupt { .. })
        ));

        let mut artifact = sample_artifact();
        artifact.target_scaler = artifact.feature_scaler.clone();
        assert!(artifact.validate(Path::new("mem")).is_err());
    }

    #[test]
    fn test_unusable_parts_report_path() {
        let mut artifact = sample_artifact();
        artifact.target_scaler.min = vec![f64::NAN];
        let err = artifact.target_scaler(Path::new("models/btc")).unwrap_err();
        assert!(matches!(
            &err,
            CheckpointError::Corrupt { path, message }
                if path == Path::new("models/btc") && message.starts_with("target scaler")
        ));

        artifact.config.feature_names.push("close".into());
        assert!(matches!(
            artifact.config.schema(Path::new("models/btc")),
            Err(CheckpointError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_tensor_length_mismatch_is_corrupt() {
        let mut artifact = sample_artifact();
        artifact
            .weights
            .insert("dense/bias", StoredTensor::new(vec![2], vec![0.1]));
        let err = artifact.validate(Path::new("mem")).unwrap_err();
        assert!(err.to_string().contains("dense/bias"));
    }

    #[test]
    fn test_version_mismatch() {
        let mut artifact = sample_artifact();
        artifact.config.format_version = 99;
        assert!(matches!(
            artifact.validate(Path::new("mem")),
            Err(CheckpointError::VersionMismatch { expected: 1, found: 99 })
        ));
    }

    #[test]
    fn test_check_shapes() {
        let artifact = sample_artifact();
        let mut expected = BTreeMap::new();
        expected.insert("dense/kernel".to_string(), vec![2, 1]);
        expected.insert("dense/bias".to_string(), vec![1]);
        let path = Path::new("mem");
        artifact.weights.check_shapes(&expected, path).unwrap();

        expected.insert("dense/kernel".to_string(), vec![3, 1]);
        assert!(artifact.weights.check_shapes(&expected, path).is_err());

        expected.remove("dense/kernel");
        let err = artifact.weights.check_shapes(&expected, path).unwrap_err();
        assert!(err.to_string().contains("unexpected"));
    }
}
