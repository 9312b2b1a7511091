//! Training and evaluation metrics.
//!
//! [`EpochMetrics`] is what hooks see after every epoch; [`MetricsRecorder`]
//! accumulates batch losses into those epoch means; [`RegressionMetrics`] is
//! the final quality report in price units.

use std::collections::BTreeMap;

use pricecast_checkpoint::EpochRecord;
use pricecast_features::FeatureError;
use serde::{Deserialize, Serialize};

use crate::error::TrainingResult;
use crate::model::BatchLoss;

/// Metrics for one epoch, in scaled units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// Zero-based epoch.
    pub epoch: usize,
    /// Mean training MSE.
    pub loss: f64,
    /// Mean training MAE.
    pub mae: f64,
    /// Validation MSE, if there is a validation partition.
    pub val_loss: Option<f64>,
    /// Validation MAE.
    pub val_mae: Option<f64>,
    /// Learning rate used during the epoch.
    pub learning_rate: f64,
}

impl EpochMetrics {
    /// Looks up a metric by its Keras-style name.
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "loss" => Some(self.loss),
            "mae" => Some(self.mae),
            "val_loss" => self.val_loss,
            "val_mae" => self.val_mae,
            "lr" | "learning_rate" => Some(self.learning_rate),
            _ => None,
        }
    }
}

impl From<&EpochMetrics> for EpochRecord {
    fn from(m: &EpochMetrics) -> Self {
        EpochRecord {
            epoch: m.epoch,
            loss: m.loss,
            mae: m.mae,
            val_loss: m.val_loss,
            val_mae: m.val_mae,
            learning_rate: m.learning_rate,
        }
    }
}

/// Sample-weighted running means of batch losses.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder {
    sq_sum: f64,
    abs_sum: f64,
    count: usize,
}

impl MetricsRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a batch of `size` samples.
    pub fn record(&mut self, loss: BatchLoss, size: usize) {
        self.sq_sum += loss.mse * size as f64;
        self.abs_sum += loss.mae * size as f64;
        self.count += size;
    }

    /// Number of samples recorded.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Mean MSE and MAE, or `None` when nothing was recorded.
    pub fn mean(&self) -> Option<BatchLoss> {
        (self.count > 0).then(|| BatchLoss {
            mse: self.sq_sum / self.count as f64,
            mae: self.abs_sum / self.count as f64,
        })
    }
}

/// Regression quality in original price units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// Mean squared error.
    pub mse: f64,
    /// Root mean squared error.
    pub rmse: f64,
    /// Mean absolute error.
    pub mae: f64,
    /// Coefficient of determination; 0 when the truth has no variance.
    pub r2: f64,
    /// Mean absolute percentage error (percent), skipping zero truths.
    pub mape: Option<f64>,
}

impl RegressionMetrics {
    /// Computes all metrics from aligned truth and prediction slices.
    ///
    /// # Errors
    ///
    /// `DataInsufficient` for empty input, `InvalidInput` for length mismatch.
    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> TrainingResult<Self> {
        if y_true.len() != y_pred.len() {
            return Err(FeatureError::InvalidInput {
                message: format!(
                    "{} truth values but {} predictions",
                    y_true.len(),
                    y_pred.len()
                ),
            }
            .into());
        }
        if y_true.is_empty() {
            return Err(FeatureError::DataInsufficient {
                required: 1,
                available: 0,
            }
            .into());
        }
        let n = y_true.len() as f64;
        let mse = y_true
            .iter()
            .zip(y_pred)
            .map(|(t, p)| (t - p).powi(2))
            .sum::<f64>()
            / n;
        let mae = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()).sum::<f64>() / n;

        let mean = y_true.iter().sum::<f64>() / n;
        let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
        let r2 = if ss_tot == 0.0 {
            0.0
        } else {
            1.0 - (mse * n) / ss_tot
        };

        let (ape_sum, ape_count) = y_true
            .iter()
            .zip(y_pred)
            .filter(|(t, _)| **t != 0.0)
            .fold((0.0, 0usize), |(s, c), (t, p)| (s + ((t - p) / t).abs(), c + 1));
        let mape = (ape_count > 0).then(|| ape_sum / ape_count as f64 * 100.0);

        Ok(Self {
            mse,
            rmse: mse.sqrt(),
            mae,
            r2,
            mape,
        })
    }

    /// Metrics by name, for storage in an artifact.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::from([
            ("mse".to_string(), self.mse),
            ("rmse".to_string(), self.rmse),
            ("mae".to_string(), self.mae),
            ("r2".to_string(), self.r2),
        ]);
        if let Some(mape) = self.mape {
            map.insert("mape".to_string(), mape);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrainingError;

    #[test]
    fn test_perfect_prediction() {
        let y = [1.0, 2.0, 3.0];
        let m = RegressionMetrics::compute(&y, &y).unwrap();
        assert_eq!(m.mse, 0.0);
        assert_eq!(m.r2, 1.0);
        assert_eq!(m.mape, Some(0.0));
    }

    #[test]
    fn test_known_values() {
        let m = RegressionMetrics::compute(&[100.0, 200.0], &[110.0, 190.0]).unwrap();
        assert!((m.mse - 100.0).abs() < 1e-12);
        assert!((m.rmse - 10.0).abs() < 1e-12);
        assert!((m.mae - 10.0).abs() < 1e-12);
        // ss_tot = 2 * 50^2 = 5000, ss_res = 200.
        assert!((m.r2 - 0.96).abs() < 1e-12);
        // (10% + 5%) / 2
        assert!((m.mape.unwrap() - 7.5).abs() < 1e-12);
    }

    #[test]
    fn test_constant_truth_and_zero_truth() {
        let m = RegressionMetrics::compute(&[0.0, 0.0], &[1.0, -1.0]).unwrap();
        assert_eq!(m.r2, 0.0);
        assert_eq!(m.mape, None);
        assert!(!m.to_map().contains_key("mape"));
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            RegressionMetrics::compute(&[], &[]),
            Err(TrainingError::Feature(FeatureError::DataInsufficient { .. }))
        ));
    }

    #[test]
    fn test_recorder_weights_by_batch_size() {
        let mut rec = MetricsRecorder::new();
        assert!(rec.mean().is_none());
        rec.record(BatchLoss { mse: 1.0, mae: 1.0 }, 3);
        rec.record(BatchLoss { mse: 5.0, mae: 2.0 }, 1);
        let mean = rec.mean().unwrap();
        assert_eq!(rec.count(), 4);
        assert!((mean.mse - 2.0).abs() < 1e-12);
        assert!((mean.mae - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_epoch_metric_lookup() {
        let m = EpochMetrics {
            epoch: 0,
            loss: 0.5,
            mae: 0.4,
            val_loss: None,
            val_mae: None,
            learning_rate: 0.001,
        };
        assert_eq!(m.get("loss"), Some(0.5));
        assert_eq!(m.get("val_loss"), None);
        assert_eq!(m.get("unknown"), None);
        assert_eq!(EpochRecord::from(&m).learning_rate, 0.001);
    }
}
