//! Pipeline configuration.
//!
//! One [`PipelineConfig`] drives feature assembly, training and forecasting.
//! It is read from a JSON file where every field is optional; missing fields
//! take the defaults below.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use pricecast_optimizer::OptimizerConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{TrainingError, TrainingResult};

/// How multi-step forecasts are produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMode {
    /// Repeat the one-step prediction on the same input window.
    #[default]
    Static,
    /// Feed each prediction back as a synthetic bar and re-derive features.
    Recursive,
}

impl std::str::FromStr for ForecastMode {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "static" => Ok(ForecastMode::Static),
            "recursive" => Ok(ForecastMode::Recursive),
            other => Err(TrainingError::Config(format!(
                "unknown forecast mode {other:?} (expected static or recursive)"
            ))),
        }
    }
}

/// Settings for the whole train/evaluate/predict pipeline.
///
/// # Examples
///
/// ```
/// use pricecast_training::PipelineConfig;
///
/// let config = PipelineConfig::default()
///     .with_sequence_length(30)
///     .with_epochs(10);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.lstm_units, vec![128, 64, 32]);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Window length L.
    pub sequence_length: usize,
    /// Forecast horizon in bars.
    pub horizon: usize,
    /// Units of the bidirectional layer and the two stacked LSTMs.
    pub lstm_units: Vec<usize>,
    /// Dropout rate after each recurrent and the first dense layer.
    pub dropout_rate: f32,
    /// Maximum number of epochs.
    pub epochs: usize,
    /// Mini-batch size.
    pub batch_size: usize,
    /// Fraction of windows held out, taken from the end of the series.
    pub validation_split: f64,
    /// Initial Adam learning rate.
    pub learning_rate: f32,
    /// Epochs without validation improvement before stopping.
    pub early_stopping_patience: usize,
    /// Epochs without validation improvement before the learning rate is cut.
    pub lr_patience: usize,
    /// Learning-rate multiplier applied on plateau.
    pub lr_factor: f32,
    /// Lower bound for the learning rate.
    pub min_lr: f32,
    /// Seed for weight initialization, dropout masks and batch order.
    pub seed: u64,
    /// Multi-step forecasting mode.
    pub forecast_mode: ForecastMode,
    /// Ignore bars before this date.
    pub start_date: Option<NaiveDate>,
    /// Where the best weights seen during training are written, if anywhere.
    pub best_weights_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sequence_length: 60,
            horizon: 1,
            lstm_units: vec![128, 64, 32],
            dropout_rate: 0.2,
            epochs: 100,
            batch_size: 32,
            validation_split: 0.2,
            learning_rate: 0.001,
            early_stopping_patience: 15,
            lr_patience: 5,
            lr_factor: 0.5,
            min_lr: 1e-5,
            seed: 42,
            forecast_mode: ForecastMode::Static,
            start_date: None,
            best_weights_path: None,
        }
    }
}

impl PipelineConfig {
    /// Reads a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> TrainingResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            TrainingError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|e| {
            TrainingError::Config(format!("cannot parse {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "Loaded pipeline config");
        Ok(config)
    }

    /// Sets the window length.
    pub fn with_sequence_length(mut self, length: usize) -> Self {
        self.sequence_length = length;
        self
    }

    /// Sets the forecast horizon.
    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }

    /// Sets the recurrent layer widths.
    pub fn with_lstm_units(mut self, units: Vec<usize>) -> Self {
        self.lstm_units = units;
        self
    }

    /// Sets the maximum number of epochs.
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Sets the mini-batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the dropout rate.
    pub fn with_dropout_rate(mut self, rate: f32) -> Self {
        self.dropout_rate = rate;
        self
    }

    /// Sets the validation fraction.
    pub fn with_validation_split(mut self, split: f64) -> Self {
        self.validation_split = split;
        self
    }

    /// Sets the initial learning rate.
    pub fn with_learning_rate(mut self, lr: f32) -> Self {
        self.learning_rate = lr;
        self
    }

    /// Sets the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the forecast mode.
    pub fn with_forecast_mode(mut self, mode: ForecastMode) -> Self {
        self.forecast_mode = mode;
        self
    }

    /// Sets the path for best-weight snapshots.
    pub fn with_best_weights_path(mut self, path: PathBuf) -> Self {
        self.best_weights_path = Some(path);
        self
    }

    /// Optimizer settings derived from this configuration.
    pub fn optimizer(&self) -> OptimizerConfig {
        OptimizerConfig::adam(self.learning_rate)
    }

    /// Rejects values that cannot produce a working pipeline.
    pub fn validate(&self) -> TrainingResult<()> {
        let fail = |msg: String| Err(TrainingError::Config(msg));
        if self.sequence_length == 0 {
            return fail("sequence_length must be at least 1".into());
        }
        if self.horizon == 0 {
            return fail("horizon must be at least 1".into());
        }
        if self.lstm_units.len() != 3 || self.lstm_units.contains(&0) {
            return fail(format!(
                "lstm_units must list three positive widths, got {:?}",
                self.lstm_units
            ));
        }
        if !(0.0..1.0).contains(&self.dropout_rate) {
            return fail(format!("dropout_rate must be in [0, 1), got {}", self.dropout_rate));
        }
        if self.epochs == 0 || self.batch_size == 0 {
            return fail("epochs and batch_size must be at least 1".into());
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return fail(format!(
                "validation_split must be in [0, 1), got {}",
                self.validation_split
            ));
        }
        if !(0.0..1.0).contains(&self.lr_factor) || self.lr_factor == 0.0 {
            return fail(format!("lr_factor must be in (0, 1), got {}", self.lr_factor));
        }
        if self.min_lr < 0.0 || self.min_lr > self.learning_rate {
            return fail(format!(
                "min_lr must be in [0, learning_rate], got {}",
                self.min_lr
            ));
        }
        self.optimizer().validate()?;
        Ok(())
    }
}
