//! Training loop.
//!
//! The trainer turns an [`AssembledDataset`] into a trained model:
//!
//! 1. enumerate gap-free windows of `sequence_length` rows
//! 2. split them by position, the last `validation_split` fraction held out
//! 3. fit the feature and target scalers on the training partition only
//! 4. run epochs of shuffled mini-batches over the training partition,
//!    scoring the validation partition after each epoch and consulting hooks
//! 5. score the final model in price units
//!
//! Batch order is shuffled within the training partition with a seeded RNG;
//! the partition boundary itself is never crossed.

use std::path::PathBuf;

use chrono::Utc;
use pricecast_checkpoint::{ArtifactConfig, EpochRecord, ModelArtifact, FORMAT_VERSION};
use pricecast_features::{
    AssembledDataset, FeatureError, FeatureSchema, MinMaxScaler, SequenceWindower,
};
use pricecast_layers::Tensor;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{info, warn};

use crate::cancel::CancellationToken;
use crate::config::PipelineConfig;
use crate::error::{TrainingError, TrainingResult};
use crate::evaluator::Evaluator;
use crate::hooks::{
    BestCheckpointHook, EarlyStoppingHook, Hook, HookAction, HookList, LoggingHook,
    ReduceLrOnPlateauHook,
};
use crate::metrics::{EpochMetrics, MetricsRecorder, RegressionMetrics};
use crate::model::{ModelSpec, SequenceModel};

/// Splits `n` windows into `(train, validation)` counts.
///
/// The training partition is the first `floor(n * (1 - validation_split))`
/// windows.
pub fn chronological_split(n: usize, validation_split: f64) -> (usize, usize) {
    let train = ((n as f64) * (1.0 - validation_split)).floor() as usize;
    let train = train.min(n);
    (train, n - train)
}

/// Summary of a training run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    /// Metrics of every completed epoch.
    pub history: Vec<EpochMetrics>,
    /// Final scores in price units.
    pub metrics: RegressionMetrics,
    /// Training windows.
    pub train_samples: usize,
    /// Validation windows.
    pub val_samples: usize,
    /// Whether a hook ended the run before the epoch limit.
    pub stopped_early: bool,
    /// Epoch with the best monitored value.
    pub best_epoch: Option<usize>,
}

/// A trained model with the scalers and schema it depends on.
#[derive(Debug)]
pub struct TrainedPipeline {
    /// The model, in the `Trained` state.
    pub model: SequenceModel,
    /// Feature scaler fitted on the training partition.
    pub feature_scaler: MinMaxScaler,
    /// Target scaler fitted on the training targets.
    pub target_scaler: MinMaxScaler,
    /// Column order of the inputs.
    pub schema: FeatureSchema,
    /// Configuration the run used.
    pub config: PipelineConfig,
    /// Run summary.
    pub report: TrainingReport,
}

impl TrainedPipeline {
    /// Packages the run for persistence.
    pub fn to_artifact(&self) -> TrainingResult<ModelArtifact> {
        let feature_scaler = self
            .feature_scaler
            .state()
            .ok_or(FeatureError::ScalerNotFitted)?
            .clone();
        let target_scaler = self
            .target_scaler
            .state()
            .ok_or(FeatureError::ScalerNotFitted)?
            .clone();
        Ok(ModelArtifact {
            weights: self.model.weights(),
            feature_scaler,
            target_scaler,
            config: ArtifactConfig {
                format_version: FORMAT_VERSION,
                sequence_length: self.config.sequence_length,
                horizon: self.config.horizon,
                lstm_units: self.config.lstm_units.clone(),
                dropout_rate: self.config.dropout_rate,
                feature_names: self.schema.names().to_vec(),
                metrics: self.report.metrics.to_map(),
                training_curve: self.report.history.iter().map(EpochRecord::from).collect(),
                created_at: Utc::now(),
            },
        })
    }
}

/// Stacks windows ending at `ends` into a `[B, L, F]` tensor.
pub(crate) fn window_tensor(rows: &[Vec<f64>], ends: &[usize], length: usize) -> Tensor {
    let width = rows.first().map_or(0, Vec::len);
    let mut data = Vec::with_capacity(ends.len() * length * width);
    for &end in ends {
        for row in &rows[end - length..end] {
            data.extend(row.iter().map(|&v| v as f32));
        }
    }
    Tensor::from_data(&[ends.len(), length, width], data)
}

fn target_tensor(targets: &[f64], ends: &[usize]) -> Tensor {
    let data = ends.iter().map(|&i| targets[i] as f32).collect();
    Tensor::from_data(&[ends.len(), 1], data)
}

/// Runs training for one [`PipelineConfig`].
///
/// A trainer owns its hooks, and hooks carry per-run state; use a fresh
/// trainer for each run.
pub struct Trainer {
    config: PipelineConfig,
    hooks: HookList,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Trainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trainer")
            .field("config", &self.config)
            .field("hooks", &self.hooks.names())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl Trainer {
    /// Creates a trainer with the standard hooks: per-epoch logging, early
    /// stopping with best-weight restore, learning-rate reduction on plateau,
    /// and best-weight snapshots when `best_weights_path` is set.
    pub fn new(config: PipelineConfig) -> TrainingResult<Self> {
        let mut trainer = Self::without_default_hooks(config)?;
        let monitor = trainer.monitored_metric();
        let c = &trainer.config;
        let early = EarlyStoppingHook::new(monitor, c.early_stopping_patience, 0.0)
            .with_restore_best_weights(true);
        let plateau = ReduceLrOnPlateauHook::new(monitor, c.lr_factor, c.lr_patience, c.min_lr);
        let best: Option<PathBuf> = c.best_weights_path.clone();

        trainer.hooks.add(LoggingHook::new(1));
        if let Some(path) = best {
            trainer.hooks.add(BestCheckpointHook::new(path, monitor));
        }
        trainer.hooks.add(early);
        trainer.hooks.add(plateau);
        Ok(trainer)
    }

    /// Creates a trainer with no hooks.
    pub fn without_default_hooks(config: PipelineConfig) -> TrainingResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            hooks: HookList::new(),
            cancel: CancellationToken::new(),
        })
    }

    /// Uses `token` to stop the run between epochs.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Adds a hook after the existing ones.
    pub fn add_hook<H: Hook + 'static>(&mut self, hook: H) {
        self.hooks.add(hook);
    }

    /// Configuration in use.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn monitored_metric(&self) -> &'static str {
        if self.config.validation_split > 0.0 {
            "val_loss"
        } else {
            "loss"
        }
    }

    /// Trains a model on `dataset`.
    ///
    /// # Errors
    ///
    /// * [`TrainingError::Config`] if the dataset's horizon differs from the config
    /// * `DataInsufficient` if no training window can be formed
    /// * [`TrainingError::Cancelled`] if the cancellation token fired
    pub fn fit(&mut self, dataset: &AssembledDataset) -> TrainingResult<TrainedPipeline> {
        let config = self.config.clone();
        if dataset.horizon() != config.horizon {
            return Err(TrainingError::Config(format!(
                "dataset horizon {} differs from configured horizon {}",
                dataset.horizon(),
                config.horizon
            )));
        }
        let length = config.sequence_length;
        let frame = dataset.frame();
        let rows = frame.rows();
        let targets = dataset.target_prices();

        let windower = SequenceWindower::new(length)?;
        let ends = windower.window_ends(frame.positions());
        let (n_train, n_val) = chronological_split(ends.len(), config.validation_split);
        if n_train == 0 {
            return Err(FeatureError::DataInsufficient {
                required: length + 1,
                available: rows.len(),
            }
            .into());
        }
        let (train_ends, val_ends) = ends.split_at(n_train);

        let mut feature_scaler = MinMaxScaler::new();
        feature_scaler.fit(&rows[..train_ends[n_train - 1]])?;
        let mut target_scaler = MinMaxScaler::new();
        let train_targets: Vec<f64> = train_ends.iter().map(|&i| targets[i]).collect();
        target_scaler.fit_column(&train_targets)?;

        let x = feature_scaler.transform(rows)?;
        let y = target_scaler.transform_column(&targets)?;

        let mut model = SequenceModel::new(ModelSpec::from_config(&config)?);
        model.build(frame.schema().len())?;
        model.begin_training()?;

        info!(
            rows = rows.len(),
            windows = ends.len(),
            train = n_train,
            validation = n_val,
            epochs = config.epochs,
            batch_size = config.batch_size,
            "Starting training"
        );

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut order: Vec<usize> = train_ends.to_vec();
        let mut history: Vec<EpochMetrics> = Vec::new();
        let mut stopped_early = false;

        for epoch in 0..config.epochs {
            if self.cancel.is_cancelled() {
                model.cancel_training()?;
                warn!(epoch, "Training cancelled");
                return Err(TrainingError::Cancelled { epoch });
            }
            self.hooks.before_epoch(epoch)?;
            let learning_rate = f64::from(model.learning_rate());

            order.shuffle(&mut rng);
            let mut train_rec = MetricsRecorder::new();
            for batch in order.chunks(config.batch_size) {
                let loss = model.train_batch(
                    &window_tensor(&x, batch, length),
                    &target_tensor(&y, batch),
                )?;
                train_rec.record(loss, batch.len());
            }

            let mut val_rec = MetricsRecorder::new();
            for batch in val_ends.chunks(config.batch_size) {
                let loss = model.evaluate_batch(
                    &window_tensor(&x, batch, length),
                    &target_tensor(&y, batch),
                )?;
                val_rec.record(loss, batch.len());
            }

            let train_mean = train_rec.mean().ok_or(FeatureError::DataInsufficient {
                required: 1,
                available: 0,
            })?;
            let val_mean = val_rec.mean();
            let metrics = EpochMetrics {
                epoch,
                loss: train_mean.mse,
                mae: train_mean.mae,
                val_loss: val_mean.map(|m| m.mse),
                val_mae: val_mean.map(|m| m.mae),
                learning_rate,
            };
            let action = self.hooks.after_epoch(&metrics, &mut model)?;
            history.push(metrics);
            if action == HookAction::Stop {
                model.mark_stopped_early()?;
                stopped_early = true;
                break;
            }
        }

        self.hooks.end(&mut model, history.last())?;
        model.finish_training()?;

        let eval_ends = if val_ends.is_empty() {
            warn!("No validation windows; reporting metrics on the training partition");
            train_ends
        } else {
            val_ends
        };
        let mut predictions = Vec::with_capacity(eval_ends.len());
        for batch in eval_ends.chunks(config.batch_size) {
            predictions.extend(
                model
                    .predict(&window_tensor(&x, batch, length))?
                    .into_iter()
                    .map(f64::from),
            );
        }
        let truth: Vec<f64> = eval_ends.iter().map(|&i| targets[i]).collect();
        let metrics = Evaluator::new(&target_scaler).evaluate_against_prices(&predictions, &truth)?;

        let monitor = self.monitored_metric();
        let best_epoch = history
            .iter()
            .filter_map(|m| m.get(monitor).map(|v| (m.epoch, v)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(epoch, _)| epoch);

        info!(
            epochs = history.len(),
            stopped_early,
            best_epoch = ?best_epoch,
            rmse = metrics.rmse,
            "Training complete"
        );

        Ok(TrainedPipeline {
            model,
            feature_scaler,
            target_scaler,
            schema: frame.schema().clone(),
            config,
            report: TrainingReport {
                history,
                metrics,
                train_samples: n_train,
                val_samples: n_val,
                stopped_early,
                best_epoch,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chronological_split() {
        assert_eq!(chronological_split(100, 0.2), (80, 20));
        assert_eq!(chronological_split(9, 0.2), (7, 2));
        assert_eq!(chronological_split(5, 0.0), (5, 0));
        assert_eq!(chronological_split(0, 0.2), (0, 0));
    }

    #[test]
    fn test_window_tensor_layout() {
        let rows: Vec<Vec<f64>> = (0..6).map(|i| vec![i as f64, -(i as f64)]).collect();
        let t = window_tensor(&rows, &[3, 5], 2);
        assert_eq!(t.shape(), &[2, 2, 2]);
        assert_eq!(t.data(), &[1.0, -1.0, 2.0, -2.0, 3.0, -3.0, 4.0, -4.0]);

        let y = target_tensor(&[0.0, 1.0, 2.0, 3.0], &[3, 1]);
        assert_eq!(y.data(), &[3.0, 1.0]);
    }
}
