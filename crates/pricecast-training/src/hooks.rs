//! Training hooks for customizing the training loop.
//!
//! Hooks run after every epoch with that epoch's metrics and mutable access
//! to the model, which lets them snapshot or restore weights and adjust the
//! learning rate. Any hook can end the run by returning [`HookAction::Stop`].

use std::path::{Path, PathBuf};

use pricecast_checkpoint::{CheckpointError, Checkpointer, JsonCheckpointer, WeightSet};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::metrics::EpochMetrics;
use crate::model::SequenceModel;

/// Errors that can occur during hook execution.
#[derive(Debug, Error)]
pub enum HookError {
    /// Writing a weight snapshot failed.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// A custom hook error.
    #[error("Hook error: {0}")]
    Custom(String),
}

/// Result type for hook operations.
pub type HookResult<T> = Result<T, HookError>;

/// Action to take after a hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    /// Continue training normally.
    Continue,
    /// Stop training early.
    Stop,
}

/// Trait for training hooks.
///
/// # Examples
///
/// ```
/// use pricecast_training::hooks::{Hook, HookAction, HookResult};
/// use pricecast_training::metrics::EpochMetrics;
/// use pricecast_training::model::SequenceModel;
///
/// struct PrintLoss;
///
/// impl Hook for PrintLoss {
///     fn name(&self) -> &str {
///         "print_loss"
///     }
///
///     fn after_epoch(
///         &mut self,
///         metrics: &EpochMetrics,
///         _model: &mut SequenceModel,
///     ) -> HookResult<HookAction> {
///         println!("epoch {}: loss = {}", metrics.epoch, metrics.loss);
///         Ok(HookAction::Continue)
///     }
/// }
/// ```
pub trait Hook: Send + Sync {
    /// Returns the name of this hook for logging purposes.
    fn name(&self) -> &str;

    /// Called before each epoch.
    fn before_epoch(&mut self, _epoch: usize) -> HookResult<()> {
        Ok(())
    }

    /// Called after each epoch.
    fn after_epoch(
        &mut self,
        _metrics: &EpochMetrics,
        _model: &mut SequenceModel,
    ) -> HookResult<HookAction> {
        Ok(HookAction::Continue)
    }

    /// Called once when the run ends, normally or early.
    fn end(&mut self, _model: &mut SequenceModel, _last: Option<&EpochMetrics>) -> HookResult<()> {
        Ok(())
    }
}

/// Logs epoch metrics at regular intervals.
#[derive(Debug)]
pub struct LoggingHook {
    every_n_epochs: usize,
}

impl LoggingHook {
    /// Logs every `every_n_epochs` epochs (and always the first).
    pub fn new(every_n_epochs: usize) -> Self {
        Self {
            every_n_epochs: every_n_epochs.max(1),
        }
    }
}

impl Hook for LoggingHook {
    fn name(&self) -> &str {
        "logging_hook"
    }

    fn after_epoch(
        &mut self,
        metrics: &EpochMetrics,
        _model: &mut SequenceModel,
    ) -> HookResult<HookAction> {
        if metrics.epoch % self.every_n_epochs == 0 {
            info!(
                epoch = metrics.epoch,
                loss = metrics.loss,
                mae = metrics.mae,
                val_loss = ?metrics.val_loss,
                val_mae = ?metrics.val_mae,
                lr = metrics.learning_rate,
                "Epoch finished"
            );
        }
        Ok(HookAction::Continue)
    }

    fn end(&mut self, _model: &mut SequenceModel, last: Option<&EpochMetrics>) -> HookResult<()> {
        match last {
            Some(m) => info!(epochs = m.epoch + 1, final_loss = m.loss, "Training finished"),
            None => info!("Training finished without completing an epoch"),
        }
        Ok(())
    }
}

/// Tracks the best value of a monitored metric.
#[derive(Debug, Clone)]
struct Monitor {
    metric_name: String,
    min_delta: f64,
    lower_is_better: bool,
    best_value: Option<f64>,
}

impl Monitor {
    fn new(metric_name: impl Into<String>, min_delta: f64) -> Self {
        let metric_name = metric_name.into();
        let lower_is_better = metric_name.ends_with("loss") || metric_name.ends_with("mae");
        Self {
            metric_name,
            min_delta,
            lower_is_better,
            best_value: None,
        }
    }

    fn value(&self, hook: &str, metrics: &EpochMetrics) -> Option<f64> {
        let value = metrics.get(&self.metric_name);
        if value.is_none() {
            warn!(hook, metric = %self.metric_name, "Monitored metric not found in epoch metrics");
        }
        value
    }

    fn is_improvement(&self, current: f64) -> bool {
        match self.best_value {
            None => true,
            Some(best) => {
                if self.lower_is_better {
                    current < best - self.min_delta
                } else {
                    current > best + self.min_delta
                }
            }
        }
    }
}

/// Writes the model's weights whenever the monitored metric improves.
pub struct BestCheckpointHook {
    path: PathBuf,
    monitor: Monitor,
    checkpointer: JsonCheckpointer,
}

impl std::fmt::Debug for BestCheckpointHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BestCheckpointHook")
            .field("path", &self.path)
            .field("metric", &self.monitor.metric_name)
            .field("best", &self.monitor.best_value)
            .finish()
    }
}

impl BestCheckpointHook {
    /// Saves to `path` each time `metric_name` improves.
    pub fn new(path: PathBuf, metric_name: impl Into<String>) -> Self {
        Self {
            path,
            monitor: Monitor::new(metric_name, 0.0),
            checkpointer: JsonCheckpointer::new(),
        }
    }

    /// Destination file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Hook for BestCheckpointHook {
    fn name(&self) -> &str {
        "best_checkpoint_hook"
    }

    fn after_epoch(
        &mut self,
        metrics: &EpochMetrics,
        model: &mut SequenceModel,
    ) -> HookResult<HookAction> {
        let Some(current) = self.monitor.value(self.name(), metrics) else {
            return Ok(HookAction::Continue);
        };
        if self.monitor.is_improvement(current) {
            self.checkpointer.save_weights(&self.path, &model.weights())?;
            info!(
                epoch = metrics.epoch,
                metric = %self.monitor.metric_name,
                value = current,
                path = %self.path.display(),
                "Saved best weights"
            );
            self.monitor.best_value = Some(current);
        }
        Ok(HookAction::Continue)
    }
}

/// Stops training when a metric stops improving.
///
/// With `restore_best_weights`, the weights from the best epoch are loaded
/// back into the model when the run ends.
#[derive(Debug)]
pub struct EarlyStoppingHook {
    monitor: Monitor,
    patience: usize,
    restore_best_weights: bool,
    best_epoch: Option<usize>,
    best_weights: Option<WeightSet>,
    epochs_without_improvement: usize,
}

impl EarlyStoppingHook {
    /// Creates a new early stopping hook.
    ///
    /// * `metric_name` - metric to monitor (`val_loss`, `loss`, ...)
    /// * `patience` - epochs to wait for improvement before stopping
    /// * `min_delta` - minimum change to qualify as an improvement
    pub fn new(metric_name: impl Into<String>, patience: usize, min_delta: f64) -> Self {
        Self {
            monitor: Monitor::new(metric_name, min_delta),
            patience,
            restore_best_weights: false,
            best_epoch: None,
            best_weights: None,
            epochs_without_improvement: 0,
        }
    }

    /// Keeps a copy of the best weights and restores it at the end.
    pub fn with_restore_best_weights(mut self, restore: bool) -> Self {
        self.restore_best_weights = restore;
        self
    }

    /// Epoch with the best monitored value so far.
    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }
}

impl Hook for EarlyStoppingHook {
    fn name(&self) -> &str {
        "early_stopping_hook"
    }

    fn after_epoch(
        &mut self,
        metrics: &EpochMetrics,
        model: &mut SequenceModel,
    ) -> HookResult<HookAction> {
        let Some(current) = self.monitor.value(self.name(), metrics) else {
            return Ok(HookAction::Continue);
        };

        if self.monitor.is_improvement(current) {
            debug!(
                metric = %self.monitor.metric_name,
                previous = ?self.monitor.best_value,
                current,
                epoch = metrics.epoch,
                "EarlyStoppingHook: improvement"
            );
            self.monitor.best_value = Some(current);
            self.best_epoch = Some(metrics.epoch);
            self.epochs_without_improvement = 0;
            if self.restore_best_weights {
                self.best_weights = Some(model.weights());
            }
        } else {
            self.epochs_without_improvement += 1;
            debug!(
                waited = self.epochs_without_improvement,
                patience = self.patience,
                "EarlyStoppingHook: no improvement"
            );
            if self.epochs_without_improvement >= self.patience {
                info!(
                    epoch = metrics.epoch,
                    best_epoch = ?self.best_epoch,
                    "EarlyStoppingHook: stopping early"
                );
                return Ok(HookAction::Stop);
            }
        }
        Ok(HookAction::Continue)
    }

    fn end(&mut self, model: &mut SequenceModel, last: Option<&EpochMetrics>) -> HookResult<()> {
        let (Some(best), Some(weights)) = (self.best_epoch, self.best_weights.as_ref()) else {
            return Ok(());
        };
        if last.map(|m| m.epoch) == Some(best) {
            return Ok(());
        }
        model
            .load_weights(weights, Path::new("best-epoch snapshot"))
            .map_err(|e| HookError::Custom(format!("restoring best weights failed: {e}")))?;
        info!(best_epoch = best, "Restored weights from best epoch");
        Ok(())
    }
}

/// Cuts the learning rate when a metric plateaus.
#[derive(Debug)]
pub struct ReduceLrOnPlateauHook {
    monitor: Monitor,
    factor: f32,
    patience: usize,
    min_lr: f32,
    wait: usize,
}

impl ReduceLrOnPlateauHook {
    /// Multiplies the learning rate by `factor` after `patience` epochs
    /// without improvement, never going below `min_lr`.
    pub fn new(metric_name: impl Into<String>, factor: f32, patience: usize, min_lr: f32) -> Self {
        Self {
            monitor: Monitor::new(metric_name, 1e-4),
            factor,
            patience,
            min_lr,
            wait: 0,
        }
    }
}

impl Hook for ReduceLrOnPlateauHook {
    fn name(&self) -> &str {
        "reduce_lr_on_plateau_hook"
    }

    fn after_epoch(
        &mut self,
        metrics: &EpochMetrics,
        model: &mut SequenceModel,
    ) -> HookResult<HookAction> {
        let Some(current) = self.monitor.value(self.name(), metrics) else {
            return Ok(HookAction::Continue);
        };
        if self.monitor.is_improvement(current) {
            self.monitor.best_value = Some(current);
            self.wait = 0;
            return Ok(HookAction::Continue);
        }
        self.wait += 1;
        if self.wait >= self.patience {
            let old = model.learning_rate();
            if old > self.min_lr {
                let new = (old * self.factor).max(self.min_lr);
                model.set_learning_rate(new);
                info!(epoch = metrics.epoch, from = old, to = new, "Reduced learning rate");
            }
            self.wait = 0;
        }
        Ok(HookAction::Continue)
    }
}

/// A collection of hooks that are run together.
#[derive(Default)]
pub struct HookList {
    hooks: Vec<Box<dyn Hook>>,
}

impl HookList {
    /// Creates a new empty hook list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a hook to the list.
    pub fn add<H: Hook + 'static>(&mut self, hook: H) {
        self.hooks.push(Box::new(hook));
    }

    /// Number of hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Hook names in run order.
    pub fn names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    /// Runs `before_epoch` on all hooks.
    pub fn before_epoch(&mut self, epoch: usize) -> HookResult<()> {
        for hook in &mut self.hooks {
            hook.before_epoch(epoch)?;
        }
        Ok(())
    }

    /// Runs `after_epoch` on all hooks.
    ///
    /// Every hook sees every epoch; returns `HookAction::Stop` if any hook
    /// requested it.
    pub fn after_epoch(
        &mut self,
        metrics: &EpochMetrics,
        model: &mut SequenceModel,
    ) -> HookResult<HookAction> {
        let mut action = HookAction::Continue;
        for hook in &mut self.hooks {
            if hook.after_epoch(metrics, model)? == HookAction::Stop {
                action = HookAction::Stop;
            }
        }
        Ok(action)
    }

    /// Runs `end` on all hooks.
    pub fn end(&mut self, model: &mut SequenceModel, last: Option<&EpochMetrics>) -> HookResult<()> {
        for hook in &mut self.hooks {
            hook.end(model, last)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelSpec;
    use pricecast_optimizer::OptimizerConfig;
    use tempfile::tempdir;

    fn model() -> SequenceModel {
        let mut model = SequenceModel::new(ModelSpec {
            sequence_length: 3,
            lstm_units: [2, 2, 2],
            dropout_rate: 0.0,
            seed: 1,
            optimizer: OptimizerConfig::adam(0.01),
        });
        model.build(2).unwrap();
        model
    }

    fn epoch(epoch: usize, val_loss: f64) -> EpochMetrics {
        EpochMetrics {
            epoch,
            loss: val_loss,
            mae: val_loss,
            val_loss: Some(val_loss),
            val_mae: Some(val_loss),
            learning_rate: 0.01,
        }
    }

    #[test]
    fn test_logging_hook() {
        let mut hook = LoggingHook::new(10);
        let mut m = model();
        assert!(hook.before_epoch(0).is_ok());
        assert_eq!(hook.after_epoch(&epoch(0, 0.5), &mut m).unwrap(), HookAction::Continue);
        assert!(hook.end(&mut m, None).is_ok());
    }

    #[test]
    fn test_early_stopping_hook_stop() {
        let mut hook = EarlyStoppingHook::new("val_loss", 3, 0.0);
        let mut m = model();

        assert_eq!(hook.after_epoch(&epoch(0, 0.5), &mut m).unwrap(), HookAction::Continue);
        assert_eq!(hook.after_epoch(&epoch(1, 0.4), &mut m).unwrap(), HookAction::Continue);
        assert_eq!(hook.best_epoch(), Some(1));
        assert_eq!(hook.after_epoch(&epoch(2, 0.4), &mut m).unwrap(), HookAction::Continue);
        assert_eq!(hook.after_epoch(&epoch(3, 0.45), &mut m).unwrap(), HookAction::Continue);
        assert_eq!(hook.after_epoch(&epoch(4, 0.6), &mut m).unwrap(), HookAction::Stop);
    }

    #[test]
    fn test_early_stopping_restores_best_weights() {
        let mut hook = EarlyStoppingHook::new("val_loss", 1, 0.0).with_restore_best_weights(true);
        let mut m = model();
        let best = m.weights();
        hook.after_epoch(&epoch(0, 0.1), &mut m).unwrap();

        // Perturb the model after the best epoch.
        m.begin_training().unwrap();
        let x = pricecast_layers::Tensor::ones(&[2, 3, 2]);
        let y = pricecast_layers::Tensor::ones(&[2, 1]);
        m.train_batch(&x, &y).unwrap();
        assert_ne!(m.weights(), best);

        let last = epoch(1, 0.2);
        assert_eq!(hook.after_epoch(&last, &mut m).unwrap(), HookAction::Stop);
        hook.end(&mut m, Some(&last)).unwrap();
        assert_eq!(m.weights(), best);
    }

    #[test]
    fn test_missing_metric_is_ignored() {
        let mut hook = EarlyStoppingHook::new("val_loss", 1, 0.0);
        let mut m = model();
        let mut metrics = epoch(0, 0.5);
        metrics.val_loss = None;
        for _ in 0..3 {
            assert_eq!(hook.after_epoch(&metrics, &mut m).unwrap(), HookAction::Continue);
        }
    }

    #[test]
    fn test_reduce_lr_on_plateau() {
        let mut hook = ReduceLrOnPlateauHook::new("val_loss", 0.5, 2, 0.004);
        let mut m = model();
        hook.after_epoch(&epoch(0, 1.0), &mut m).unwrap();
        hook.after_epoch(&epoch(1, 1.0), &mut m).unwrap();
        assert!((m.learning_rate() - 0.01).abs() < 1e-9);
        hook.after_epoch(&epoch(2, 1.0), &mut m).unwrap();
        assert!((m.learning_rate() - 0.005).abs() < 1e-9);
        hook.after_epoch(&epoch(3, 1.0), &mut m).unwrap();
        hook.after_epoch(&epoch(4, 1.0), &mut m).unwrap();
        assert!((m.learning_rate() - 0.004).abs() < 1e-9);
    }

    #[test]
    fn test_best_checkpoint_hook() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("best").join("weights.json");
        let mut hook = BestCheckpointHook::new(path.clone(), "val_loss");
        let mut m = model();

        hook.after_epoch(&epoch(0, 0.5), &mut m).unwrap();
        assert!(path.exists());
        std::fs::remove_file(&path).unwrap();
        hook.after_epoch(&epoch(1, 0.7), &mut m).unwrap();
        assert!(!path.exists(), "no write without improvement");
        hook.after_epoch(&epoch(2, 0.3), &mut m).unwrap();
        assert!(path.exists());

        let saved = JsonCheckpointer::new().load_weights(&path).unwrap();
        assert_eq!(saved, m.weights());
    }

    #[test]
    fn test_hook_list_runs_every_hook() {
        let mut hooks = HookList::new();
        hooks.add(LoggingHook::new(1));
        hooks.add(EarlyStoppingHook::new("val_loss", 1, 0.0));
        hooks.add(ReduceLrOnPlateauHook::new("val_loss", 0.5, 1, 0.0));
        assert_eq!(hooks.len(), 3);

        let mut m = model();
        hooks.before_epoch(0).unwrap();
        assert_eq!(hooks.after_epoch(&epoch(0, 1.0), &mut m).unwrap(), HookAction::Continue);
        // Early stopping asks to stop; the LR hook still runs after it.
        assert_eq!(hooks.after_epoch(&epoch(1, 1.0), &mut m).unwrap(), HookAction::Stop);
        assert!((m.learning_rate() - 0.005).abs() < 1e-9);
        assert!(hooks.end(&mut m, None).is_ok());
    }
}
