//! Trains a tiny model end to end, persists it and serves forecasts from the
//! restored artifact.

use chrono::{Duration, TimeZone, Utc};
use pricecast_checkpoint::{Checkpointer, JsonCheckpointer};
use pricecast_features::{AssembledDataset, FeatureAssembler, PriceBar};
use pricecast_training::{
    CancellationToken, ForecastInput, ForecastMode, ModelState, PipelineConfig, Predictor,
    Trainer, TrainingError,
};
use tempfile::tempdir;

fn bars(n: usize) -> Vec<PriceBar> {
    let start = Utc.with_ymd_and_hms(2022, 3, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let t = i as f64;
            let close = 50.0 + 5.0 * (t / 7.0).sin() + 0.05 * t;
            PriceBar {
                timestamp: start + Duration::days(i as i64),
                open: close - 0.3,
                high: close + 0.8,
                low: close - 0.8,
                close,
                volume: 5_000.0 + 100.0 * (t / 3.0).cos(),
            }
        })
        .collect()
}

fn config() -> PipelineConfig {
    PipelineConfig::default()
        .with_sequence_length(10)
        .with_lstm_units(vec![4, 3, 2])
        .with_epochs(3)
        .with_batch_size(16)
        .with_learning_rate(0.01)
        .with_seed(11)
}

fn dataset(config: &PipelineConfig) -> AssembledDataset {
    FeatureAssembler::new(config.horizon, config.sequence_length)
        .unwrap()
        .assemble(&bars(120), &[])
        .unwrap()
}

#[test]
fn test_train_save_load_predict() {
    let config = config();
    let data = dataset(&config);
    // 120 bars lose 49 warm-up rows and the unlabeled last row.
    assert_eq!(data.len(), 70);

    let trained = Trainer::new(config.clone()).unwrap().fit(&data).unwrap();
    let report = &trained.report;
    assert_eq!(report.train_samples, 48);
    assert_eq!(report.val_samples, 12);
    assert!(!report.history.is_empty() && report.history.len() <= 3);
    assert!(report.history.iter().all(|m| m.val_loss.is_some()));
    assert!(report.metrics.rmse.is_finite());
    assert_eq!(trained.model.state(), ModelState::Trained);

    let dir = tempdir().unwrap();
    let artifact = trained.to_artifact().unwrap();
    assert_eq!(artifact.config.training_curve.len(), report.history.len());
    assert!(artifact.config.metrics.contains_key("rmse"));
    JsonCheckpointer::new().save(dir.path(), &artifact).unwrap();

    let in_memory = Predictor::try_from(trained).unwrap();
    let loaded = JsonCheckpointer::new().load(dir.path()).unwrap();
    let restored = Predictor::from_artifact(&loaded, dir.path()).unwrap();

    let frame = data.frame();
    let a = in_memory.predict_frame(frame).unwrap();
    let b = restored.predict_frame(frame).unwrap();
    assert!((a - b).abs() < 1e-3 * a.abs().max(1.0), "{a} vs {b}");

    let (metrics, windows) = restored.evaluate(&data).unwrap();
    assert_eq!(windows, 60);
    assert!(metrics.mae >= 0.0);

    let history = bars(120);
    let forecasts = restored
        .predict_future(
            ForecastInput::Bars {
                bars: &history,
                sentiment: &[],
            },
            4,
            ForecastMode::Recursive,
        )
        .unwrap();
    assert_eq!(forecasts.len(), 4);
    assert!(forecasts.iter().all(|f| f.price.is_finite()));
}

#[test]
fn test_cancelled_before_first_epoch() {
    let config = config();
    let data = dataset(&config);
    let token = CancellationToken::new();
    token.cancel();
    let err = Trainer::new(config)
        .unwrap()
        .with_cancellation(token)
        .fit(&data)
        .unwrap_err();
    assert!(matches!(err, TrainingError::Cancelled { epoch: 0 }));
}

#[test]
fn test_no_validation_partition() {
    let config = config().with_validation_split(0.0).with_epochs(2);
    let data = dataset(&config);
    let trained = Trainer::new(config).unwrap().fit(&data).unwrap();
    assert_eq!(trained.report.train_samples, 60);
    assert_eq!(trained.report.val_samples, 0);
    assert!(trained.report.history.iter().all(|m| m.val_loss.is_none()));
    assert!(trained.report.best_epoch.is_some());
}

#[test]
fn test_best_weights_snapshot_written() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("best_weights.json");
    let config = config().with_epochs(2).with_best_weights_path(path.clone());
    let data = dataset(&config);
    Trainer::new(config).unwrap().fit(&data).unwrap();
    let weights = JsonCheckpointer::new().load_weights(&path).unwrap();
    assert!(weights.get("output/kernel").is_some());
}

#[test]
fn test_horizon_mismatch() {
    let data = dataset(&config());
    let err = Trainer::new(config().with_horizon(3))
        .unwrap()
        .fit(&data)
        .unwrap_err();
    assert!(matches!(err, TrainingError::Config(_)));
}
