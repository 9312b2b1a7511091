//! Training, evaluation and forecasting for pricecast sequence models.
//!
//! This crate turns an assembled feature dataset into a trained recurrent
//! regressor and serves forecasts from it:
//!
//! - **Trainer**: chronological split, train-only scaler fitting, mini-batch
//!   epochs with hooks and cooperative cancellation
//! - **Hooks**: early stopping, learning-rate reduction, best-weight snapshots
//! - **Metrics**: per-epoch losses and final regression metrics in price units
//! - **Predictor**: one-step and multi-step forecasts from a trained model or a
//!   persisted artifact
//!
//! # Architecture
//!
//! ```text
//!   AssembledDataset
//!          │
//!          ▼
//!   Trainer::fit ──► TrainedPipeline ──► ModelArtifact (pricecast-checkpoint)
//!          │                │                    │
//!       HookList            ▼                    ▼
//!                       Predictor ◄──── Predictor::from_artifact
//!                           │
//!             predict / predict_future / evaluate
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use pricecast_features::{load_price_bars, FeatureAssembler};
//! use pricecast_training::{PipelineConfig, Predictor, Trainer};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::default().with_epochs(20);
//! let bars = load_price_bars("prices.csv")?;
//! let dataset = FeatureAssembler::new(config.horizon, config.sequence_length)?
//!     .assemble(&bars, &[])?;
//!
//! let trained = Trainer::new(config)?.fit(&dataset)?;
//! println!("validation rmse: {:.4}", trained.report.metrics.rmse);
//!
//! let predictor = Predictor::try_from(trained)?;
//! let next = predictor.predict_frame(dataset.frame())?;
//! println!("next close: {next:.2}");
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod hooks;
pub mod metrics;
pub mod model;
pub mod predictor;
pub mod trainer;

pub use cancel::CancellationToken;
pub use config::{ForecastMode, PipelineConfig};
pub use error::{TrainingError, TrainingResult};
pub use evaluator::Evaluator;
pub use hooks::{
    BestCheckpointHook, EarlyStoppingHook, Hook, HookAction, HookError, HookList, HookResult,
    LoggingHook, ReduceLrOnPlateauHook,
};
pub use metrics::{EpochMetrics, MetricsRecorder, RegressionMetrics};
pub use model::{BatchLoss, ModelSpec, ModelState, SequenceModel, DENSE_UNITS};
pub use predictor::{Forecast, ForecastInput, Predictor};
pub use trainer::{chronological_split, TrainedPipeline, Trainer, TrainingReport};
