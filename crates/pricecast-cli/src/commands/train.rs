//! Train Command Implementation
//!
//! Loads market data, assembles features, trains a sequence model and saves
//! the artifact. Configuration comes from an optional JSON file; flags and
//! `PRICECAST_*` variables override individual fields.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use pricecast_checkpoint::{Checkpointer, JsonCheckpointer};
use pricecast_features::FeatureAssembler;
use pricecast_training::{CancellationToken, PipelineConfig, Trainer};
use serde::Serialize;
use tracing::{info, warn};

use super::{print_json, DataArgs};

/// File name of the best-epoch weight snapshot inside the model directory.
pub const BEST_WEIGHTS_FILE: &str = "best_weights.json";

/// Train a model and save it as an artifact directory
///
/// # Example
///
/// ```bash
/// pricecast train \
///     --prices prices.csv \
///     --config pipeline.json \
///     --model-dir ./model \
///     --epochs 50
/// ```
#[derive(Args, Debug, Clone)]
pub struct TrainCommand {
    #[command(flatten)]
    pub data: DataArgs,

    /// Directory the artifact is written to
    #[arg(long, short = 'd', env = "PRICECAST_MODEL_DIR")]
    pub model_dir: PathBuf,

    /// Pipeline configuration file (JSON)
    #[arg(long, short = 'c', env = "PRICECAST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Window length
    #[arg(long, env = "PRICECAST_SEQUENCE_LENGTH")]
    pub sequence_length: Option<usize>,

    /// Forecast horizon in bars
    #[arg(long, env = "PRICECAST_HORIZON")]
    pub horizon: Option<usize>,

    /// Recurrent layer widths, e.g. 128,64,32
    #[arg(long, value_delimiter = ',', env = "PRICECAST_LSTM_UNITS")]
    pub lstm_units: Option<Vec<usize>>,

    /// Maximum number of epochs
    #[arg(long, short = 'e', env = "PRICECAST_EPOCHS")]
    pub epochs: Option<usize>,

    /// Mini-batch size
    #[arg(long, short = 'b', env = "PRICECAST_BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Initial learning rate
    #[arg(long, env = "PRICECAST_LEARNING_RATE")]
    pub learning_rate: Option<f32>,

    /// Fraction of windows held out for validation
    #[arg(long, env = "PRICECAST_VALIDATION_SPLIT")]
    pub validation_split: Option<f64>,

    /// Random seed
    #[arg(long, env = "PRICECAST_SEED")]
    pub seed: Option<u64>,

    /// Write the best-epoch weights to the model directory while training
    #[arg(long, env = "PRICECAST_SAVE_BEST")]
    pub save_best: bool,

    /// Indent the artifact JSON files
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Debug, Serialize)]
struct TrainSummary<'a> {
    model_dir: &'a std::path::Path,
    train_samples: usize,
    val_samples: usize,
    epochs_run: usize,
    stopped_early: bool,
    best_epoch: Option<usize>,
    metrics: &'a pricecast_training::RegressionMetrics,
}

impl TrainCommand {
    /// Merges the config file, flags and environment into one configuration.
    pub fn resolve_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                info!("Loading config from: {:?}", path);
                PipelineConfig::from_file(path)?
            }
            None => PipelineConfig::default(),
        };
        if let Some(v) = self.sequence_length {
            config.sequence_length = v;
        }
        if let Some(v) = self.horizon {
            config.horizon = v;
        }
        if let Some(v) = &self.lstm_units {
            config.lstm_units = v.clone();
        }
        if let Some(v) = self.epochs {
            config.epochs = v;
        }
        if let Some(v) = self.batch_size {
            config.batch_size = v;
        }
        if let Some(v) = self.learning_rate {
            config.learning_rate = v;
        }
        if let Some(v) = self.validation_split {
            config.validation_split = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if self.data.start_date.is_some() {
            config.start_date = self.data.start_date;
        }
        if self.save_best {
            config.best_weights_path = Some(self.model_dir.join(BEST_WEIGHTS_FILE));
        }
        config.validate()?;
        Ok(config)
    }

    /// Execute the train command
    pub async fn run(&self) -> Result<()> {
        let config = self.resolve_config()?;
        info!(
            sequence_length = config.sequence_length,
            horizon = config.horizon,
            epochs = config.epochs,
            "Starting training"
        );

        if !self.model_dir.exists() {
            std::fs::create_dir_all(&self.model_dir).context("Failed to create model directory")?;
            info!("Created model directory: {:?}", self.model_dir);
        }

        let data = self.data.load(config.start_date)?;
        let dataset = FeatureAssembler::new(config.horizon, config.sequence_length)?
            .assemble(&data.bars, &data.sentiment)
            .context("Failed to assemble training features")?;

        let token = CancellationToken::new();
        let on_signal = token.clone();
        let signal = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Received interrupt, stopping after the current epoch");
                on_signal.cancel();
            }
        });

        let trained = tokio::task::spawn_blocking(move || {
            Trainer::new(config)?.with_cancellation(token).fit(&dataset)
        })
        .await
        .context("Training task panicked")?;
        signal.abort();
        let trained = trained.context("Training failed")?;

        let artifact = trained.to_artifact()?;
        let checkpointer = JsonCheckpointer {
            pretty: self.pretty,
        };
        checkpointer.save(&self.model_dir, &artifact)?;
        info!("Saved model to: {:?}", self.model_dir);

        let report = &trained.report;
        print_json(&TrainSummary {
            model_dir: &self.model_dir,
            train_samples: report.train_samples,
            val_samples: report.val_samples,
            epochs_run: report.history.len(),
            stopped_early: report.stopped_early,
            best_epoch: report.best_epoch,
            metrics: &report.metrics,
        })
    }
}
