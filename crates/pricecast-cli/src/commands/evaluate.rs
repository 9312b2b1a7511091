//! Evaluate Command Implementation

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use pricecast_features::FeatureAssembler;
use pricecast_training::{Predictor, RegressionMetrics};
use serde::Serialize;
use tracing::info;

use super::{load_artifact, print_json, DataArgs};

/// Score a saved model on labeled data
///
/// Every gap-free window of the assembled data is scored; metrics are in
/// price units.
#[derive(Args, Debug, Clone)]
pub struct EvaluateCommand {
    /// Artifact directory written by `train`
    #[arg(long, short = 'd', env = "PRICECAST_MODEL_DIR")]
    pub model_dir: PathBuf,

    #[command(flatten)]
    pub data: DataArgs,
}

#[derive(Debug, Serialize)]
struct EvaluationReport {
    windows: usize,
    metrics: RegressionMetrics,
}

impl EvaluateCommand {
    /// Execute the evaluate command
    pub async fn run(&self) -> Result<()> {
        let artifact = load_artifact(&self.model_dir)?;
        let predictor = Predictor::from_artifact(&artifact, &self.model_dir)?;
        let data = self.data.load(None)?;
        let dataset = FeatureAssembler::new(predictor.horizon(), predictor.sequence_length())?
            .assemble(&data.bars, &data.sentiment)
            .context("Failed to assemble evaluation features")?;
        let (metrics, windows) = predictor.evaluate(&dataset)?;
        info!(windows, rmse = metrics.rmse, r2 = metrics.r2, "Evaluation finished");
        print_json(&EvaluationReport { windows, metrics })
    }
}
