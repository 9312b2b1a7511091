//! Predict Command Implementation

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use pricecast_training::{ForecastInput, ForecastMode, Predictor};
use tracing::info;

use super::{load_artifact, print_json, DataArgs};

/// Forecast future closes with a saved model
///
/// # Example
///
/// ```bash
/// pricecast predict --model-dir ./model --prices prices.csv --days 5 --mode recursive
/// ```
#[derive(Args, Debug, Clone)]
pub struct PredictCommand {
    /// Artifact directory written by `train`
    #[arg(long, short = 'd', env = "PRICECAST_MODEL_DIR")]
    pub model_dir: PathBuf,

    #[command(flatten)]
    pub data: DataArgs,

    /// Number of steps to forecast
    #[arg(long, default_value = "1", env = "PRICECAST_DAYS")]
    pub days: usize,

    /// `static` repeats the next-step forecast, `recursive` feeds forecasts back
    #[arg(long, default_value = "static", env = "PRICECAST_FORECAST_MODE")]
    pub mode: ForecastMode,
}

impl PredictCommand {
    /// Execute the predict command
    pub async fn run(&self) -> Result<()> {
        let artifact = load_artifact(&self.model_dir)?;
        let predictor = Predictor::from_artifact(&artifact, &self.model_dir)?;
        let data = self.data.load(None)?;
        let input = ForecastInput::Bars {
            bars: &data.bars,
            sentiment: &data.sentiment,
        };
        let forecasts = predictor.predict_future(input, self.days, self.mode)?;
        info!(days = self.days, mode = ?self.mode, "Forecast complete");
        print_json(&forecasts)
    }
}
