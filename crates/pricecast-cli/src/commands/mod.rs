//! CLI Command Implementations
//!
//! - [`train`]: fit a model and save the artifact
//! - [`evaluate`]: score a saved model
//! - [`predict`]: forecast with a saved model
//! - [`compare`]: metric deltas between two saved models

mod compare;
mod evaluate;
mod predict;
mod train;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use pricecast_checkpoint::{Checkpointer, JsonCheckpointer, ModelArtifact};
use pricecast_features::{bars_since, load_price_bars, load_sentiment, PriceBar, SentimentDailyAggregate};
use serde::Serialize;
use tracing::info;

pub use compare::CompareCommand;
pub use evaluate::EvaluateCommand;
pub use predict::PredictCommand;
pub use train::TrainCommand;

/// Market data inputs shared by the data-consuming commands.
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Daily OHLCV CSV (timestamp,open,high,low,close,volume)
    #[arg(long, short = 'p', env = "PRICECAST_PRICES")]
    pub prices: PathBuf,

    /// Daily sentiment CSV (date,avg_sentiment_score,article_count)
    #[arg(long, env = "PRICECAST_SENTIMENT")]
    pub sentiment: Option<PathBuf>,

    /// Ignore bars before this date (YYYY-MM-DD)
    #[arg(long, env = "PRICECAST_START_DATE")]
    pub start_date: Option<NaiveDate>,
}

/// Bars and sentiment loaded from [`DataArgs`].
#[derive(Debug, Clone)]
pub struct MarketData {
    /// Bars in time order, already cut at the start date.
    pub bars: Vec<PriceBar>,
    /// Daily sentiment, empty when no file was given.
    pub sentiment: Vec<SentimentDailyAggregate>,
}

impl DataArgs {
    /// Loads both files. `fallback_start` applies when no `--start-date` is given.
    pub fn load(&self, fallback_start: Option<NaiveDate>) -> Result<MarketData> {
        let mut bars = load_price_bars(&self.prices)
            .with_context(|| format!("Failed to load prices from {}", self.prices.display()))?;
        if let Some(start) = self.start_date.or(fallback_start) {
            let total = bars.len();
            bars = bars_since(&bars, start).to_vec();
            info!(%start, kept = bars.len(), total, "Filtered bars by start date");
        }
        let sentiment = match &self.sentiment {
            Some(path) => load_sentiment(path)
                .with_context(|| format!("Failed to load sentiment from {}", path.display()))?,
            None => Vec::new(),
        };
        info!(bars = bars.len(), sentiment_days = sentiment.len(), "Loaded market data");
        Ok(MarketData { bars, sentiment })
    }
}

pub(crate) fn load_artifact(dir: &Path) -> Result<ModelArtifact> {
    JsonCheckpointer::new()
        .load(dir)
        .with_context(|| format!("Failed to load model from {}", dir.display()))
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
