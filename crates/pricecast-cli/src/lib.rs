//! Pricecast CLI Library
//!
//! This crate provides the command-line interface for pricecast:
//!
//! - **Train**: fit a sequence model on a price CSV and save the artifact
//! - **Evaluate**: score a saved model on labeled data
//! - **Predict**: one-step or multi-step forecasts from recent bars
//! - **Compare**: metric deltas between two saved models
//!
//! # Example
//!
//! ```bash
//! # Train a model
//! pricecast train --prices prices.csv --sentiment sentiment.csv --model-dir ./model
//!
//! # Forecast five days ahead, feeding each forecast back in
//! pricecast predict --model-dir ./model --prices prices.csv --days 5 --mode recursive
//!
//! # Compare two runs
//! pricecast compare ./model-a ./model-b
//! ```

pub mod commands;

use clap::{Parser, Subcommand};

pub use commands::{CompareCommand, DataArgs, EvaluateCommand, PredictCommand, TrainCommand};

/// Pricecast - recurrent price forecasting
///
/// Builds technical and sentiment features from daily bars, trains a stacked
/// LSTM regressor and serves forecasts from the saved model.
#[derive(Parser, Debug)]
#[command(name = "pricecast")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "PRICECAST_LOG_JSON")]
    pub log_json: bool,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a model and save it as an artifact directory
    Train(TrainCommand),

    /// Score a saved model on labeled data
    Evaluate(EvaluateCommand),

    /// Forecast future closes with a saved model
    Predict(PredictCommand),

    /// Compare the recorded metrics of two saved models
    Compare(CompareCommand),
}

/// Result type alias for CLI operations
pub type CliResult<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;
    use pricecast_training::ForecastMode;
    use std::path::PathBuf;

    #[test]
    fn test_parse_train() {
        let cli = Cli::parse_from([
            "pricecast",
            "train",
            "--prices",
            "prices.csv",
            "--model-dir",
            "out",
            "--epochs",
            "5",
            "--lstm-units",
            "16,8,4",
            "--start-date",
            "2023-01-01",
        ]);
        let Commands::Train(cmd) = cli.command else {
            panic!("expected train");
        };
        assert_eq!(cmd.data.prices, PathBuf::from("prices.csv"));
        assert_eq!(cmd.model_dir, PathBuf::from("out"));
        assert_eq!(cmd.epochs, Some(5));
        assert_eq!(cmd.lstm_units, Some(vec![16, 8, 4]));
        assert_eq!(
            cmd.data.start_date,
            chrono::NaiveDate::from_ymd_opt(2023, 1, 1)
        );
        assert!(cmd.sequence_length.is_none());
        assert!(!cli.log_json);
    }

    #[test]
    fn test_parse_predict_mode() {
        let cli = Cli::parse_from([
            "pricecast",
            "predict",
            "--model-dir",
            "m",
            "--prices",
            "p.csv",
            "--days",
            "3",
            "--mode",
            "recursive",
            "--log-json",
        ]);
        let Commands::Predict(cmd) = cli.command else {
            panic!("expected predict");
        };
        assert_eq!(cmd.days, 3);
        assert_eq!(cmd.mode, ForecastMode::Recursive);
        assert!(cli.log_json);
    }

    #[test]
    fn test_parse_compare() {
        let cli = Cli::parse_from(["pricecast", "compare", "a", "b"]);
        let Commands::Compare(cmd) = cli.command else {
            panic!("expected compare");
        };
        assert_eq!(cmd.baseline, PathBuf::from("a"));
        assert_eq!(cmd.candidate, PathBuf::from("b"));
    }

    #[test]
    fn test_rejects_bad_mode_and_missing_prices() {
        assert!(Cli::try_parse_from([
            "pricecast", "predict", "--model-dir", "m", "--prices", "p.csv", "--mode", "sideways",
        ])
        .is_err());
        assert!(Cli::try_parse_from(["pricecast", "evaluate", "--model-dir", "m"]).is_err());
    }
}
