//! Drives train, evaluate, predict and compare through parsed command lines.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use clap::Parser;
use pricecast_checkpoint::{Checkpointer, JsonCheckpointer, CONFIG_FILE, WEIGHTS_FILE};
use pricecast_cli::{Cli, Commands};
use tempfile::tempdir;

fn write_inputs(dir: &Path, n: usize) {
    let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    let mut bars = String::from("timestamp,open,high,low,close,volume\n");
    let mut sentiment = String::from("date,avg_sentiment_score,article_count\n");
    for i in 0..n {
        let day = start + chrono::Duration::days(i as i64);
        let close = 80.0 + 4.0 * (i as f64 / 6.0).sin() + i as f64 * 0.2;
        writeln!(
            bars,
            "{day},{:.4},{:.4},{:.4},{close:.4},{}",
            close - 0.2,
            close + 0.9,
            close - 0.9,
            20_000 + (i % 5) * 300
        )
        .unwrap();
        if i % 3 == 0 {
            writeln!(sentiment, "{day},{:.3},{}", ((i % 7) as f64 - 3.0) / 5.0, 1 + i % 4).unwrap();
        }
    }
    fs::write(dir.join("prices.csv"), bars).unwrap();
    fs::write(dir.join("sentiment.csv"), sentiment).unwrap();
}

async fn run(args: &[&str]) -> anyhow::Result<()> {
    let mut full = vec!["pricecast"];
    full.extend_from_slice(args);
    match Cli::parse_from(full).command {
        Commands::Train(cmd) => cmd.run().await,
        Commands::Evaluate(cmd) => cmd.run().await,
        Commands::Predict(cmd) => cmd.run().await,
        Commands::Compare(cmd) => cmd.run().await,
    }
}

async fn train(dir: &Path, model: &str, seed: &str) -> anyhow::Result<()> {
    let prices = dir.join("prices.csv");
    let sentiment = dir.join("sentiment.csv");
    let model_dir = dir.join(model);
    run(&[
        "train",
        "--prices",
        prices.to_str().unwrap(),
        "--sentiment",
        sentiment.to_str().unwrap(),
        "--model-dir",
        model_dir.to_str().unwrap(),
        "--sequence-length",
        "8",
        "--lstm-units",
        "4,3,2",
        "--epochs",
        "2",
        "--batch-size",
        "16",
        "--seed",
        seed,
        "--save-best",
    ])
    .await
}

#[tokio::test]
async fn test_train_evaluate_predict_compare() {
    let dir = tempdir().unwrap();
    write_inputs(dir.path(), 110);
    train(dir.path(), "model-a", "1").await.unwrap();
    train(dir.path(), "model-b", "2").await.unwrap();

    let model_a = dir.path().join("model-a");
    assert!(model_a.join(CONFIG_FILE).exists());
    assert!(model_a.join(WEIGHTS_FILE).exists());
    assert!(model_a.join("best_weights.json").exists());
    let artifact = JsonCheckpointer::new().load(&model_a).unwrap();
    assert_eq!(artifact.config.sequence_length, 8);
    assert_eq!(artifact.config.lstm_units, vec![4, 3, 2]);

    let prices = dir.path().join("prices.csv");
    let sentiment = dir.path().join("sentiment.csv");
    let common = [
        "--model-dir",
        model_a.to_str().unwrap(),
        "--prices",
        prices.to_str().unwrap(),
        "--sentiment",
        sentiment.to_str().unwrap(),
    ];

    let mut evaluate = vec!["evaluate"];
    evaluate.extend_from_slice(&common);
    run(&evaluate).await.unwrap();

    let mut predict = vec!["predict"];
    predict.extend_from_slice(&common);
    predict.extend_from_slice(&["--days", "3", "--mode", "recursive"]);
    run(&predict).await.unwrap();

    let model_b = dir.path().join("model-b");
    run(&["compare", model_a.to_str().unwrap(), model_b.to_str().unwrap()])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_train_with_too_little_data_fails() {
    let dir = tempdir().unwrap();
    write_inputs(dir.path(), 40);
    let err = train(dir.path(), "model", "1").await.unwrap_err();
    assert!(format!("{err:#}").contains("Insufficient data"), "{err:#}");
}

#[tokio::test]
async fn test_predict_without_model_fails() {
    let dir = tempdir().unwrap();
    write_inputs(dir.path(), 60);
    let missing = dir.path().join("nope");
    let prices = dir.path().join("prices.csv");
    let err = run(&[
        "predict",
        "--model-dir",
        missing.to_str().unwrap(),
        "--prices",
        prices.to_str().unwrap(),
    ])
    .await
    .unwrap_err();
    assert!(format!("{err:#}").contains("Failed to load model"));
}
