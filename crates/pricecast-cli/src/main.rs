//! Pricecast CLI - train, evaluate and query price forecasting models.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pricecast_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::from_default_env().add_directive("pricecast=info".parse()?);
    if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }

    info!("Pricecast CLI starting...");

    match cli.command {
        Commands::Train(cmd) => cmd.run().await?,
        Commands::Evaluate(cmd) => cmd.run().await?,
        Commands::Predict(cmd) => cmd.run().await?,
        Commands::Compare(cmd) => cmd.run().await?,
    }

    info!("Pricecast CLI completed successfully");
    Ok(())
}
