//! Compare Command Implementation

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use pricecast_checkpoint::compare;
use tracing::{info, warn};

use super::{load_artifact, print_json};

/// Compare the recorded metrics of two saved models
#[derive(Args, Debug, Clone)]
pub struct CompareCommand {
    /// Reference artifact directory
    pub baseline: PathBuf,

    /// Artifact directory compared against the baseline
    pub candidate: PathBuf,
}

impl CompareCommand {
    /// Execute the compare command
    pub async fn run(&self) -> Result<()> {
        let baseline = load_artifact(&self.baseline)?;
        let candidate = load_artifact(&self.candidate)?;
        let comparison = compare(&baseline.config, &candidate.config);
        if !comparison.same_schema || !comparison.same_shape {
            warn!("Models differ in features or window shape; metrics may not be comparable");
        }
        info!(
            improved = comparison.improvements(),
            metrics = comparison.metrics.len(),
            "Comparison complete"
        );
        print_json(&comparison)
    }
}
