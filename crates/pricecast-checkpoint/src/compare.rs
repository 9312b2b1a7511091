//! Side-by-side comparison of two trained artifacts.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::artifact::ArtifactConfig;

/// One metric across two models.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDelta {
    /// Metric name.
    pub name: String,
    /// Value for the first model.
    pub baseline: Option<f64>,
    /// Value for the second model.
    pub candidate: Option<f64>,
    /// `candidate - baseline`, when both exist.
    pub delta: Option<f64>,
    /// Whether the candidate is better on this metric.
    pub improved: Option<bool>,
}

/// Result of [`compare`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelComparison {
    /// Per-metric rows, ordered by metric name.
    pub metrics: Vec<MetricDelta>,
    /// Whether the two models were trained on the same feature order.
    pub same_schema: bool,
    /// Whether window length and horizon agree.
    pub same_shape: bool,
}

impl ModelComparison {
    /// Number of metrics on which the candidate improved.
    pub fn improvements(&self) -> usize {
        self.metrics
            .iter()
            .filter(|m| m.improved == Some(true))
            .count()
    }
}

fn higher_is_better(metric: &str) -> bool {
    metric == "r2"
}

/// Compares the recorded metrics of two artifacts.
///
/// Error metrics improve when they go down; `r2` improves when it goes up.
pub fn compare(baseline: &ArtifactConfig, candidate: &ArtifactConfig) -> ModelComparison {
    let names: BTreeSet<&String> = baseline
        .metrics
        .keys()
        .chain(candidate.metrics.keys())
        .collect();
    let metrics = names
        .into_iter()
        .map(|name| {
            let a = baseline.metrics.get(name).copied();
            let b = candidate.metrics.get(name).copied();
            let delta = a.zip(b).map(|(a, b)| b - a);
            let improved = delta.map(|d| {
                if higher_is_better(name) {
                    d > 0.0
                } else {
                    d < 0.0
                }
            });
            MetricDelta {
                name: name.clone(),
                baseline: a,
                candidate: b,
                delta,
                improved,
            }
        })
        .collect();
    ModelComparison {
        metrics,
        same_schema: baseline.feature_names == candidate.feature_names,
        same_shape: baseline.sequence_length == candidate.sequence_length
            && baseline.horizon == candidate.horizon,
    }
}
