//! Fixed, ordered feature schema.
//!
//! Column order is part of a trained model's contract: the scaler statistics
//! and the first layer's weights are indexed by position. The schema is built
//! once at assembly time and stored verbatim in the model artifact; consumers
//! call [`FeatureSchema::verify`] before feeding rows to a model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{FeatureError, FeatureResult};

/// Lags applied to close and 1-step return.
pub const LAGS: [usize; 5] = [1, 2, 3, 5, 7];

/// Canonical feature order produced by the assembler.
pub const FEATURE_NAMES: [&str; 42] = [
    "open",
    "high",
    "low",
    "close",
    "volume",
    "sma_20",
    "sma_50",
    "ema_12",
    "ema_26",
    "rsi_14",
    "macd",
    "macd_signal",
    "macd_histogram",
    "bb_upper",
    "bb_middle",
    "bb_lower",
    "returns",
    "returns_5d",
    "returns_10d",
    "returns_20d",
    "volatility_5d",
    "volatility_10d",
    "volatility_20d",
    "high_low_ratio",
    "close_open_ratio",
    "volume_sma_5",
    "volume_ratio",
    "close_lag_1",
    "returns_lag_1",
    "close_lag_2",
    "returns_lag_2",
    "close_lag_3",
    "returns_lag_3",
    "close_lag_5",
    "returns_lag_5",
    "close_lag_7",
    "returns_lag_7",
    "sentiment_score",
    "news_count",
    "sentiment_lag_1",
    "sentiment_lag_3",
    "sentiment_ma_5",
];

/// Reporting category of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureGroup {
    /// Raw OHLCV columns.
    Price,
    /// Indicator-derived columns.
    Technical,
    /// News sentiment columns.
    Sentiment,
    /// Everything else (returns, ratios, lags).
    Engineered,
}

impl FeatureGroup {
    /// Categorises a column by name.
    pub fn of(name: &str) -> Self {
        const PRICE: [&str; 5] = ["open", "high", "low", "close", "volume"];
        const TECHNICAL: [&str; 5] = ["rsi", "macd", "bb", "sma", "ema"];
        if PRICE.contains(&name) {
            FeatureGroup::Price
        } else if TECHNICAL.iter().any(|t| name.contains(t)) {
            FeatureGroup::Technical
        } else if name.contains("sentiment") || name.contains("news") {
            FeatureGroup::Sentiment
        } else {
            FeatureGroup::Engineered
        }
    }
}

/// Ordered list of feature column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::canonical()
    }
}

impl FeatureSchema {
    /// The assembler's column order.
    pub fn canonical() -> Self {
        Self {
            names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Builds a schema from explicit names, rejecting duplicates.
    pub fn from_names(names: Vec<String>) -> FeatureResult<Self> {
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = names.iter().find(|n| !seen.insert(n.as_str())) {
            return Err(FeatureError::SchemaMismatch {
                message: format!("duplicate feature name {dup:?}"),
            });
        }
        Ok(Self { names })
    }

    /// Column names in order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Position of `name`, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Fails unless `other` has exactly the same names in the same order.
    pub fn verify(&self, other: &FeatureSchema) -> FeatureResult<()> {
        if self.names.len() != other.names.len() {
            return Err(FeatureError::SchemaMismatch {
                message: format!(
                    "expected {} features, got {}",
                    self.names.len(),
                    other.names.len()
                ),
            });
        }
        if let Some((i, (a, b))) = self
            .names
            .iter()
            .zip(other.names.iter())
            .enumerate()
            .find(|(_, (a, b))| a != b)
        {
            return Err(FeatureError::SchemaMismatch {
                message: format!("column {i}: expected {a:?}, got {b:?}"),
            });
        }
        Ok(())
    }

    /// Columns grouped by [`FeatureGroup`], each keeping schema order.
    pub fn groups(&self) -> BTreeMap<FeatureGroup, Vec<String>> {
        let mut groups: BTreeMap<FeatureGroup, Vec<String>> = BTreeMap::new();
        for name in &self.names {
            groups
                .entry(FeatureGroup::of(name))
                .or_default()
                .push(name.clone());
        }
        groups
    }
}

/// Names of the three target columns at horizon `h`.
pub fn target_names(horizon: usize) -> [String; 3] {
    [
        format!("target_price_{horizon}d"),
        format!("target_return_{horizon}d"),
        format!("target_direction_{horizon}d"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_has_unique_names() {
        let schema = FeatureSchema::canonical();
        assert_eq!(schema.len(), 42);
        assert!(FeatureSchema::from_names(schema.names().to_vec()).is_ok());
        assert_eq!(schema.index_of("close"), Some(3));
        assert_eq!(schema.index_of("sentiment_ma_5"), Some(41));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let names = vec!["a".to_string(), "a".to_string()];
        assert!(FeatureSchema::from_names(names).is_err());
    }

    #[test]
    fn test_verify_reports_first_difference() {
        let a = FeatureSchema::canonical();
        let mut names = a.names().to_vec();
        names.swap(0, 1);
        let b = FeatureSchema::from_names(names).unwrap();
        let err = a.verify(&b).unwrap_err();
        assert!(err.to_string().contains("column 0"));
        assert!(a.verify(&a.clone()).is_ok());
    }

    #[test]
    fn test_groups() {
        let groups = FeatureSchema::canonical().groups();
        assert_eq!(groups[&FeatureGroup::Price].len(), 5);
        assert_eq!(groups[&FeatureGroup::Sentiment].len(), 5);
        assert!(groups[&FeatureGroup::Technical].contains(&"volume_sma_5".to_string()));
        assert!(groups[&FeatureGroup::Engineered].contains(&"close_lag_1".to_string()));
        let total: usize = groups.values().map(Vec::len).sum();
        assert_eq!(total, 42);
    }

    #[test]
    fn test_target_names() {
        assert_eq!(target_names(5)[0], "target_price_5d");
        assert_eq!(target_names(1)[2], "target_direction_1d");
    }
}
