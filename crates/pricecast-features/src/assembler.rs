//! Feature and target assembly.
//!
//! Assembly runs in a fixed order:
//!
//! 1. indicators on close
//! 2. 1/5/10/20-step returns
//! 3. rolling volatility of 1-step returns
//! 4. high/low and close/open ratios
//! 5. volume moving average and ratio
//! 6. lagged close and lagged return
//! 7. sentiment join on calendar date, plus sentiment lags and moving average
//! 8. targets at the horizon
//! 9. filtering: every row holding an undefined or non-finite value is dropped
//!
//! Each surviving row remembers its position in the bar series so that
//! windowing can refuse to bridge rows removed in step 9.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bars::{validate_bars, PriceBar, SentimentDailyAggregate};
use crate::error::{FeatureError, FeatureResult};
use crate::indicators::{compute_all, rolling_mean, rolling_std, Series};
use crate::schema::{FeatureSchema, LAGS};

/// Labels for one row at horizon `h`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// `close[t + h]`
    pub future_price: f64,
    /// `close[t + h] / close[t] - 1`
    pub future_return: f64,
    /// 1 when `future_return > 0`, else 0.
    pub future_direction: u8,
}

/// Complete feature rows in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    schema: FeatureSchema,
    timestamps: Vec<DateTime<Utc>>,
    positions: Vec<usize>,
    rows: Vec<Vec<f64>>,
}

impl FeatureFrame {
    /// Builds a frame from contiguous rows, validating their width.
    pub fn new(
        schema: FeatureSchema,
        timestamps: Vec<DateTime<Utc>>,
        rows: Vec<Vec<f64>>,
    ) -> FeatureResult<Self> {
        if timestamps.len() != rows.len() {
            return Err(FeatureError::invalid_input(format!(
                "{} timestamps for {} rows",
                timestamps.len(),
                rows.len()
            )));
        }
        if let Some(row) = rows.iter().find(|r| r.len() != schema.len()) {
            return Err(FeatureError::SchemaMismatch {
                message: format!("row has {} values, schema has {}", row.len(), schema.len()),
            });
        }
        let positions = (0..rows.len()).collect();
        Ok(Self {
            schema,
            timestamps,
            positions,
            rows,
        })
    }

    /// Column order.
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Row timestamps.
    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// Index of each row in the source bar series.
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    /// Feature rows.
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the frame has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one named column.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.schema.index_of(name)?;
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }

    /// The last `n` rows, or all of them if there are fewer.
    pub fn tail(&self, n: usize) -> &[Vec<f64>] {
        &self.rows[self.rows.len().saturating_sub(n)..]
    }
}

/// Features plus targets for supervised training.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledDataset {
    frame: FeatureFrame,
    targets: Vec<Target>,
    horizon: usize,
}

impl AssembledDataset {
    /// Feature rows and metadata.
    pub fn frame(&self) -> &FeatureFrame {
        &self.frame
    }

    /// Targets aligned with the frame's rows.
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// The regression label column, `target_price_{h}d`.
    pub fn target_prices(&self) -> Vec<f64> {
        self.targets.iter().map(|t| t.future_price).collect()
    }

    /// Forecast horizon in bars.
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.frame.len()
    }

    /// Whether no rows survived.
    pub fn is_empty(&self) -> bool {
        self.frame.is_empty()
    }
}

/// Builds feature rows and targets from price bars and daily sentiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureAssembler {
    horizon: usize,
    sequence_length: usize,
}

impl FeatureAssembler {
    /// Creates an assembler for a forecast `horizon` and model `sequence_length`.
    pub fn new(horizon: usize, sequence_length: usize) -> FeatureResult<Self> {
        if horizon == 0 {
            return Err(FeatureError::invalid_config("horizon must be at least 1"));
        }
        if sequence_length == 0 {
            return Err(FeatureError::invalid_config(
                "sequence_length must be at least 1",
            ));
        }
        Ok(Self {
            horizon,
            sequence_length,
        })
    }

    /// Forecast horizon.
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Window length the output must be able to fill.
    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    /// Assembles a labeled dataset.
    ///
    /// # Errors
    ///
    /// [`FeatureError::DataInsufficient`] when fewer than `sequence_length + 1`
    /// complete rows remain after filtering.
    pub fn assemble(
        &self,
        bars: &[PriceBar],
        sentiment: &[SentimentDailyAggregate],
    ) -> FeatureResult<AssembledDataset> {
        validate_bars(bars)?;
        let columns = build_feature_columns(bars, sentiment)?;
        let targets = build_targets(bars, self.horizon);
        let kept = complete_rows(&columns, Some(targets.as_slice()), bars.len());

        let required = self.sequence_length + 1;
        if kept.len() < required {
            return Err(FeatureError::DataInsufficient {
                required,
                available: kept.len(),
            });
        }

        let frame = gather(bars, &columns, &kept);
        let targets: Vec<Target> = kept.iter().filter_map(|&i| targets[i]).collect();
        info!(
            bars = bars.len(),
            rows = frame.len(),
            dropped = bars.len() - frame.len(),
            horizon = self.horizon,
            "Assembled training dataset"
        );
        Ok(AssembledDataset {
            frame,
            targets,
            horizon: self.horizon,
        })
    }

    /// Assembles unlabeled feature rows for inference.
    ///
    /// Trailing rows are kept because no target is computed.
    ///
    /// # Errors
    ///
    /// [`FeatureError::DataInsufficient`] when fewer than `sequence_length`
    /// complete rows remain.
    pub fn assemble_features(
        &self,
        bars: &[PriceBar],
        sentiment: &[SentimentDailyAggregate],
    ) -> FeatureResult<FeatureFrame> {
        validate_bars(bars)?;
        let columns = build_feature_columns(bars, sentiment)?;
        let kept = complete_rows(&columns, None, bars.len());
        if kept.len() < self.sequence_length {
            return Err(FeatureError::DataInsufficient {
                required: self.sequence_length,
                available: kept.len(),
            });
        }
        let frame = gather(bars, &columns, &kept);
        debug!(bars = bars.len(), rows = frame.len(), "Assembled inference features");
        Ok(frame)
    }
}

fn pct_change(values: &[f64], k: usize) -> Series {
    (0..values.len())
        .map(|t| (t >= k).then(|| values[t] / values[t - k] - 1.0))
        .collect()
}

fn shift(values: &[Option<f64>], lag: usize) -> Series {
    (0..values.len())
        .map(|t| if t >= lag { values[t - lag] } else { None })
        .collect()
}

fn ratio(num: &[f64], den: &[f64]) -> Series {
    num.iter().zip(den).map(|(a, b)| Some(a / b)).collect()
}

/// Steps 1-7: one column per schema entry, in schema order.
fn build_feature_columns(
    bars: &[PriceBar],
    sentiment: &[SentimentDailyAggregate],
) -> FeatureResult<Vec<Series>> {
    let open: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let high: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let low: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let close: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volume: Vec<f64> = bars.iter().map(|b| b.volume).collect();
    let wrap = |v: &[f64]| -> Series { v.iter().map(|&x| Some(x)).collect() };

    let indicators = compute_all(&close)?;
    let ind = |f: fn(&crate::indicators::IndicatorRow) -> Option<f64>| -> Series {
        indicators.iter().map(f).collect()
    };

    let returns = pct_change(&close, 1);
    let volume_sma_5 = rolling_mean(&wrap(&volume), 5);
    let volume_ratio: Series = volume
        .iter()
        .zip(&volume_sma_5)
        .map(|(v, m)| m.map(|m| v / m))
        .collect();

    let by_date: HashMap<NaiveDate, &SentimentDailyAggregate> =
        sentiment.iter().map(|s| (s.date, s)).collect();
    let (score, count): (Series, Series) = bars
        .iter()
        .map(|b| match by_date.get(&b.date()) {
            Some(s) => (Some(s.avg_sentiment_score), Some(f64::from(s.article_count))),
            None => (Some(0.0), Some(0.0)),
        })
        .unzip();

    let mut columns: Vec<Series> = vec![
        wrap(&open),
        wrap(&high),
        wrap(&low),
        wrap(&close),
        wrap(&volume),
        ind(|r| r.sma_20),
        ind(|r| r.sma_50),
        ind(|r| r.ema_12),
        ind(|r| r.ema_26),
        ind(|r| r.rsi_14),
        ind(|r| r.macd),
        ind(|r| r.macd_signal),
        ind(|r| r.macd_histogram),
        ind(|r| r.bb_upper),
        ind(|r| r.bb_middle),
        ind(|r| r.bb_lower),
        returns.clone(),
        pct_change(&close, 5),
        pct_change(&close, 10),
        pct_change(&close, 20),
        rolling_std(&returns, 5),
        rolling_std(&returns, 10),
        rolling_std(&returns, 20),
        ratio(&high, &low),
        ratio(&close, &open),
        volume_sma_5,
        volume_ratio,
    ];
    let close_wrapped = wrap(&close);
    for lag in LAGS {
        columns.push(shift(&close_wrapped, lag));
        columns.push(shift(&returns, lag));
    }
    let sentiment_lag_1 = shift(&score, 1);
    let sentiment_lag_3 = shift(&score, 3);
    let sentiment_ma_5 = rolling_mean(&score, 5);
    columns.extend([score, count, sentiment_lag_1, sentiment_lag_3, sentiment_ma_5]);

    debug_assert_eq!(columns.len(), FeatureSchema::canonical().len());
    Ok(columns)
}

/// Step 8: `None` for the last `horizon` rows.
fn build_targets(bars: &[PriceBar], horizon: usize) -> Vec<Option<Target>> {
    (0..bars.len())
        .map(|t| {
            let future = bars.get(t + horizon)?.close;
            let future_return = future / bars[t].close - 1.0;
            Some(Target {
                future_price: future,
                future_return,
                future_direction: u8::from(future_return > 0.0),
            })
        })
        .collect()
}

/// Step 9: indices of rows where every feature (and target, if any) is finite.
fn complete_rows(columns: &[Series], targets: Option<&[Option<Target>]>, n: usize) -> Vec<usize> {
    (0..n)
        .filter(|&t| {
            columns
                .iter()
                .all(|c| c[t].map_or(false, f64::is_finite))
        })
        .filter(|&t| match targets {
            None => true,
            Some(targets) => targets[t].map_or(false, |tg| {
                tg.future_price.is_finite() && tg.future_return.is_finite()
            }),
        })
        .collect()
}

fn gather(bars: &[PriceBar], columns: &[Series], kept: &[usize]) -> FeatureFrame {
    let rows = kept
        .iter()
        .map(|&t| columns.iter().map(|c| c[t].unwrap_or(f64::NAN)).collect())
        .collect();
    FeatureFrame {
        schema: FeatureSchema::canonical(),
        timestamps: kept.iter().map(|&t| bars[t].timestamp).collect(),
        positions: kept.to_vec(),
        rows,
    }
}
