//! Input records: price bars and daily sentiment aggregates.
//!
//! Both series enter the pipeline either from CSV files or as in-memory
//! slices. Price bars must be strictly increasing in time; [`validate_bars`]
//! enforces that before any feature is computed.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{FeatureError, FeatureResult};

/// One OHLCV observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    /// Bar timestamp (UTC).
    pub timestamp: DateTime<Utc>,
    /// Opening price
    pub open: f64,
    /// Highest price
    pub high: f64,
    /// Lowest price
    pub low: f64,
    /// Closing price
    pub close: f64,
    /// Traded volume
    pub volume: f64,
}

impl PriceBar {
    /// Calendar date of the bar in UTC, used for the sentiment join.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// Mean article sentiment for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentDailyAggregate {
    /// Calendar day (UTC).
    pub date: NaiveDate,
    /// Mean sentiment score in `[-1, 1]`.
    pub avg_sentiment_score: f64,
    /// Number of scored articles that day.
    pub article_count: u32,
}

/// A news article after external scoring. Unscored articles carry `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredArticle {
    /// Publication time.
    pub published_at: DateTime<Utc>,
    /// Sentiment in `[-1, 1]`, if the scorer produced one.
    pub sentiment_score: Option<f64>,
}

/// Groups scored articles by publication day into mean score and count.
///
/// Articles without a score are skipped. Output is ordered by date.
pub fn aggregate_daily(articles: &[ScoredArticle]) -> Vec<SentimentDailyAggregate> {
    let mut days: BTreeMap<NaiveDate, (f64, u32)> = BTreeMap::new();
    for article in articles {
        if let Some(score) = article.sentiment_score {
            let entry = days
                .entry(article.published_at.date_naive())
                .or_insert((0.0, 0));
            entry.0 += score;
            entry.1 += 1;
        }
    }
    days.into_iter()
        .map(|(date, (sum, count))| SentimentDailyAggregate {
            date,
            avg_sentiment_score: sum / f64::from(count),
            article_count: count,
        })
        .collect()
}

/// Checks ordering, uniqueness and finiteness of a bar series.
pub fn validate_bars(bars: &[PriceBar]) -> FeatureResult<()> {
    for (i, bar) in bars.iter().enumerate() {
        let values = [bar.open, bar.high, bar.low, bar.close, bar.volume];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(FeatureError::invalid_input(format!(
                "bar {i} at {} has a non-finite value",
                bar.timestamp
            )));
        }
        if i > 0 {
            let prev = &bars[i - 1];
            if bar.timestamp == prev.timestamp {
                return Err(FeatureError::invalid_input(format!(
                    "duplicate bar timestamp {}",
                    bar.timestamp
                )));
            }
            if bar.timestamp < prev.timestamp {
                return Err(FeatureError::invalid_input(format!(
                    "bars out of order: {} follows {}",
                    bar.timestamp, prev.timestamp
                )));
            }
        }
    }
    Ok(())
}

/// Returns the suffix of `bars` starting at `start` (inclusive).
pub fn bars_since(bars: &[PriceBar], start: NaiveDate) -> &[PriceBar] {
    let first = bars.partition_point(|b| b.date() < start);
    &bars[first..]
}

#[derive(Debug, Deserialize)]
struct PriceBarRecord {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Parses RFC 3339, `YYYY-MM-DD HH:MM:SS` or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_timestamp(raw: &str) -> FeatureResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(ts.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(ts) = date.and_hms_opt(0, 0, 0) {
            return Ok(ts.and_utc());
        }
    }
    Err(FeatureError::invalid_input(format!(
        "unrecognised timestamp {raw:?}"
    )))
}

/// Reads price bars with header `timestamp,open,high,low,close,volume`.
pub fn read_price_bars<R: Read>(reader: R, source: &Path) -> FeatureResult<Vec<PriceBar>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut bars = Vec::new();
    for result in csv_reader.deserialize() {
        let record: PriceBarRecord = result.map_err(|source_err| FeatureError::Csv {
            path: source.to_path_buf(),
            source: source_err,
        })?;
        bars.push(PriceBar {
            timestamp: parse_timestamp(&record.timestamp)?,
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            volume: record.volume,
        });
    }
    validate_bars(&bars)?;
    debug!(rows = bars.len(), path = %source.display(), "Parsed price bars");
    Ok(bars)
}

/// Loads and validates a price-bar CSV file.
pub fn load_price_bars(path: impl AsRef<Path>) -> FeatureResult<Vec<PriceBar>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| FeatureError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let bars = read_price_bars(BufReader::new(file), path)?;
    info!(rows = bars.len(), path = %path.display(), "Loaded price bars");
    Ok(bars)
}

/// Reads sentiment aggregates with header `date,avg_sentiment_score,article_count`.
pub fn read_sentiment<R: Read>(
    reader: R,
    source: &Path,
) -> FeatureResult<Vec<SentimentDailyAggregate>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut rows: Vec<SentimentDailyAggregate> = Vec::new();
    for result in csv_reader.deserialize() {
        let row: SentimentDailyAggregate = result.map_err(|source_err| FeatureError::Csv {
            path: source.to_path_buf(),
            source: source_err,
        })?;
        if !row.avg_sentiment_score.is_finite() {
            return Err(FeatureError::invalid_input(format!(
                "non-finite sentiment on {}",
                row.date
            )));
        }
        rows.push(row);
    }
    rows.sort_by_key(|r| r.date);
    if let Some(w) = rows.windows(2).find(|w| w[0].date == w[1].date) {
        return Err(FeatureError::invalid_input(format!(
            "duplicate sentiment date {}",
            w[0].date
        )));
    }
    Ok(rows)
}

/// Loads a sentiment-aggregate CSV file.
pub fn load_sentiment(path: impl AsRef<Path>) -> FeatureResult<Vec<SentimentDailyAggregate>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| FeatureError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let rows = read_sentiment(BufReader::new(file), path)?;
    info!(days = rows.len(), path = %path.display(), "Loaded sentiment aggregates");
    Ok(rows)
}
