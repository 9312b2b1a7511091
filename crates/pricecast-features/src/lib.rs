//! Feature engineering for pricecast.
//!
//! Turns an OHLCV bar series and optional daily news sentiment into model
//! inputs:
//!
//! - **Indicators**: SMA, EMA, RSI, MACD and Bollinger bands over close
//! - **Assembler**: the fixed 42-column feature schema plus horizon targets,
//!   followed by an explicit filtering stage for incomplete rows
//! - **Normalizer**: per-column min-max scaling with an explicit fitted state
//! - **Windower**: fixed-length sliding windows for sequence models
//!
//! ```
//! use pricecast_features::prelude::*;
//! use chrono::{Duration, TimeZone, Utc};
//!
//! let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
//! let bars: Vec<PriceBar> = (0..120)
//!     .map(|i| {
//!         let close = 100.0 + i as f64;
//!         PriceBar {
//!             timestamp: start + Duration::days(i),
//!             open: close - 0.5,
//!             high: close + 1.0,
//!             low: close - 1.0,
//!             close,
//!             volume: 1_000.0,
//!         }
//!     })
//!     .collect();
//!
//! let dataset = FeatureAssembler::new(1, 20).unwrap().assemble(&bars, &[]).unwrap();
//! let mut scaler = MinMaxScaler::new();
//! scaler.fit(dataset.frame().rows()).unwrap();
//! let x = scaler.transform(dataset.frame().rows()).unwrap();
//! let windows = SequenceWindower::new(20).unwrap().windows(&x, &dataset.target_prices()).unwrap();
//! assert_eq!(windows.len(), dataset.len() - 20);
//! ```

#![warn(missing_docs)]

pub mod assembler;
pub mod bars;
pub mod error;
pub mod indicators;
pub mod normalizer;
pub mod schema;
pub mod windower;

pub use assembler::{AssembledDataset, FeatureAssembler, FeatureFrame, Target};
pub use bars::{
    aggregate_daily, bars_since, load_price_bars, load_sentiment, parse_timestamp,
    read_price_bars, read_sentiment, validate_bars, PriceBar, ScoredArticle,
    SentimentDailyAggregate,
};
pub use error::{FeatureError, FeatureResult};
pub use indicators::{classify, compute_all, IndicatorRow, IndicatorSignals};
pub use normalizer::{MinMaxScaler, ScalerState};
pub use schema::{target_names, FeatureGroup, FeatureSchema, FEATURE_NAMES};
pub use windower::{SequenceWindower, Window};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::assembler::{AssembledDataset, FeatureAssembler, FeatureFrame};
    pub use crate::bars::{PriceBar, SentimentDailyAggregate};
    pub use crate::error::{FeatureError, FeatureResult};
    pub use crate::normalizer::{MinMaxScaler, ScalerState};
    pub use crate::schema::FeatureSchema;
    pub use crate::windower::SequenceWindower;
}
