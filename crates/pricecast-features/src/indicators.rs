//! Technical indicators over a close-price series.
//!
//! Every function returns one entry per input sample; `None` marks the warm-up
//! region where the indicator is not yet defined. Moving averages are driven by
//! the `ta` crate; RSI and the Bollinger deviation are computed directly so
//! that they use simple trailing means and the sample (n - 1) standard
//! deviation respectively.

use serde::{Deserialize, Serialize};
use ta::indicators::{ExponentialMovingAverage, SimpleMovingAverage};
use ta::Next;

use crate::error::{FeatureError, FeatureResult};

/// A column where `None` means "undefined at this row".
pub type Series = Vec<Option<f64>>;

fn check_period(name: &str, period: usize) -> FeatureResult<()> {
    if period == 0 {
        return Err(FeatureError::invalid_config(format!(
            "{name} period must be positive"
        )));
    }
    Ok(())
}

/// Trailing arithmetic mean; undefined for the first `period - 1` samples.
pub fn sma(values: &[f64], period: usize) -> FeatureResult<Series> {
    check_period("SMA", period)?;
    let mut indicator = SimpleMovingAverage::new(period)
        .map_err(|e| FeatureError::invalid_config(format!("SMA({period}): {e:?}")))?;
    Ok(values
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let mean = indicator.next(v);
            (i + 1 >= period).then_some(mean)
        })
        .collect())
}

/// Exponential moving average with `alpha = 2 / (period + 1)`, seeded by the
/// first sample and defined everywhere.
pub fn ema(values: &[f64], period: usize) -> FeatureResult<Series> {
    check_period("EMA", period)?;
    let mut indicator = ExponentialMovingAverage::new(period)
        .map_err(|e| FeatureError::invalid_config(format!("EMA({period}): {e:?}")))?;
    Ok(values.iter().map(|&v| Some(indicator.next(v))).collect())
}

/// Relative strength index from simple trailing means of gains and losses.
///
/// The change into the first sample is taken as zero, so the value is defined
/// from index `period - 1`. A window without losses yields 100.
pub fn rsi(values: &[f64], period: usize) -> FeatureResult<Series> {
    check_period("RSI", period)?;
    let deltas: Vec<f64> = values
        .iter()
        .enumerate()
        .map(|(i, &v)| if i == 0 { 0.0 } else { v - values[i - 1] })
        .collect();
    let gains: Vec<Option<f64>> = deltas.iter().map(|d| Some(d.max(0.0))).collect();
    let losses: Vec<Option<f64>> = deltas.iter().map(|d| Some((-d).max(0.0))).collect();
    let mean_gain = rolling_mean(&gains, period);
    let mean_loss = rolling_mean(&losses, period);

    Ok(mean_gain
        .iter()
        .zip(mean_loss.iter())
        .map(|(g, l)| match (g, l) {
            (Some(_), Some(l)) if *l == 0.0 => Some(100.0),
            (Some(g), Some(l)) => Some(100.0 - 100.0 / (1.0 + g / l)),
            _ => None,
        })
        .collect())
}

/// MACD line, signal line and histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    /// `ema(fast) - ema(slow)`
    pub macd: Series,
    /// `ema(macd, signal)`
    pub signal: Series,
    /// `macd - signal`
    pub histogram: Series,
}

/// Moving average convergence/divergence.
pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> FeatureResult<MacdSeries> {
    let fast_ema = ema(values, fast)?;
    let slow_ema = ema(values, slow)?;
    check_period("MACD signal", signal)?;
    let mut signal_ema = ExponentialMovingAverage::new(signal)
        .map_err(|e| FeatureError::invalid_config(format!("EMA({signal}): {e:?}")))?;

    let mut out = MacdSeries {
        macd: Vec::with_capacity(values.len()),
        signal: Vec::with_capacity(values.len()),
        histogram: Vec::with_capacity(values.len()),
    };
    for (f, s) in fast_ema.iter().zip(slow_ema.iter()) {
        match (f, s) {
            (Some(f), Some(s)) => {
                let line = f - s;
                let sig = signal_ema.next(line);
                out.macd.push(Some(line));
                out.signal.push(Some(sig));
                out.histogram.push(Some(line - sig));
            }
            _ => {
                out.macd.push(None);
                out.signal.push(None);
                out.histogram.push(None);
            }
        }
    }
    Ok(out)
}

/// Bollinger bands.
#[derive(Debug, Clone, PartialEq)]
pub struct BollingerSeries {
    /// `middle + k * std`
    pub upper: Series,
    /// Trailing SMA.
    pub middle: Series,
    /// `middle - k * std`
    pub lower: Series,
}

/// Bollinger bands around a trailing SMA using the sample standard deviation.
pub fn bollinger(values: &[f64], period: usize, k: f64) -> FeatureResult<BollingerSeries> {
    let middle = sma(values, period)?;
    let wrapped: Series = values.iter().map(|&v| Some(v)).collect();
    let std = rolling_std(&wrapped, period);
    let band = |sign: f64| -> Series {
        middle
            .iter()
            .zip(std.iter())
            .map(|(m, s)| match (m, s) {
                (Some(m), Some(s)) => Some(m + sign * k * s),
                _ => None,
            })
            .collect()
    };
    Ok(BollingerSeries {
        upper: band(1.0),
        lower: band(-1.0),
        middle,
    })
}

/// Trailing mean over `window` entries; undefined if any entry in the window is.
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Series {
    rolling(values, window, |w| w.iter().sum::<f64>() / w.len() as f64)
}

/// Trailing sample standard deviation (n - 1 denominator).
///
/// Undefined for windows shorter than two samples or containing an undefined entry.
pub fn rolling_std(values: &[Option<f64>], window: usize) -> Series {
    if window < 2 {
        return vec![None; values.len()];
    }
    rolling(values, window, |w| {
        let mean = w.iter().sum::<f64>() / w.len() as f64;
        let ss: f64 = w.iter().map(|v| (v - mean) * (v - mean)).sum();
        (ss / (w.len() - 1) as f64).sqrt()
    })
}

fn rolling<F>(values: &[Option<f64>], window: usize, f: F) -> Series
where
    F: Fn(&[f64]) -> f64,
{
    let mut out = vec![None; values.len()];
    if window == 0 {
        return out;
    }
    let mut buf = Vec::with_capacity(window);
    for end in window..=values.len() {
        buf.clear();
        buf.extend(values[end - window..end].iter().flatten());
        if buf.len() == window {
            out[end - 1] = Some(f(&buf));
        }
    }
    out
}

/// Indicator values for one bar.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IndicatorRow {
    /// 20-period SMA.
    pub sma_20: Option<f64>,
    /// 50-period SMA.
    pub sma_50: Option<f64>,
    /// 12-period EMA.
    pub ema_12: Option<f64>,
    /// 26-period EMA.
    pub ema_26: Option<f64>,
    /// 14-period RSI.
    pub rsi_14: Option<f64>,
    /// MACD(12, 26) line.
    pub macd: Option<f64>,
    /// 9-period signal line.
    pub macd_signal: Option<f64>,
    /// MACD histogram.
    pub macd_histogram: Option<f64>,
    /// Upper Bollinger band (20, 2).
    pub bb_upper: Option<f64>,
    /// Middle Bollinger band.
    pub bb_middle: Option<f64>,
    /// Lower Bollinger band.
    pub bb_lower: Option<f64>,
}

/// Computes the standard indicator set for every bar.
pub fn compute_all(closes: &[f64]) -> FeatureResult<Vec<IndicatorRow>> {
    let sma_20 = sma(closes, 20)?;
    let sma_50 = sma(closes, 50)?;
    let ema_12 = ema(closes, 12)?;
    let ema_26 = ema(closes, 26)?;
    let rsi_14 = rsi(closes, 14)?;
    let m = macd(closes, 12, 26, 9)?;
    let bb = bollinger(closes, 20, 2.0)?;

    Ok((0..closes.len())
        .map(|i| IndicatorRow {
            sma_20: sma_20[i],
            sma_50: sma_50[i],
            ema_12: ema_12[i],
            ema_26: ema_26[i],
            rsi_14: rsi_14[i],
            macd: m.macd[i],
            macd_signal: m.signal[i],
            macd_histogram: m.histogram[i],
            bb_upper: bb.upper[i],
            bb_middle: bb.middle[i],
            bb_lower: bb.lower[i],
        })
        .collect())
}

/// Momentum reading from RSI or Bollinger position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandSignal {
    /// RSI above 70, or close above the upper band.
    Overbought,
    /// RSI below 30, or close below the lower band.
    Oversold,
    /// Neither, or undefined.
    Neutral,
}

/// Trend reading from MACD against its signal line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendSignal {
    /// MACD above signal.
    Bullish,
    /// MACD below signal.
    Bearish,
    /// Equal, or undefined.
    Neutral,
}

/// Discrete readings for one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorSignals {
    /// RSI zone.
    pub rsi: BandSignal,
    /// MACD crossover state.
    pub macd: TrendSignal,
    /// Close relative to the Bollinger bands.
    pub bollinger: BandSignal,
}

/// Classifies one indicator row against the bar's close.
pub fn classify(row: &IndicatorRow, close: f64) -> IndicatorSignals {
    let rsi = match row.rsi_14 {
        Some(v) if v > 70.0 => BandSignal::Overbought,
        Some(v) if v < 30.0 => BandSignal::Oversold,
        _ => BandSignal::Neutral,
    };
    let macd = match (row.macd, row.macd_signal) {
        (Some(m), Some(s)) if m > s => TrendSignal::Bullish,
        (Some(m), Some(s)) if m < s => TrendSignal::Bearish,
        _ => TrendSignal::Neutral,
    };
    let bollinger = match (row.bb_upper, row.bb_lower) {
        (Some(upper), _) if close > upper => BandSignal::Overbought,
        (_, Some(lower)) if close < lower => BandSignal::Oversold,
        _ => BandSignal::Neutral,
    };
    IndicatorSignals {
        rsi,
        macd,
        bollinger,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wave(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + 10.0 * (i as f64 * 0.3).sin() + i as f64 * 0.1)
            .collect()
    }

    #[test]
    fn test_sma_warmup_and_values() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0], 3).unwrap();
        assert_eq!(out, vec![None, None, Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_zero_period_rejected() {
        assert!(matches!(
            sma(&[1.0], 0),
            Err(FeatureError::InvalidConfig { .. })
        ));
        assert!(ema(&[1.0], 0).is_err());
        assert!(rsi(&[1.0], 0).is_err());
    }

    #[test]
    fn test_ema_seeded_by_first_value() {
        let out = ema(&[10.0, 20.0, 20.0], 3).unwrap();
        // alpha = 0.5
        assert_eq!(out, vec![Some(10.0), Some(15.0), Some(17.5)]);
    }

    #[test]
    fn test_rsi_bounds() {
        let prices = wave(120);
        for v in rsi(&prices, 14).unwrap().into_iter().flatten() {
            assert!((0.0..=100.0).contains(&v));
        }
    }

    #[test]
    fn test_rsi_warmup_and_no_loss_case() {
        let rising: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let out = rsi(&rising, 14).unwrap();
        assert!(out[..13].iter().all(Option::is_none));
        assert!(out[13..].iter().all(|v| *v == Some(100.0)));
    }

    #[test]
    fn test_rsi_known_value() {
        let out = rsi(&[10.0, 11.0, 12.0, 10.0], 3).unwrap();
        // Window at index 3: gains [1, 1, 0], losses [0, 0, 2] -> RS = 1
        assert!((out[3].unwrap() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_macd_histogram_identity() {
        let m = macd(&wave(80), 12, 26, 9).unwrap();
        for i in 0..80 {
            let (line, sig, hist) = (m.macd[i].unwrap(), m.signal[i].unwrap(), m.histogram[i].unwrap());
            assert_eq!(hist, line - sig);
        }
    }

    #[test]
    fn test_bollinger_ordering_and_sample_std() {
        let bb = bollinger(&wave(60), 20, 2.0).unwrap();
        for i in 19..60 {
            let (u, m, l) = (bb.upper[i].unwrap(), bb.middle[i].unwrap(), bb.lower[i].unwrap());
            assert!(u >= m && m >= l);
        }
        assert!(bb.upper[18].is_none());

        let simple = bollinger(&[1.0, 2.0, 3.0], 3, 1.0).unwrap();
        // sample std of [1, 2, 3] is 1
        assert!((simple.upper[2].unwrap() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_rolling_std_skips_undefined_windows() {
        let vals = vec![None, Some(1.0), Some(3.0), Some(5.0)];
        let out = rolling_std(&vals, 2);
        assert_eq!(out[1], None);
        assert!((out[2].unwrap() - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_compute_all_length() {
        let rows = compute_all(&wave(60)).unwrap();
        assert_eq!(rows.len(), 60);
        assert!(rows[48].sma_50.is_none());
        assert!(rows[49].sma_50.is_some());
    }

    #[test]
    fn test_classify() {
        let row = IndicatorRow {
            rsi_14: Some(75.0),
            macd: Some(1.0),
            macd_signal: Some(0.5),
            bb_upper: Some(105.0),
            bb_lower: Some(95.0),
            ..IndicatorRow::default()
        };
        let s = classify(&row, 94.0);
        assert_eq!(s.rsi, BandSignal::Overbought);
        assert_eq!(s.macd, TrendSignal::Bullish);
        assert_eq!(s.bollinger, BandSignal::Oversold);
        assert_eq!(classify(&IndicatorRow::default(), 1.0).macd, TrendSignal::Neutral);
    }
}
