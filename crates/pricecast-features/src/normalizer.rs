//! Per-column min-max scaling.
//!
//! A [`MinMaxScaler`] is an owned value with two states: unfitted and fitted.
//! Every transform on an unfitted scaler fails with
//! [`FeatureError::ScalerNotFitted`]. The pipeline keeps two independent
//! instances, one for the feature matrix and one for the target column.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{FeatureError, FeatureResult};

/// Fitted per-column statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    /// Column minimums.
    pub min: Vec<f64>,
    /// Column maximums.
    pub max: Vec<f64>,
}

impl ScalerState {
    /// Number of columns.
    pub fn n_features(&self) -> usize {
        self.min.len()
    }

    /// Checks that the two vectors agree and every bound is finite and ordered.
    pub fn validate(&self) -> FeatureResult<()> {
        if self.min.len() != self.max.len() {
            return Err(FeatureError::invalid_input(format!(
                "scaler has {} minimums and {} maximums",
                self.min.len(),
                self.max.len()
            )));
        }
        for (i, (lo, hi)) in self.min.iter().zip(&self.max).enumerate() {
            if !lo.is_finite() || !hi.is_finite() || lo > hi {
                return Err(FeatureError::invalid_input(format!(
                    "scaler column {i} has invalid range [{lo}, {hi}]"
                )));
            }
        }
        Ok(())
    }
}

/// Maps each column to `[0, 1]` using statistics from a fitting set.
///
/// Values outside the fitted range are clamped. A column whose fitted range is
/// zero maps every value to 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    state: Option<ScalerState>,
}

impl MinMaxScaler {
    /// Creates an unfitted scaler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a scaler from saved statistics.
    pub fn from_state(state: ScalerState) -> FeatureResult<Self> {
        state.validate()?;
        Ok(Self { state: Some(state) })
    }

    /// Whether `fit` has been called.
    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    /// Fitted statistics, if any.
    pub fn state(&self) -> Option<&ScalerState> {
        self.state.as_ref()
    }

    /// Number of columns the scaler was fitted on.
    pub fn n_features(&self) -> Option<usize> {
        self.state.as_ref().map(ScalerState::n_features)
    }

    /// Learns per-column minimum and maximum from `rows`.
    ///
    /// Refitting replaces the previous statistics.
    pub fn fit(&mut self, rows: &[Vec<f64>]) -> FeatureResult<()> {
        let first = rows
            .first()
            .ok_or(FeatureError::DataInsufficient { required: 1, available: 0 })?;
        let width = first.len();
        let mut min = vec![f64::INFINITY; width];
        let mut max = vec![f64::NEG_INFINITY; width];
        for (r, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(FeatureError::SchemaMismatch {
                    message: format!("row {r} has {} columns, expected {width}", row.len()),
                });
            }
            for (j, &v) in row.iter().enumerate() {
                if !v.is_finite() {
                    return Err(FeatureError::invalid_input(format!(
                        "non-finite value at row {r}, column {j}"
                    )));
                }
                min[j] = min[j].min(v);
                max[j] = max[j].max(v);
            }
        }
        if self.state.is_some() {
            warn!("Refitting an already fitted scaler; previous statistics are discarded");
        }
        debug!(rows = rows.len(), columns = width, "Fitted min-max scaler");
        self.state = Some(ScalerState { min, max });
        Ok(())
    }

    /// Fits on a single column.
    pub fn fit_column(&mut self, values: &[f64]) -> FeatureResult<()> {
        let rows: Vec<Vec<f64>> = values.iter().map(|&v| vec![v]).collect();
        self.fit(&rows)
    }

    fn fitted(&self, width: usize) -> FeatureResult<&ScalerState> {
        let state = self.state.as_ref().ok_or(FeatureError::ScalerNotFitted)?;
        if state.n_features() != width {
            return Err(FeatureError::SchemaMismatch {
                message: format!(
                    "scaler fitted on {} columns, got {width}",
                    state.n_features()
                ),
            });
        }
        Ok(state)
    }

    /// Scales one row.
    pub fn transform_row(&self, row: &[f64]) -> FeatureResult<Vec<f64>> {
        let state = self.fitted(row.len())?;
        Ok(row
            .iter()
            .zip(state.min.iter().zip(&state.max))
            .map(|(&v, (&lo, &hi))| {
                let range = hi - lo;
                if range == 0.0 {
                    0.0
                } else {
                    ((v - lo) / range).clamp(0.0, 1.0)
                }
            })
            .collect())
    }

    /// Scales every row.
    pub fn transform(&self, rows: &[Vec<f64>]) -> FeatureResult<Vec<Vec<f64>>> {
        rows.iter().map(|r| self.transform_row(r)).collect()
    }

    /// Scales a single-column series.
    pub fn transform_column(&self, values: &[f64]) -> FeatureResult<Vec<f64>> {
        self.fitted(1)?;
        values
            .iter()
            .map(|&v| self.transform_row(&[v]).map(|r| r[0]))
            .collect()
    }

    /// Maps scaled values back to the original units.
    pub fn inverse_transform(&self, rows: &[Vec<f64>]) -> FeatureResult<Vec<Vec<f64>>> {
        rows.iter()
            .map(|row| {
                let state = self.fitted(row.len())?;
                Ok(row
                    .iter()
                    .zip(state.min.iter().zip(&state.max))
                    .map(|(&v, (&lo, &hi))| lo + v * (hi - lo))
                    .collect())
            })
            .collect()
    }

    /// Inverse of [`transform_column`](Self::transform_column).
    pub fn inverse_column(&self, values: &[f64]) -> FeatureResult<Vec<f64>> {
        let state = self.fitted(1)?;
        let (lo, hi) = (state.min[0], state.max[0]);
        Ok(values.iter().map(|&v| lo + v * (hi - lo)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unfitted_scaler_refuses_to_transform() {
        let scaler = MinMaxScaler::new();
        assert!(!scaler.is_fitted());
        assert!(matches!(
            scaler.transform(&[vec![1.0]]),
            Err(FeatureError::ScalerNotFitted)
        ));
        assert!(matches!(
            scaler.inverse_column(&[0.5]),
            Err(FeatureError::ScalerNotFitted)
        ));
    }

    #[test]
    fn test_fit_transform_range_and_inverse() {
        let rows = vec![vec![1.0, 10.0], vec![3.0, 20.0], vec![2.0, 15.0]];
        let mut scaler = MinMaxScaler::new();
        scaler.fit(&rows).unwrap();
        let scaled = scaler.transform(&rows).unwrap();
        assert_eq!(scaled[0], vec![0.0, 0.0]);
        assert_eq!(scaled[1], vec![1.0, 1.0]);
        assert_eq!(scaled[2], vec![0.5, 0.5]);

        let back = scaler.inverse_transform(&scaled).unwrap();
        for (a, b) in back.iter().flatten().zip(rows.iter().flatten()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let mut scaler = MinMaxScaler::new();
        scaler.fit_column(&[0.0, 10.0]).unwrap();
        assert_eq!(scaler.transform_column(&[-5.0, 15.0]).unwrap(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_constant_column_maps_to_zero() {
        let mut scaler = MinMaxScaler::new();
        scaler.fit(&[vec![4.0, 1.0], vec![4.0, 2.0]]).unwrap();
        let scaled = scaler.transform_row(&[4.0, 1.5]).unwrap();
        assert_eq!(scaled, vec![0.0, 0.5]);
        assert_eq!(scaler.inverse_transform(&[scaled]).unwrap()[0][0], 4.0);
    }

    #[test]
    fn test_column_count_mismatch() {
        let mut scaler = MinMaxScaler::new();
        scaler.fit(&[vec![1.0, 2.0]]).unwrap();
        assert!(matches!(
            scaler.transform_row(&[1.0]),
            Err(FeatureError::SchemaMismatch { .. })
        ));
        assert!(scaler.fit(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn test_state_round_trip_through_json() {
        let mut scaler = MinMaxScaler::new();
        scaler.fit_column(&[2.0, 8.0]).unwrap();
        let json = serde_json::to_string(scaler.state().unwrap()).unwrap();
        let state: ScalerState = serde_json::from_str(&json).unwrap();
        let restored = MinMaxScaler::from_state(state).unwrap();
        assert_eq!(restored.transform_column(&[5.0]).unwrap(), vec![0.5]);
    }

    #[test]
    fn test_invalid_state_rejected() {
        let state = ScalerState { min: vec![2.0], max: vec![1.0] };
        assert!(MinMaxScaler::from_state(state).is_err());
    }
}
