//! Maps scaled model outputs back to prices and scores them.

use pricecast_features::MinMaxScaler;
use tracing::info;

use crate::error::TrainingResult;
use crate::metrics::RegressionMetrics;

/// Scores predictions with the target scaler the model was trained with.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    target_scaler: &'a MinMaxScaler,
}

impl<'a> Evaluator<'a> {
    /// Creates an evaluator over a fitted target scaler.
    pub fn new(target_scaler: &'a MinMaxScaler) -> Self {
        Self { target_scaler }
    }

    /// Scores scaled predictions against scaled truth.
    ///
    /// Both are inverse-transformed before the metrics are computed.
    pub fn evaluate(&self, pred_scaled: &[f64], truth_scaled: &[f64]) -> TrainingResult<RegressionMetrics> {
        let truth = self.target_scaler.inverse_column(truth_scaled)?;
        self.evaluate_against_prices(pred_scaled, &truth)
    }

    /// Scores scaled predictions against truth already in price units.
    ///
    /// Use this when the truth lies outside the scaler's fitted range, where
    /// scaling would clamp it.
    pub fn evaluate_against_prices(
        &self,
        pred_scaled: &[f64],
        truth: &[f64],
    ) -> TrainingResult<RegressionMetrics> {
        let pred = self.target_scaler.inverse_column(pred_scaled)?;
        let metrics = RegressionMetrics::compute(truth, &pred)?;
        info!(
            samples = truth.len(),
            rmse = metrics.rmse,
            mae = metrics.mae,
            r2 = metrics.r2,
            mape = ?metrics.mape,
            "Evaluation complete"
        );
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrainingError;
    use pricecast_features::FeatureError;

    #[test]
    fn test_inverse_scaled_metrics() {
        let mut scaler = MinMaxScaler::new();
        scaler.fit_column(&[100.0, 200.0]).unwrap();
        let evaluator = Evaluator::new(&scaler);
        let m = evaluator.evaluate(&[0.1, 0.9], &[0.0, 1.0]).unwrap();
        assert!((m.mae - 10.0).abs() < 1e-9);
        assert!((m.rmse - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_unfitted_scaler() {
        let scaler = MinMaxScaler::new();
        let err = Evaluator::new(&scaler).evaluate(&[0.5], &[0.5]).unwrap_err();
        assert!(matches!(err, TrainingError::Feature(FeatureError::ScalerNotFitted)));
    }
}
