//! Inference on a trained or restored model.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use pricecast_checkpoint::ModelArtifact;
use pricecast_features::{
    AssembledDataset, FeatureAssembler, FeatureError, FeatureFrame, FeatureSchema, MinMaxScaler,
    PriceBar, SentimentDailyAggregate, SequenceWindower,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{ForecastMode, PipelineConfig};
use crate::error::{TrainingError, TrainingResult};
use crate::evaluator::Evaluator;
use crate::metrics::RegressionMetrics;
use crate::model::{ModelSpec, ModelState, SequenceModel};
use crate::trainer::{window_tensor, TrainedPipeline};

const PREDICT_BATCH: usize = 256;

/// One step of a multi-step forecast.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    /// 1-based step.
    pub step: usize,
    /// Expected bar time, when the input carried timestamps.
    pub timestamp: Option<DateTime<Utc>>,
    /// Forecast close price.
    pub price: f64,
}

/// What [`Predictor::predict_future`] starts from.
#[derive(Debug, Clone, Copy)]
pub enum ForecastInput<'a> {
    /// Already assembled feature rows. Only static forecasts are possible.
    Features(&'a FeatureFrame),
    /// Raw bar history, re-assembled at every recursive step.
    Bars {
        /// Bars in time order.
        bars: &'a [PriceBar],
        /// Daily sentiment to join.
        sentiment: &'a [SentimentDailyAggregate],
    },
}

/// A model in the `Trained` state together with the scalers and schema it
/// was trained with.
#[derive(Debug)]
pub struct Predictor {
    model: SequenceModel,
    feature_scaler: MinMaxScaler,
    target_scaler: MinMaxScaler,
    schema: FeatureSchema,
    horizon: usize,
}

impl Predictor {
    /// Wraps a trained model.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the model is trained, `ScalerNotFitted` for an
    /// unfitted scaler, `SchemaMismatch` when the feature scaler width differs
    /// from the schema.
    pub fn new(
        model: SequenceModel,
        feature_scaler: MinMaxScaler,
        target_scaler: MinMaxScaler,
        schema: FeatureSchema,
        horizon: usize,
    ) -> TrainingResult<Self> {
        if model.state() != ModelState::Trained {
            return Err(TrainingError::InvalidState {
                expected: "Trained",
                actual: model.state(),
            });
        }
        let width = feature_scaler.n_features().ok_or(FeatureError::ScalerNotFitted)?;
        if !target_scaler.is_fitted() {
            return Err(FeatureError::ScalerNotFitted.into());
        }
        if width != schema.len() || model.n_features() != schema.len() {
            return Err(FeatureError::SchemaMismatch {
                message: format!(
                    "schema has {} features, scaler {width}, model {}",
                    schema.len(),
                    model.n_features()
                ),
            }
            .into());
        }
        Ok(Self {
            model,
            feature_scaler,
            target_scaler,
            schema,
            horizon,
        })
    }

    /// Rebuilds a predictor from a persisted artifact; `source` labels errors.
    pub fn from_artifact(artifact: &ModelArtifact, source: &Path) -> TrainingResult<Self> {
        artifact.validate(source)?;
        let c = &artifact.config;
        let config = PipelineConfig::default()
            .with_sequence_length(c.sequence_length)
            .with_horizon(c.horizon)
            .with_lstm_units(c.lstm_units.clone())
            .with_dropout_rate(c.dropout_rate);
        let schema = c.schema(source)?;
        let model = SequenceModel::restore(
            ModelSpec::from_config(&config)?,
            schema.len(),
            &artifact.weights,
            source,
        )?;
        info!(
            path = %source.display(),
            sequence_length = c.sequence_length,
            horizon = c.horizon,
            "Restored predictor"
        );
        Self::new(
            model,
            artifact.feature_scaler(source)?,
            artifact.target_scaler(source)?,
            schema,
            c.horizon,
        )
    }

    /// Window length L.
    pub fn sequence_length(&self) -> usize {
        self.model.spec().sequence_length
    }

    /// Forecast horizon in bars.
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Feature columns the model expects.
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Forecasts the close `horizon` bars after the last row.
    ///
    /// Only the last L rows are used and they are taken to be consecutive
    /// bars; use [`predict_frame`](Self::predict_frame) when rows may have
    /// been dropped.
    ///
    /// # Errors
    ///
    /// `SchemaMismatch` if `schema` differs from the training schema,
    /// `DataInsufficient` for fewer than L rows.
    pub fn predict(&self, rows: &[Vec<f64>], schema: &FeatureSchema) -> TrainingResult<f64> {
        self.schema.verify(schema)?;
        let window = SequenceWindower::new(self.sequence_length())?.last_window(rows)?;
        self.predict_window(window)
    }

    /// [`predict`](Self::predict) on an assembled frame.
    ///
    /// # Errors
    ///
    /// `WindowGap` when a bar inside the last L rows was dropped during
    /// assembly.
    pub fn predict_frame(&self, frame: &FeatureFrame) -> TrainingResult<f64> {
        self.schema.verify(frame.schema())?;
        let window = SequenceWindower::new(self.sequence_length())?
            .last_window_contiguous(frame.rows(), frame.positions())?;
        self.predict_window(window)
    }

    fn predict_window(&self, window: &[Vec<f64>]) -> TrainingResult<f64> {
        let scaled = self.feature_scaler.transform(window)?;
        let x = window_tensor(&scaled, &[scaled.len()], scaled.len());
        let out: Vec<f64> = self.model.predict(&x)?.into_iter().map(f64::from).collect();
        let price = self
            .target_scaler
            .inverse_column(&out)?
            .first()
            .copied()
            .ok_or(FeatureError::DataInsufficient {
                required: 1,
                available: 0,
            })?;
        debug!(price, "Predicted next price");
        Ok(price)
    }

    /// Forecasts `days` steps ahead.
    ///
    /// With [`ForecastMode::Static`] the one-step forecast is repeated. With
    /// [`ForecastMode::Recursive`] each forecast is appended to the history as
    /// a bar (OHLC at the forecast, volume of the last bar, spaced like the
    /// last two bars) and features are re-derived before the next step.
    ///
    /// # Errors
    ///
    /// [`TrainingError::Config`] for a recursive forecast from a feature frame
    /// or from a model whose horizon is not 1.
    pub fn predict_future(
        &self,
        input: ForecastInput<'_>,
        days: usize,
        mode: ForecastMode,
    ) -> TrainingResult<Vec<Forecast>> {
        match mode {
            ForecastMode::Static => self.static_forecast(input, days),
            ForecastMode::Recursive => self.recursive_forecast(input, days),
        }
    }

    fn static_forecast(&self, input: ForecastInput<'_>, days: usize) -> TrainingResult<Vec<Forecast>> {
        let assembled;
        let frame = match input {
            ForecastInput::Features(frame) => frame,
            ForecastInput::Bars { bars, sentiment } => {
                assembled = FeatureAssembler::new(self.horizon, self.sequence_length())?
                    .assemble_features(bars, sentiment)?;
                &assembled
            }
        };
        let price = self.predict_frame(frame)?;
        let timestamps = frame.timestamps();
        let last = timestamps.last().copied();
        let spacing = bar_spacing(timestamps);
        Ok((1..=days)
            .map(|step| Forecast {
                step,
                timestamp: last.map(|t| t + spacing * step as i32),
                price,
            })
            .collect())
    }

    fn recursive_forecast(&self, input: ForecastInput<'_>, days: usize) -> TrainingResult<Vec<Forecast>> {
        let ForecastInput::Bars { bars, sentiment } = input else {
            return Err(TrainingError::Config(
                "recursive forecasts need raw bars, not assembled features".into(),
            ));
        };
        if self.horizon != 1 {
            return Err(TrainingError::Config(format!(
                "recursive forecasts need a horizon-1 model, this one has horizon {}",
                self.horizon
            )));
        }
        let assembler = FeatureAssembler::new(self.horizon, self.sequence_length())?;
        let spacing = bar_spacing(&bars.iter().map(|b| b.timestamp).collect::<Vec<_>>());
        let mut history = bars.to_vec();
        let mut forecasts = Vec::with_capacity(days);
        for step in 1..=days {
            let frame = assembler.assemble_features(&history, sentiment)?;
            let price = self.predict_frame(&frame)?;
            let Some(last) = history.last() else {
                return Err(FeatureError::DataInsufficient {
                    required: 1,
                    available: 0,
                }
                .into());
            };
            let bar = PriceBar {
                timestamp: last.timestamp + spacing,
                open: price,
                high: price,
                low: price,
                close: price,
                volume: last.volume,
            };
            forecasts.push(Forecast {
                step,
                timestamp: Some(bar.timestamp),
                price,
            });
            history.push(bar);
        }
        debug!(days, "Recursive forecast complete");
        Ok(forecasts)
    }

    /// Scores the model on every gap-free window of a labeled dataset.
    ///
    /// Returns the metrics and the number of windows scored.
    pub fn evaluate(&self, dataset: &AssembledDataset) -> TrainingResult<(RegressionMetrics, usize)> {
        let frame = dataset.frame();
        self.schema.verify(frame.schema())?;
        if dataset.horizon() != self.horizon {
            return Err(TrainingError::Config(format!(
                "dataset horizon {} differs from model horizon {}",
                dataset.horizon(),
                self.horizon
            )));
        }
        let length = self.sequence_length();
        let ends = SequenceWindower::new(length)?.window_ends(frame.positions());
        if ends.is_empty() {
            return Err(FeatureError::DataInsufficient {
                required: length + 1,
                available: frame.len(),
            }
            .into());
        }
        let scaled = self.feature_scaler.transform(frame.rows())?;
        let mut predictions = Vec::with_capacity(ends.len());
        for batch in ends.chunks(PREDICT_BATCH) {
            let x = window_tensor(&scaled, batch, length);
            predictions.extend(self.model.predict(&x)?.into_iter().map(f64::from));
        }
        let prices = dataset.target_prices();
        let truth: Vec<f64> = ends.iter().map(|&i| prices[i]).collect();
        let metrics = Evaluator::new(&self.target_scaler).evaluate_against_prices(&predictions, &truth)?;
        Ok((metrics, ends.len()))
    }
}

impl TryFrom<TrainedPipeline> for Predictor {
    type Error = TrainingError;

    fn try_from(p: TrainedPipeline) -> TrainingResult<Self> {
        Predictor::new(p.model, p.feature_scaler, p.target_scaler, p.schema, p.config.horizon)
    }
}

/// Gap between the last two timestamps, one day when there are fewer than two.
fn bar_spacing(timestamps: &[DateTime<Utc>]) -> Duration {
    match timestamps {
        [.., a, b] if b > a => *b - *a,
        _ => Duration::days(1),
    }
}
