//! Stacked recurrent regressor.
//!
//! ```text
//! [B, L, F]
//!   -> Bidirectional LSTM(u0, sequences) -> Dropout
//!   -> LSTM(u1, sequences)               -> Dropout
//!   -> LSTM(u2, last state)              -> Dropout
//!   -> Dense(32) -> ReLU                 -> Dropout
//!   -> Dense(16) -> ReLU
//!   -> Dense(1)
//! [B, 1]
//! ```
//!
//! The model tracks its lifecycle explicitly. Weights are only trained in
//! [`ModelState::Training`] and only served in [`ModelState::Trained`].

use std::collections::BTreeMap;
use std::path::Path;

use pricecast_checkpoint::{StoredTensor, WeightSet};
use pricecast_layers::{Bidirectional, Dense, Dropout, Layer, LayerError, Lstm, ReLU, Tensor};
use pricecast_optimizer::{create_optimizer, OptimizerConfig, OptimizerDyn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::{TrainingError, TrainingResult};

/// Widths of the two fixed dense layers.
pub const DENSE_UNITS: [usize; 2] = [32, 16];

/// Lifecycle of a [`SequenceModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelState {
    /// No layers yet.
    Uninitialized,
    /// Layers exist with initial weights.
    Built,
    /// Inside a training run.
    Training,
    /// A hook ended the run before the epoch limit.
    StoppedEarly,
    /// Ready for inference.
    Trained,
}

/// Architecture and optimizer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    /// Window length.
    pub sequence_length: usize,
    /// Recurrent widths.
    pub lstm_units: [usize; 3],
    /// Dropout rate.
    pub dropout_rate: f32,
    /// Initialization and dropout seed.
    pub seed: u64,
    /// Optimizer used for every parameter.
    pub optimizer: OptimizerConfig,
}

impl ModelSpec {
    /// Derives architecture settings from a pipeline configuration.
    pub fn from_config(config: &PipelineConfig) -> TrainingResult<Self> {
        let lstm_units: [usize; 3] = config.lstm_units.as_slice().try_into().map_err(|_| {
            TrainingError::Config(format!(
                "lstm_units must have three entries, got {:?}",
                config.lstm_units
            ))
        })?;
        Ok(Self {
            sequence_length: config.sequence_length,
            lstm_units,
            dropout_rate: config.dropout_rate,
            seed: config.seed,
            optimizer: config.optimizer(),
        })
    }
}

/// Mean loss and MAE over a batch, in scaled units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchLoss {
    /// Mean squared error.
    pub mse: f64,
    /// Mean absolute error.
    pub mae: f64,
}

struct NamedLayer {
    name: &'static str,
    layer: Box<dyn Layer>,
    optimizers: Vec<Box<dyn OptimizerDyn>>,
}

/// Recurrent price regressor.
pub struct SequenceModel {
    spec: ModelSpec,
    state: ModelState,
    n_features: usize,
    layers: Vec<NamedLayer>,
}

impl std::fmt::Debug for SequenceModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceModel")
            .field("spec", &self.spec)
            .field("state", &self.state)
            .field("n_features", &self.n_features)
            .field("layers", &self.layers.iter().map(|l| l.name).collect::<Vec<_>>())
            .finish()
    }
}

impl SequenceModel {
    /// Creates an empty model; call [`build`](Self::build) before use.
    pub fn new(spec: ModelSpec) -> Self {
        Self {
            spec,
            state: ModelState::Uninitialized,
            n_features: 0,
            layers: Vec::new(),
        }
    }

    /// Builds a model and loads `weights` into it, ready for inference.
    pub fn restore(
        spec: ModelSpec,
        n_features: usize,
        weights: &WeightSet,
        source: &Path,
    ) -> TrainingResult<Self> {
        let mut model = Self::new(spec);
        model.build(n_features)?;
        model.load_weights(weights, source)?;
        model.state = ModelState::Trained;
        Ok(model)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ModelState {
        self.state
    }

    /// Architecture settings.
    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    /// Input width F.
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    fn require(&self, ok: &[ModelState], expected: &'static str) -> TrainingResult<()> {
        if ok.contains(&self.state) {
            Ok(())
        } else {
            Err(TrainingError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    /// Creates layers and optimizers for inputs of width `n_features`.
    pub fn build(&mut self, n_features: usize) -> TrainingResult<()> {
        self.require(&[ModelState::Uninitialized], "Uninitialized")?;
        if n_features == 0 {
            return Err(TrainingError::Config("model needs at least one feature".into()));
        }
        let [u0, u1, u2] = self.spec.lstm_units;
        let rate = self.spec.dropout_rate;
        let seed = self.spec.seed;
        let mut rng = StdRng::seed_from_u64(seed);

        let bilstm = Bidirectional::with_rng(n_features, u0, true, &mut rng);
        let bi_out = bilstm.output_size();
        let specs: Vec<(&'static str, Box<dyn Layer>)> = vec![
            ("bilstm", Box::new(bilstm)),
            ("dropout_1", Box::new(Dropout::new(rate, seed.wrapping_add(1))?)),
            ("lstm_1", Box::new(Lstm::with_rng(bi_out, u1, true, &mut rng))),
            ("dropout_2", Box::new(Dropout::new(rate, seed.wrapping_add(2))?)),
            ("lstm_2", Box::new(Lstm::with_rng(u1, u2, false, &mut rng))),
            ("dropout_3", Box::new(Dropout::new(rate, seed.wrapping_add(3))?)),
            ("dense_1", Box::new(Dense::with_rng(u2, DENSE_UNITS[0], &mut rng))),
            ("relu_1", Box::new(ReLU::new())),
            ("dropout_4", Box::new(Dropout::new(rate, seed.wrapping_add(4))?)),
            ("dense_2", Box::new(Dense::with_rng(DENSE_UNITS[0], DENSE_UNITS[1], &mut rng))),
            ("relu_2", Box::new(ReLU::new())),
            ("output", Box::new(Dense::with_rng(DENSE_UNITS[1], 1, &mut rng))),
        ];

        let mut layers = Vec::with_capacity(specs.len());
        for (name, layer) in specs {
            let optimizers = layer
                .parameters()
                .iter()
                .map(|_| create_optimizer(self.spec.optimizer.clone()))
                .collect::<Result<Vec<_>, _>>()?;
            layers.push(NamedLayer {
                name,
                layer,
                optimizers,
            });
        }
        self.layers = layers;
        self.n_features = n_features;
        self.state = ModelState::Built;
        info!(
            features = n_features,
            sequence_length = self.spec.sequence_length,
            parameters = self.parameter_count(),
            "Built sequence model"
        );
        Ok(())
    }

    /// Total number of trainable scalars.
    pub fn parameter_count(&self) -> usize {
        self.layers
            .iter()
            .flat_map(|l| l.layer.parameters())
            .map(Tensor::numel)
            .sum()
    }

    /// Enters [`ModelState::Training`].
    pub fn begin_training(&mut self) -> TrainingResult<()> {
        self.require(&[ModelState::Built], "Built")?;
        for l in &mut self.layers {
            l.layer.set_training(true);
        }
        self.state = ModelState::Training;
        Ok(())
    }

    /// Records that a hook stopped the run early.
    pub fn mark_stopped_early(&mut self) -> TrainingResult<()> {
        self.require(&[ModelState::Training], "Training")?;
        self.state = ModelState::StoppedEarly;
        Ok(())
    }

    /// Leaves training and becomes ready for inference.
    pub fn finish_training(&mut self) -> TrainingResult<()> {
        self.require(
            &[ModelState::Training, ModelState::StoppedEarly],
            "Training or StoppedEarly",
        )?;
        self.set_inference_mode();
        self.state = ModelState::Trained;
        Ok(())
    }

    /// Abandons a run; the model returns to [`ModelState::Built`].
    pub fn cancel_training(&mut self) -> TrainingResult<()> {
        self.require(
            &[ModelState::Training, ModelState::StoppedEarly],
            "Training or StoppedEarly",
        )?;
        self.set_inference_mode();
        self.state = ModelState::Built;
        Ok(())
    }

    fn set_inference_mode(&mut self) {
        for l in &mut self.layers {
            l.layer.set_training(false);
        }
    }

    fn check_input(&self, x: &Tensor) -> TrainingResult<()> {
        let batch = x.shape().first().copied().unwrap_or(0);
        let expected = [batch, self.spec.sequence_length, self.n_features];
        if x.shape() != expected {
            return Err(LayerError::ShapeMismatch {
                expected: expected.to_vec(),
                actual: x.shape().to_vec(),
            }
            .into());
        }
        Ok(())
    }

    fn infer(&self, x: &Tensor) -> TrainingResult<Tensor> {
        self.check_input(x)?;
        let mut out = x.clone();
        for l in &self.layers {
            out = l.layer.forward(&out)?;
        }
        Ok(out)
    }

    /// One optimization step on a batch. `x` is `[B, L, F]`, `y` is `[B, 1]`.
    pub fn train_batch(&mut self, x: &Tensor, y: &Tensor) -> TrainingResult<BatchLoss> {
        self.require(&[ModelState::Training], "Training")?;
        self.check_input(x)?;

        let mut out = x.clone();
        for l in &mut self.layers {
            l.layer.zero_grad();
            out = l.layer.forward_train(&out)?;
        }
        if out.shape() != y.shape() {
            return Err(LayerError::ShapeMismatch {
                expected: out.shape().to_vec(),
                actual: y.shape().to_vec(),
            }
            .into());
        }
        let diff = out.sub(y);
        let n = diff.numel() as f32;
        let loss = batch_loss(&diff);

        let mut grad = diff.scale(2.0 / n);
        for l in self.layers.iter_mut().rev() {
            grad = l.layer.backward(&grad)?;
        }
        for l in &mut self.layers {
            let grads: Vec<Vec<f32>> = l.layer.gradients().iter().map(|g| g.data().to_vec()).collect();
            for ((param, grad), opt) in l
                .layer
                .parameters_mut()
                .into_iter()
                .zip(&grads)
                .zip(&mut l.optimizers)
            {
                opt.apply_gradients(param.data_mut(), grad);
            }
        }
        Ok(loss)
    }

    /// Loss on held-out data without updating weights.
    pub fn evaluate_batch(&self, x: &Tensor, y: &Tensor) -> TrainingResult<BatchLoss> {
        self.require(
            &[ModelState::Training, ModelState::StoppedEarly, ModelState::Trained],
            "Training or Trained",
        )?;
        let out = self.infer(x)?;
        if out.shape() != y.shape() {
            return Err(LayerError::ShapeMismatch {
                expected: out.shape().to_vec(),
                actual: y.shape().to_vec(),
            }
            .into());
        }
        Ok(batch_loss(&out.sub(y)))
    }

    /// Scaled predictions, one per window.
    pub fn predict(&self, x: &Tensor) -> TrainingResult<Vec<f32>> {
        self.require(&[ModelState::Trained], "Trained")?;
        Ok(self.infer(x)?.into_data())
    }

    /// Current learning rate.
    pub fn learning_rate(&self) -> f32 {
        self.layers
            .iter()
            .flat_map(|l| l.optimizers.first())
            .map(|o| o.learning_rate())
            .next()
            .unwrap_or_else(|| self.spec.optimizer.learning_rate())
    }

    /// Changes the learning rate of every parameter's optimizer.
    pub fn set_learning_rate(&mut self, lr: f32) {
        for l in &mut self.layers {
            for opt in &mut l.optimizers {
                opt.set_learning_rate(lr);
            }
        }
        debug!(learning_rate = lr, "Learning rate updated");
    }

    /// Shapes of every named parameter for a model built on `n_features`.
    pub fn expected_shapes(&self) -> BTreeMap<String, Vec<usize>> {
        self.named_parameters()
            .map(|(name, t)| (name, t.shape().to_vec()))
            .collect()
    }

    fn named_parameters(&self) -> impl Iterator<Item = (String, &Tensor)> + '_ {
        self.layers.iter().flat_map(|l| {
            l.layer
                .parameter_names()
                .into_iter()
                .zip(l.layer.parameters())
                .map(move |(p, t)| (format!("{}/{p}", l.name), t))
        })
    }

    /// Snapshot of all parameters.
    pub fn weights(&self) -> WeightSet {
        let mut set = WeightSet::new();
        for (name, t) in self.named_parameters() {
            set.insert(name, StoredTensor::new(t.shape().to_vec(), t.data().to_vec()));
        }
        set
    }

    /// Overwrites all parameters from `weights`.
    ///
    /// Names and shapes must match exactly; `source` only labels errors.
    pub fn load_weights(&mut self, weights: &WeightSet, source: &Path) -> TrainingResult<()> {
        if self.state == ModelState::Uninitialized {
            return Err(TrainingError::InvalidState {
                expected: "Built, Training or Trained",
                actual: self.state,
            });
        }
        weights.check_shapes(&self.expected_shapes(), source)?;
        for l in &mut self.layers {
            let names = l.layer.parameter_names();
            for (p, tensor) in names.iter().zip(l.layer.parameters_mut()) {
                let key = format!("{}/{p}", l.name);
                if let Some(stored) = weights.get(&key) {
                    tensor.data_mut().copy_from_slice(&stored.data);
                }
            }
        }
        Ok(())
    }
}

fn batch_loss(diff: &Tensor) -> BatchLoss {
    let n = diff.numel().max(1) as f64;
    let (sq, abs) = diff
        .data()
        .iter()
        .fold((0.0f64, 0.0f64), |(s, a), &d| (s + f64::from(d * d), a + f64::from(d.abs())));
    BatchLoss {
        mse: sq / n,
        mae: abs / n,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(dropout: f32) -> ModelSpec {
        ModelSpec {
            sequence_length: 4,
            lstm_units: [4, 3, 2],
            dropout_rate: dropout,
            seed: 7,
            optimizer: OptimizerConfig::adam(0.01),
        }
    }

    fn batch() -> (Tensor, Tensor) {
        let b = 6;
        let data: Vec<f32> = (0..b * 4 * 3).map(|i| ((i % 13) as f32) / 13.0).collect();
        let x = Tensor::from_data(&[b, 4, 3], data);
        let y = Tensor::from_data(&[b, 1], (0..b).map(|i| i as f32 / b as f32).collect());
        (x, y)
    }

    #[test]
    fn test_state_machine() {
        let mut model = SequenceModel::new(spec(0.0));
        assert_eq!(model.state(), ModelState::Uninitialized);
        assert!(model.begin_training().is_err());

        model.build(3).unwrap();
        assert_eq!(model.state(), ModelState::Built);
        let (x, _) = batch();
        assert!(matches!(
            model.predict(&x),
            Err(TrainingError::InvalidState { actual: ModelState::Built, .. })
        ));

        model.begin_training().unwrap();
        model.mark_stopped_early().unwrap();
        model.finish_training().unwrap();
        assert_eq!(model.state(), ModelState::Trained);
        assert_eq!(model.predict(&x).unwrap().len(), 6);
        assert!(model.begin_training().is_err());
    }

    #[test]
    fn test_cancel_returns_to_built() {
        let mut model = SequenceModel::new(spec(0.0));
        model.build(3).unwrap();
        model.begin_training().unwrap();
        model.cancel_training().unwrap();
        assert_eq!(model.state(), ModelState::Built);
    }

    #[test]
    fn test_parameter_names_and_shapes() {
        let mut model = SequenceModel::new(spec(0.2));
        model.build(3).unwrap();
        let shapes = model.expected_shapes();
        assert_eq!(shapes["bilstm/forward/kernel"], vec![3, 16]);
        assert_eq!(shapes["bilstm/backward/recurrent_kernel"], vec![4, 16]);
        assert_eq!(shapes["lstm_1/kernel"], vec![8, 12]);
        assert_eq!(shapes["lstm_2/kernel"], vec![3, 8]);
        assert_eq!(shapes["dense_1/kernel"], vec![2, 32]);
        assert_eq!(shapes["output/bias"], vec![1]);
        assert_eq!(shapes.len(), 6 + 3 + 3 + 2 + 2 + 2);
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut model = SequenceModel::new(spec(0.0));
        model.build(3).unwrap();
        model.begin_training().unwrap();
        let (x, y) = batch();
        let first = model.evaluate_batch(&x, &y).unwrap().mse;
        for _ in 0..150 {
            model.train_batch(&x, &y).unwrap();
        }
        let last = model.evaluate_batch(&x, &y).unwrap().mse;
        assert!(last < first, "loss did not fall: {first} -> {last}");
    }

    #[test]
    fn test_wrong_window_shape() {
        let mut model = SequenceModel::new(spec(0.0));
        model.build(3).unwrap();
        model.begin_training().unwrap();
        let x = Tensor::zeros(&[2, 5, 3]);
        let y = Tensor::zeros(&[2, 1]);
        assert!(matches!(model.train_batch(&x, &y), Err(TrainingError::Layer(_))));
    }

    #[test]
    fn test_weights_round_trip() {
        let mut model = SequenceModel::new(spec(0.0));
        model.build(3).unwrap();
        model.begin_training().unwrap();
        let (x, y) = batch();
        model.train_batch(&x, &y).unwrap();
        model.finish_training().unwrap();

        let weights = model.weights();
        let restored = SequenceModel::restore(spec(0.0), 3, &weights, Path::new("mem")).unwrap();
        assert_eq!(model.predict(&x).unwrap(), restored.predict(&x).unwrap());

        // A model built for a different feature count cannot take these weights.
        assert!(SequenceModel::restore(spec(0.0), 4, &weights, Path::new("mem")).is_err());
    }

    #[test]
    fn test_learning_rate_update() {
        let mut model = SequenceModel::new(spec(0.0));
        model.build(3).unwrap();
        assert!((model.learning_rate() - 0.01).abs() < 1e-9);
        model.set_learning_rate(0.005);
        assert!((model.learning_rate() - 0.005).abs() < 1e-9);
    }
}
