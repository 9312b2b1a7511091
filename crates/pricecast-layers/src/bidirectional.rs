//! Bidirectional wrapper around two [`Lstm`] layers.
//!
//! The backward layer reads the sequence in reverse. Its outputs are flipped
//! back to chronological order before being concatenated with the forward
//! outputs along the feature axis, so step `t` of the result sees the whole
//! sequence. Without `return_sequences` the final states of both directions
//! are concatenated.

use rand::rngs::StdRng;

use crate::error::LayerError;
use crate::layer::Layer;
use crate::lstm::Lstm;
use crate::tensor::Tensor;

/// Bidirectional LSTM producing `2 * hidden` features per step.
#[derive(Debug, Clone)]
pub struct Bidirectional {
    forward: Lstm,
    backward: Lstm,
}

impl Bidirectional {
    /// Creates a bidirectional LSTM; both directions draw from `rng`.
    pub fn with_rng(
        input_size: usize,
        hidden_size: usize,
        return_sequences: bool,
        rng: &mut StdRng,
    ) -> Self {
        Self {
            forward: Lstm::with_rng(input_size, hidden_size, return_sequences, rng),
            backward: Lstm::with_rng(input_size, hidden_size, return_sequences, rng),
        }
    }

    /// Output width per step.
    pub fn output_size(&self) -> usize {
        2 * self.forward.hidden_size()
    }

    fn merge(&self, fwd: Tensor, bwd: Tensor) -> Tensor {
        if self.forward.return_sequences() {
            fwd.concat_last(&bwd.reverse_time())
        } else {
            fwd.concat_last(&bwd)
        }
    }
}

impl Layer for Bidirectional {
    fn forward(&self, input: &Tensor) -> Result<Tensor, LayerError> {
        let fwd = self.forward.forward(input)?;
        let bwd = self.backward.forward(&input.reverse_time())?;
        Ok(self.merge(fwd, bwd))
    }

    fn forward_train(&mut self, input: &Tensor) -> Result<Tensor, LayerError> {
        let fwd = self.forward.forward_train(input)?;
        let bwd = self.backward.forward_train(&input.reverse_time())?;
        Ok(self.merge(fwd, bwd))
    }

    fn backward(&mut self, grad: &Tensor) -> Result<Tensor, LayerError> {
        if grad.last_dim() != self.output_size() {
            return Err(LayerError::InvalidOutputDimension {
                expected: self.output_size(),
                actual: grad.last_dim(),
            });
        }
        let (g_fwd, g_bwd) = grad.split_last(self.forward.hidden_size());
        let g_bwd = if self.backward.return_sequences() {
            g_bwd.reverse_time()
        } else {
            g_bwd
        };
        let dx_fwd = self.forward.backward(&g_fwd)?;
        let dx_bwd = self.backward.backward(&g_bwd)?.reverse_time();
        Ok(dx_fwd.add(&dx_bwd))
    }

    fn parameters(&self) -> Vec<&Tensor> {
        let mut params = self.forward.parameters();
        params.extend(self.backward.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.forward.parameters_mut();
        params.extend(self.backward.parameters_mut());
        params
    }

    fn gradients(&self) -> Vec<&Tensor> {
        let mut grads = self.forward.gradients();
        grads.extend(self.backward.gradients());
        grads
    }

    fn zero_grad(&mut self) {
        self.forward.zero_grad();
        self.backward.zero_grad();
    }

    fn parameter_names(&self) -> Vec<String> {
        let fwd = self.forward.parameter_names().into_iter().map(|n| format!("forward/{n}"));
        let bwd = self.backward.parameter_names().into_iter().map(|n| format!("backward/{n}"));
        fwd.chain(bwd).collect()
    }

    fn name(&self) -> &str {
        "Bidirectional"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn input() -> Tensor {
        let data = (0..2 * 5 * 3).map(|v| ((v as f32) * 0.21).cos()).collect();
        Tensor::from_data(&[2, 5, 3], data)
    }

    #[test]
    fn test_output_width_doubles() {
        let layer = Bidirectional::with_rng(3, 4, true, &mut StdRng::seed_from_u64(0));
        assert_eq!(layer.forward(&input()).unwrap().shape(), &[2, 5, 8]);
        assert_eq!(layer.parameters().len(), 6);
        assert_eq!(layer.parameter_names()[3], "backward/kernel");
    }

    #[test]
    fn test_backward_half_reads_reversed_sequence() {
        let layer = Bidirectional::with_rng(3, 4, true, &mut StdRng::seed_from_u64(1));
        let x = input();
        let out = layer.forward(&x).unwrap();
        let reversed = layer.backward.forward(&x.reverse_time()).unwrap();
        // Step 0 of the merged output holds the backward state after the full reversed pass.
        let (_, bwd_half) = out.split_last(4);
        assert_eq!(bwd_half.time_step(0), reversed.time_step(4));
    }

    #[test]
    fn test_input_gradient_matches_finite_difference() {
        let mut layer = Bidirectional::with_rng(3, 3, true, &mut StdRng::seed_from_u64(2));
        let x = input();
        let y = layer.forward_train(&x).unwrap();
        let dx = layer.backward(&y).unwrap();
        assert_eq!(dx.shape(), x.shape());

        let loss = |t: &Tensor| -> f32 {
            layer.forward(t).unwrap().data().iter().map(|v| 0.5 * v * v).sum()
        };
        let eps = 1e-2;
        let mut plus = x.clone();
        plus.data_mut()[4] += eps;
        let mut minus = x.clone();
        minus.data_mut()[4] -= eps;
        let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps);
        assert!((dx.data()[4] - numeric).abs() < 1e-2 * (1.0 + numeric.abs()));
    }
}
