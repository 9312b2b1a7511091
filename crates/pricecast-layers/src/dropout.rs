//! Inverted dropout.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::LayerError;
use crate::layer::Layer;
use crate::tensor::Tensor;

/// Inverted dropout layer.
///
/// In training mode each element is zeroed with probability `rate` and the
/// survivors are scaled by `1 / (1 - rate)`, so inference is the identity.
#[derive(Debug, Clone)]
pub struct Dropout {
    rate: f32,
    training: bool,
    rng: StdRng,
    mask: Option<Tensor>,
}

impl Dropout {
    /// Creates a dropout layer.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::ConfigError`] unless `rate` is in `[0, 1)`.
    pub fn new(rate: f32, seed: u64) -> Result<Self, LayerError> {
        if !(0.0..1.0).contains(&rate) {
            return Err(LayerError::ConfigError {
                message: format!("Dropout rate must be in [0, 1), got {rate}"),
            });
        }
        Ok(Self {
            rate,
            training: false,
            rng: StdRng::seed_from_u64(seed),
            mask: None,
        })
    }

    /// Returns the drop probability.
    pub fn rate(&self) -> f32 {
        self.rate
    }
}

impl Layer for Dropout {
    fn forward(&self, input: &Tensor) -> Result<Tensor, LayerError> {
        Ok(input.clone())
    }

    fn forward_train(&mut self, input: &Tensor) -> Result<Tensor, LayerError> {
        if !self.training || self.rate == 0.0 {
            self.mask = Some(Tensor::ones(input.shape()));
            return Ok(input.clone());
        }
        let keep = 1.0 - self.rate;
        let scale = 1.0 / keep;
        let data = (0..input.numel())
            .map(|_| {
                if self.rng.gen::<f32>() < keep {
                    scale
                } else {
                    0.0
                }
            })
            .collect();
        let mask = Tensor::from_data(input.shape(), data);
        let output = input.mul(&mask);
        self.mask = Some(mask);
        Ok(output)
    }

    fn backward(&mut self, grad: &Tensor) -> Result<Tensor, LayerError> {
        let mask = self.mask.as_ref().ok_or(LayerError::NotInitialized)?;
        if grad.shape() != mask.shape() {
            return Err(LayerError::ShapeMismatch {
                expected: mask.shape().to_vec(),
                actual: grad.shape().to_vec(),
            });
        }
        Ok(grad.mul(mask))
    }

    fn name(&self) -> &str {
        "Dropout"
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_validation() {
        assert!(Dropout::new(1.0, 0).is_err());
        assert!(Dropout::new(-0.1, 0).is_err());
        assert!(Dropout::new(0.2, 0).is_ok());
    }

    #[test]
    fn test_inference_is_identity() {
        let layer = Dropout::new(0.5, 0).unwrap();
        let x = Tensor::from_data(&[1, 4], vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(layer.forward(&x).unwrap(), x);
    }

    #[test]
    fn test_training_mask_scales_survivors() {
        let mut layer = Dropout::new(0.5, 11).unwrap();
        layer.set_training(true);
        let x = Tensor::ones(&[8, 64]);
        let y = layer.forward_train(&x).unwrap();
        assert!(y.data().iter().all(|&v| v == 0.0 || (v - 2.0).abs() < 1e-6));
        let kept = y.data().iter().filter(|&&v| v > 0.0).count();
        assert!(kept > 150 && kept < 362, "kept {kept}");

        let g = layer.backward(&Tensor::ones(&[8, 64])).unwrap();
        assert_eq!(g, y);
    }
}
