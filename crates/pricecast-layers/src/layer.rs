//! Layer trait definition for network layers.
//!
//! This module defines the core [`Layer`] trait that all layers implement,
//! providing a unified interface for inference, training forward passes and
//! backpropagation.

use crate::error::LayerError;
use crate::tensor::Tensor;

/// A network layer that supports forward and backward propagation.
///
/// Layers keep two forward paths. [`Layer::forward`] is a pure inference pass
/// that never mutates state. [`Layer::forward_train`] caches whatever the
/// backward pass needs (inputs, gate activations, dropout masks) and must be
/// called before [`Layer::backward`].
///
/// Gradients accumulate into per-parameter buffers exposed through
/// [`Layer::gradients`], ordered exactly like [`Layer::parameters`].
///
/// # Example
///
/// ```
/// use pricecast_layers::dense::Dense;
/// use pricecast_layers::layer::Layer;
/// use pricecast_layers::tensor::Tensor;
///
/// let layer = Dense::new(128, 64, 7);
/// let input = Tensor::zeros(&[32, 128]);
/// let output = layer.forward(&input).unwrap();
/// assert_eq!(output.shape(), &[32, 64]);
/// ```
pub trait Layer: Send + Sync {
    /// Performs an inference forward pass.
    ///
    /// # Errors
    ///
    /// Returns a [`LayerError`] if the input shape is incompatible with the layer
    fn forward(&self, input: &Tensor) -> Result<Tensor, LayerError>;

    /// Performs a training forward pass, caching intermediates for [`Layer::backward`].
    ///
    /// Defaults to [`Layer::forward`] for stateless layers.
    fn forward_train(&mut self, input: &Tensor) -> Result<Tensor, LayerError> {
        self.forward(input)
    }

    /// Performs a backward pass through the layer.
    ///
    /// Takes the gradient of the loss with respect to the layer's output,
    /// accumulates parameter gradients, and returns the gradient with respect
    /// to the layer's input.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::NotInitialized`] if no training forward pass is cached,
    /// or a shape error if the gradient does not match the cached output.
    fn backward(&mut self, grad: &Tensor) -> Result<Tensor, LayerError>;

    /// Returns references to the layer's learnable parameters.
    fn parameters(&self) -> Vec<&Tensor> {
        Vec::new()
    }

    /// Returns mutable references to the layer's learnable parameters.
    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        Vec::new()
    }

    /// Returns the accumulated gradients, aligned with [`Layer::parameters`].
    fn gradients(&self) -> Vec<&Tensor> {
        Vec::new()
    }

    /// Resets accumulated gradients to zero.
    fn zero_grad(&mut self) {}

    /// Stable names for the parameters, aligned with [`Layer::parameters`].
    fn parameter_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Returns the name of the layer for debugging and logging purposes.
    fn name(&self) -> &str {
        "Layer"
    }

    /// Returns whether the layer is in training mode.
    ///
    /// Some layers behave differently during training vs inference
    /// (e.g., Dropout).
    fn is_training(&self) -> bool {
        false
    }

    /// Sets the layer's training mode.
    fn set_training(&mut self, _training: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockLayer {
        weight: Tensor,
        grad: Tensor,
        training: bool,
    }

    impl MockLayer {
        fn new() -> Self {
            Self {
                weight: Tensor::zeros(&[10, 10]),
                grad: Tensor::zeros(&[10, 10]),
                training: true,
            }
        }
    }

    impl Layer for MockLayer {
        fn forward(&self, input: &Tensor) -> Result<Tensor, LayerError> {
            Ok(input.clone())
        }

        fn backward(&mut self, grad: &Tensor) -> Result<Tensor, LayerError> {
            Ok(grad.clone())
        }

        fn parameters(&self) -> Vec<&Tensor> {
            vec![&self.weight]
        }

        fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
            vec![&mut self.weight]
        }

        fn gradients(&self) -> Vec<&Tensor> {
            vec![&self.grad]
        }

        fn name(&self) -> &str {
            "MockLayer"
        }

        fn is_training(&self) -> bool {
            self.training
        }

        fn set_training(&mut self, training: bool) {
            self.training = training;
        }
    }

    #[test]
    fn test_layer_trait() {
        let mut layer = MockLayer::new();
        let input = Tensor::zeros(&[2, 10]);

        let output = layer.forward_train(&input).unwrap();
        assert_eq!(output.shape(), input.shape());

        let grad = Tensor::ones(&[2, 10]);
        let input_grad = layer.backward(&grad).unwrap();
        assert_eq!(input_grad.shape(), grad.shape());

        assert_eq!(layer.parameters().len(), layer.gradients().len());
        assert_eq!(layer.name(), "MockLayer");
    }

    #[test]
    fn test_training_mode() {
        let mut layer = MockLayer::new();
        assert!(layer.is_training());

        layer.set_training(false);
        assert!(!layer.is_training());
    }
}
