//! Dense (fully connected) layer implementation.
//!
//! This module provides the [`Dense`] layer, which performs a linear transformation
//! `y = xW + b` where W is the weight matrix and b is the bias vector.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::LayerError;
use crate::initializer::Initializer;
use crate::layer::Layer;
use crate::tensor::Tensor;

/// A dense (fully connected) layer.
///
/// Performs the transformation `y = xW + b` where:
/// - `x` is the input tensor of shape `[batch_size, in_features]`
/// - `W` is the weight matrix of shape `[in_features, out_features]`
/// - `b` is the bias vector of shape `[out_features]`
///
/// # Example
///
/// ```
/// use pricecast_layers::dense::Dense;
/// use pricecast_layers::layer::Layer;
/// use pricecast_layers::tensor::Tensor;
///
/// let layer = Dense::new(16, 1, 42);
/// let output = layer.forward(&Tensor::zeros(&[4, 16])).unwrap();
/// assert_eq!(output.shape(), &[4, 1]);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    /// Weight matrix of shape [in_features, out_features]
    weights: Tensor,
    /// Bias vector of shape [out_features]
    bias: Tensor,
    /// Gradient of weights
    weights_grad: Tensor,
    /// Gradient of bias
    bias_grad: Tensor,
    /// Cached input for backward pass
    #[serde(skip)]
    cached_input: Option<Tensor>,
    in_features: usize,
    out_features: usize,
}

impl Dense {
    /// Creates a new dense layer with Glorot-uniform weights and zero bias.
    pub fn new(in_features: usize, out_features: usize, seed: u64) -> Self {
        Self::with_rng(in_features, out_features, &mut StdRng::seed_from_u64(seed))
    }

    /// Creates a new dense layer drawing its weights from a shared generator.
    pub fn with_rng(in_features: usize, out_features: usize, rng: &mut StdRng) -> Self {
        let weights = Initializer::GlorotUniform.initialize(&[in_features, out_features], rng);
        let bias = Tensor::zeros(&[out_features]);
        Self {
            weights_grad: Tensor::zeros(weights.shape()),
            bias_grad: Tensor::zeros(bias.shape()),
            weights,
            bias,
            cached_input: None,
            in_features,
            out_features,
        }
    }

    /// Creates a dense layer with custom weights and bias.
    ///
    /// # Errors
    ///
    /// Returns an error if the shapes are incompatible
    pub fn from_weights(weights: Tensor, bias: Tensor) -> Result<Self, LayerError> {
        if weights.ndim() != 2 {
            return Err(LayerError::ConfigError {
                message: format!("Weights must be 2D, got {}D", weights.ndim()),
            });
        }
        if bias.ndim() != 1 || weights.shape()[1] != bias.shape()[0] {
            return Err(LayerError::ShapeMismatch {
                expected: vec![weights.shape()[1]],
                actual: bias.shape().to_vec(),
            });
        }
        let in_features = weights.shape()[0];
        let out_features = weights.shape()[1];
        Ok(Self {
            weights_grad: Tensor::zeros(weights.shape()),
            bias_grad: Tensor::zeros(bias.shape()),
            weights,
            bias,
            cached_input: None,
            in_features,
            out_features,
        })
    }

    /// Returns the input feature dimension.
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// Returns the output feature dimension.
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Returns a reference to the weights tensor.
    pub fn weights(&self) -> &Tensor {
        &self.weights
    }

    /// Returns a reference to the bias tensor.
    pub fn bias(&self) -> &Tensor {
        &self.bias
    }

    fn check_input(&self, input: &Tensor) -> Result<(), LayerError> {
        if input.ndim() != 2 {
            return Err(LayerError::ForwardError {
                message: format!("Expected 2D input, got {}D", input.ndim()),
            });
        }
        if input.shape()[1] != self.in_features {
            return Err(LayerError::InvalidInputDimension {
                expected: self.in_features,
                actual: input.shape()[1],
            });
        }
        Ok(())
    }
}

impl Layer for Dense {
    fn forward(&self, input: &Tensor) -> Result<Tensor, LayerError> {
        self.check_input(input)?;
        Ok(input.matmul(&self.weights).add(&self.bias))
    }

    fn forward_train(&mut self, input: &Tensor) -> Result<Tensor, LayerError> {
        let output = self.forward(input)?;
        self.cached_input = Some(input.clone());
        Ok(output)
    }

    fn backward(&mut self, grad: &Tensor) -> Result<Tensor, LayerError> {
        let input = self
            .cached_input
            .as_ref()
            .ok_or(LayerError::NotInitialized)?;
        let expected = [input.shape()[0], self.out_features];
        if grad.shape() != expected {
            return Err(LayerError::ShapeMismatch {
                expected: expected.to_vec(),
                actual: grad.shape().to_vec(),
            });
        }

        // dL/dW = x^T @ dL/dy, dL/db = sum over batch, dL/dx = dL/dy @ W^T
        self.weights_grad
            .add_assign(&input.transpose().matmul(grad));
        self.bias_grad.add_assign(&grad.sum_axis(0));
        Ok(grad.matmul(&self.weights.transpose()))
    }

    fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.weights, &self.bias]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.weights, &mut self.bias]
    }

    fn gradients(&self) -> Vec<&Tensor> {
        vec![&self.weights_grad, &self.bias_grad]
    }

    fn zero_grad(&mut self) {
        self.weights_grad.fill_zero();
        self.bias_grad.fill_zero();
    }

    fn parameter_names(&self) -> Vec<String> {
        vec!["kernel".to_string(), "bias".to_string()]
    }

    fn name(&self) -> &str {
        "Dense"
    }
}
