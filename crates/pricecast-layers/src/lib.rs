//! Network layers for pricecast sequence models.
//!
//! This crate provides the building blocks of the price forecaster:
//!
//! - **LSTM**: recurrent layer with full backpropagation through time
//! - **Bidirectional**: forward and reversed LSTM pair with concatenated outputs
//! - **Dense**: fully connected linear transformation
//! - **Dropout**: inverted dropout active only in training mode
//! - **Activations**: ReLU layer plus the gate nonlinearities
//!
//! # Layer Trait
//!
//! All layers implement the [`Layer`] trait. `forward` is a pure inference pass;
//! `forward_train` caches intermediates so that `backward` can accumulate
//! parameter gradients:
//!
//! ```
//! use pricecast_layers::prelude::*;
//! use rand::SeedableRng;
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(42);
//! let mut lstm = Lstm::with_rng(8, 16, false, &mut rng);
//! let window = Tensor::zeros(&[4, 30, 8]); // batch of 4, 30 steps
//! let last_state = lstm.forward_train(&window).unwrap();
//! assert_eq!(last_state.shape(), &[4, 16]);
//! let dx = lstm.backward(&Tensor::ones(&[4, 16])).unwrap();
//! assert_eq!(dx.shape(), window.shape());
//! ```

#![warn(missing_docs)]

pub mod activation;
pub mod bidirectional;
pub mod dense;
pub mod dropout;
pub mod error;
pub mod initializer;
pub mod layer;
pub mod lstm;
pub mod tensor;

pub use activation::ReLU;
pub use bidirectional::Bidirectional;
pub use dense::Dense;
pub use dropout::Dropout;
pub use error::{LayerError, LayerResult};
pub use initializer::Initializer;
pub use layer::Layer;
pub use lstm::Lstm;
pub use tensor::Tensor;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::activation::ReLU;
    pub use crate::bidirectional::Bidirectional;
    pub use crate::dense::Dense;
    pub use crate::dropout::Dropout;
    pub use crate::error::{LayerError, LayerResult};
    pub use crate::initializer::Initializer;
    pub use crate::layer::Layer;
    pub use crate::lstm::Lstm;
    pub use crate::tensor::Tensor;
}
