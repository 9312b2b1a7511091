//! Weight initialization matching the usual Keras defaults for recurrent models.
//!
//! All initializers draw from a caller-supplied [`StdRng`] so that a model built
//! from the same seed is bit-for-bit reproducible.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::tensor::Tensor;

/// Parameter initialization scheme.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum Initializer {
    /// Glorot/Xavier uniform initialization.
    #[default]
    GlorotUniform,
    /// Orthogonal rows (or columns, whichever is shorter), used for recurrent kernels.
    Orthogonal,
    /// Uniform in `[-limit, limit)`.
    Uniform(f32),
    /// All zeros.
    Zeros,
    /// Constant value.
    Constant(f32),
}

impl Initializer {
    /// Creates a tensor of `shape` filled according to this scheme.
    pub fn initialize(&self, shape: &[usize], rng: &mut StdRng) -> Tensor {
        let n: usize = shape.iter().product();
        match self {
            Initializer::Zeros => Tensor::zeros(shape),
            Initializer::Constant(value) => Tensor::full(shape, *value),
            Initializer::Uniform(limit) => uniform(shape, *limit, rng),
            Initializer::GlorotUniform => {
                let (fan_in, fan_out) = fan_in_out(shape);
                let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
                uniform(shape, limit, rng)
            }
            Initializer::Orthogonal if shape.len() == 2 && n > 0 => {
                orthogonal(shape[0], shape[1], rng)
            }
            Initializer::Orthogonal => Tensor::zeros(shape),
        }
    }
}

fn fan_in_out(shape: &[usize]) -> (usize, usize) {
    if shape.len() >= 2 {
        (shape[0].max(1), shape[1].max(1))
    } else if shape.len() == 1 {
        let dim = shape[0].max(1);
        (dim, dim)
    } else {
        (1, 1)
    }
}

fn uniform(shape: &[usize], limit: f32, rng: &mut StdRng) -> Tensor {
    let n: usize = shape.iter().product();
    let data = (0..n).map(|_| rng.gen_range(-limit..=limit)).collect();
    Tensor::from_data(shape, data)
}

fn standard_normal(rng: &mut StdRng) -> f32 {
    // Box-Muller
    let u1: f32 = rng.gen::<f32>().max(1e-10);
    let u2: f32 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
}

/// Gram-Schmidt over the shorter dimension of a Gaussian matrix.
fn orthogonal(rows: usize, cols: usize, rng: &mut StdRng) -> Tensor {
    let (count, len) = if rows <= cols { (rows, cols) } else { (cols, rows) };
    let mut basis: Vec<Vec<f32>> = Vec::with_capacity(count);
    while basis.len() < count {
        let mut v: Vec<f32> = (0..len).map(|_| standard_normal(rng)).collect();
        for b in &basis {
            let dot: f32 = v.iter().zip(b).map(|(x, y)| x * y).sum();
            v.iter_mut().zip(b).for_each(|(x, y)| *x -= dot * y);
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        // Nearly dependent draws are retried.
        if norm > 1e-4 {
            v.iter_mut().for_each(|x| *x /= norm);
            basis.push(v);
        }
    }

    let mut data = vec![0.0; rows * cols];
    for (k, v) in basis.iter().enumerate() {
        for (j, &x) in v.iter().enumerate() {
            if rows <= cols {
                data[k * cols + j] = x;
            } else {
                data[j * cols + k] = x;
            }
        }
    }
    Tensor::from_data(&[rows, cols], data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_glorot_within_limit() {
        let mut rng = StdRng::seed_from_u64(1);
        let t = Initializer::GlorotUniform.initialize(&[10, 20], &mut rng);
        let limit = (6.0f32 / 30.0).sqrt();
        assert!(t.data().iter().all(|v| v.abs() <= limit));
    }

    #[test]
    fn test_same_seed_same_weights() {
        let a = Initializer::GlorotUniform.initialize(&[4, 4], &mut StdRng::seed_from_u64(9));
        let b = Initializer::GlorotUniform.initialize(&[4, 4], &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_orthogonal_rows_are_orthonormal() {
        let mut rng = StdRng::seed_from_u64(3);
        let t = Initializer::Orthogonal.initialize(&[3, 8], &mut rng);
        let gram = t.matmul(&t.transpose());
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((gram.data()[i * 3 + j] - expected).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_orthogonal_tall_matrix_has_orthonormal_columns() {
        let mut rng = StdRng::seed_from_u64(5);
        let t = Initializer::Orthogonal.initialize(&[6, 2], &mut rng);
        let gram = t.transpose().matmul(&t);
        assert!((gram.data()[0] - 1.0).abs() < 1e-4);
        assert!(gram.data()[1].abs() < 1e-4);
        assert!((gram.data()[3] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_constant_and_zeros() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(Initializer::Zeros
            .initialize(&[3], &mut rng)
            .data()
            .iter()
            .all(|&v| v == 0.0));
        assert!(Initializer::Constant(1.0)
            .initialize(&[3], &mut rng)
            .data()
            .iter()
            .all(|&v| v == 1.0));
    }
}
