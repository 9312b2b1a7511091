#![allow(clippy::needless_range_loop)]
//! Tensor type for network computations.
//!
//! A dense, row-major `f32` array. Sequence data uses the `[batch, time, features]`
//! layout throughout the crate; the time-step helpers below assume it.

use serde::{Deserialize, Serialize};

use crate::error::LayerError;

/// A multi-dimensional array for network computations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    /// The shape of the tensor (dimensions)
    shape: Vec<usize>,
    /// The underlying data in row-major order
    data: Vec<f32>,
}

impl Tensor {
    /// Creates a new tensor with the given shape, filled with zeros.
    ///
    /// # Example
    ///
    /// ```
    /// use pricecast_layers::tensor::Tensor;
    ///
    /// let t = Tensor::zeros(&[2, 3]);
    /// assert_eq!(t.shape(), &[2, 3]);
    /// assert_eq!(t.numel(), 6);
    /// ```
    pub fn zeros(shape: &[usize]) -> Self {
        let numel: usize = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: vec![0.0; numel],
        }
    }

    /// Creates a new tensor with the given shape, filled with ones.
    pub fn ones(shape: &[usize]) -> Self {
        Self::full(shape, 1.0)
    }

    /// Creates a new tensor with every element set to `value`.
    pub fn full(shape: &[usize], value: f32) -> Self {
        let numel: usize = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: vec![value; numel],
        }
    }

    /// Creates a new tensor with the given shape and data.
    ///
    /// # Panics
    ///
    /// Panics if the data length doesn't match the shape
    pub fn from_data(shape: &[usize], data: Vec<f32>) -> Self {
        let numel: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            numel,
            "Data length {} doesn't match shape {:?} (expected {})",
            data.len(),
            shape,
            numel
        );
        Self {
            shape: shape.to_vec(),
            data,
        }
    }

    /// Fallible variant of [`Tensor::from_data`] for data coming from outside the process.
    pub fn try_from_data(shape: &[usize], data: Vec<f32>) -> Result<Self, LayerError> {
        let numel: usize = shape.iter().product();
        if data.len() != numel {
            return Err(LayerError::ShapeMismatch {
                expected: shape.to_vec(),
                actual: vec![data.len()],
            });
        }
        Ok(Self {
            shape: shape.to_vec(),
            data,
        })
    }

    /// Returns the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Returns the total number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Returns the underlying data.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Returns the underlying data mutably.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Consumes the tensor and returns its data.
    pub fn into_data(self) -> Vec<f32> {
        self.data
    }

    /// Size of the last dimension, or 0 for a scalar shape.
    pub fn last_dim(&self) -> usize {
        self.shape.last().copied().unwrap_or(0)
    }

    /// Matrix multiplication of two 2D tensors.
    ///
    /// # Panics
    ///
    /// Panics if the inner dimensions don't match
    pub fn matmul(&self, other: &Tensor) -> Tensor {
        assert_eq!(self.ndim(), 2, "matmul requires 2D tensors");
        assert_eq!(other.ndim(), 2, "matmul requires 2D tensors");
        assert_eq!(
            self.shape[1], other.shape[0],
            "Inner dimensions must match for matmul"
        );

        let m = self.shape[0];
        let k = self.shape[1];
        let n = other.shape[1];

        let mut result = vec![0.0; m * n];
        for i in 0..m {
            let row = &self.data[i * k..(i + 1) * k];
            let out = &mut result[i * n..(i + 1) * n];
            for (l, &a) in row.iter().enumerate() {
                if a == 0.0 {
                    continue;
                }
                let other_row = &other.data[l * n..(l + 1) * n];
                for j in 0..n {
                    out[j] += a * other_row[j];
                }
            }
        }

        Tensor::from_data(&[m, n], result)
    }

    /// Transposes a 2D tensor.
    pub fn transpose(&self) -> Tensor {
        assert_eq!(self.ndim(), 2, "transpose requires 2D tensor");
        let m = self.shape[0];
        let n = self.shape[1];

        let mut result = vec![0.0; m * n];
        for i in 0..m {
            for j in 0..n {
                result[j * m + i] = self.data[i * n + j];
            }
        }

        Tensor::from_data(&[n, m], result)
    }

    /// Element-wise addition with row broadcasting of a 1D operand.
    pub fn add(&self, other: &Tensor) -> Tensor {
        if self.shape == other.shape {
            self.zip_map(other, |a, b| a + b)
        } else if other.numel() == 1 {
            let scalar = other.data[0];
            self.map(|a| a + scalar)
        } else if other.ndim() == 1 && self.last_dim() == other.shape[0] {
            let n = other.shape[0];
            let mut data = self.data.clone();
            for (i, v) in data.iter_mut().enumerate() {
                *v += other.data[i % n];
            }
            Tensor::from_data(&self.shape, data)
        } else {
            panic!(
                "Cannot broadcast shapes {:?} and {:?}",
                self.shape, other.shape
            );
        }
    }

    /// Element-wise subtraction of same-shaped tensors.
    pub fn sub(&self, other: &Tensor) -> Tensor {
        assert_eq!(self.shape, other.shape, "sub requires equal shapes");
        self.zip_map(other, |a, b| a - b)
    }

    /// Element-wise multiplication of same-shaped tensors.
    pub fn mul(&self, other: &Tensor) -> Tensor {
        assert_eq!(self.shape, other.shape, "mul requires equal shapes");
        self.zip_map(other, |a, b| a * b)
    }

    /// In-place element-wise accumulation.
    pub fn add_assign(&mut self, other: &Tensor) {
        assert_eq!(self.shape, other.shape, "add_assign requires equal shapes");
        for (a, b) in self.data.iter_mut().zip(other.data.iter()) {
            *a += b;
        }
    }

    /// Sets every element to zero, keeping the shape.
    pub fn fill_zero(&mut self) {
        self.data.iter_mut().for_each(|v| *v = 0.0);
    }

    /// Scalar multiplication.
    pub fn scale(&self, scalar: f32) -> Tensor {
        self.map(|a| a * scalar)
    }

    /// Sum all elements in the tensor.
    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }

    /// Sum of a 2D tensor along an axis.
    pub fn sum_axis(&self, axis: usize) -> Tensor {
        assert_eq!(self.ndim(), 2, "sum_axis only implemented for 2D tensors");
        let m = self.shape[0];
        let n = self.shape[1];
        if axis == 0 {
            let mut result = vec![0.0; n];
            for i in 0..m {
                for j in 0..n {
                    result[j] += self.data[i * n + j];
                }
            }
            Tensor::from_data(&[n], result)
        } else {
            let result: Vec<f32> = (0..m)
                .map(|i| self.data[i * n..(i + 1) * n].iter().sum())
                .collect();
            Tensor::from_data(&[m], result)
        }
    }

    /// Apply a function element-wise.
    pub fn map<F>(&self, f: F) -> Tensor
    where
        F: Fn(f32) -> f32,
    {
        let data: Vec<f32> = self.data.iter().map(|&x| f(x)).collect();
        Tensor::from_data(&self.shape, data)
    }

    /// Combine two same-shaped tensors element-wise.
    pub fn zip_map<F>(&self, other: &Tensor, f: F) -> Tensor
    where
        F: Fn(f32, f32) -> f32,
    {
        let data: Vec<f32> = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| f(a, b))
            .collect();
        Tensor::from_data(&self.shape, data)
    }

    /// Reshape the tensor to a new shape.
    ///
    /// # Panics
    ///
    /// Panics if the new shape has a different number of elements
    pub fn reshape(&self, new_shape: &[usize]) -> Tensor {
        let new_numel: usize = new_shape.iter().product();
        assert_eq!(
            self.numel(),
            new_numel,
            "Cannot reshape tensor of {} elements to shape {:?}",
            self.numel(),
            new_shape
        );
        Tensor::from_data(new_shape, self.data.clone())
    }

    /// Extracts time step `t` of a `[batch, time, features]` tensor as `[batch, features]`.
    pub fn time_step(&self, t: usize) -> Tensor {
        assert_eq!(self.ndim(), 3, "time_step requires a 3D tensor");
        let (batch, steps, features) = (self.shape[0], self.shape[1], self.shape[2]);
        assert!(t < steps, "time step {t} out of range {steps}");
        let mut data = Vec::with_capacity(batch * features);
        for b in 0..batch {
            let start = (b * steps + t) * features;
            data.extend_from_slice(&self.data[start..start + features]);
        }
        Tensor::from_data(&[batch, features], data)
    }

    /// Stacks `[batch, features]` tensors into `[batch, time, features]`.
    pub fn stack_time(steps: &[Tensor]) -> Tensor {
        assert!(!steps.is_empty(), "stack_time requires at least one step");
        let batch = steps[0].shape[0];
        let features = steps[0].shape[1];
        let mut data = vec![0.0; batch * steps.len() * features];
        for (t, step) in steps.iter().enumerate() {
            assert_eq!(step.shape, [batch, features], "inconsistent step shape");
            for b in 0..batch {
                let dst = (b * steps.len() + t) * features;
                data[dst..dst + features]
                    .copy_from_slice(&step.data[b * features..(b + 1) * features]);
            }
        }
        Tensor::from_data(&[batch, steps.len(), features], data)
    }

    /// Reverses the time axis of a `[batch, time, features]` tensor.
    pub fn reverse_time(&self) -> Tensor {
        assert_eq!(self.ndim(), 3, "reverse_time requires a 3D tensor");
        let (batch, steps, features) = (self.shape[0], self.shape[1], self.shape[2]);
        let mut data = vec![0.0; self.data.len()];
        for b in 0..batch {
            for t in 0..steps {
                let src = (b * steps + t) * features;
                let dst = (b * steps + (steps - 1 - t)) * features;
                data[dst..dst + features].copy_from_slice(&self.data[src..src + features]);
            }
        }
        Tensor::from_data(&self.shape, data)
    }

    /// Concatenates two tensors along their last dimension.
    pub fn concat_last(&self, other: &Tensor) -> Tensor {
        let lead = &self.shape[..self.ndim() - 1];
        assert_eq!(
            lead,
            &other.shape[..other.ndim() - 1],
            "concat_last requires matching leading dimensions"
        );
        let (a, b) = (self.last_dim(), other.last_dim());
        let rows: usize = lead.iter().product();
        let mut data = Vec::with_capacity(rows * (a + b));
        for r in 0..rows {
            data.extend_from_slice(&self.data[r * a..(r + 1) * a]);
            data.extend_from_slice(&other.data[r * b..(r + 1) * b]);
        }
        let mut shape = lead.to_vec();
        shape.push(a + b);
        Tensor::from_data(&shape, data)
    }

    /// Splits a tensor along its last dimension at `at`.
    pub fn split_last(&self, at: usize) -> (Tensor, Tensor) {
        let n = self.last_dim();
        assert!(at <= n, "split point {at} beyond last dimension {n}");
        let lead = &self.shape[..self.ndim() - 1];
        let rows: usize = lead.iter().product();
        let mut left = Vec::with_capacity(rows * at);
        let mut right = Vec::with_capacity(rows * (n - at));
        for r in 0..rows {
            left.extend_from_slice(&self.data[r * n..r * n + at]);
            right.extend_from_slice(&self.data[r * n + at..(r + 1) * n]);
        }
        let mut left_shape = lead.to_vec();
        left_shape.push(at);
        let mut right_shape = lead.to_vec();
        right_shape.push(n - at);
        (
            Tensor::from_data(&left_shape, left),
            Tensor::from_data(&right_shape, right),
        )
    }
}

impl std::ops::Add for &Tensor {
    type Output = Tensor;

    fn add(self, other: &Tensor) -> Tensor {
        Tensor::add(self, other)
    }
}

impl std::ops::Mul for &Tensor {
    type Output = Tensor;

    fn mul(self, other: &Tensor) -> Tensor {
        Tensor::mul(self, other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_creation() {
        let t = Tensor::zeros(&[2, 3]);
        assert_eq!(t.shape(), &[2, 3]);
        assert_eq!(t.numel(), 6);
        assert!(t.data().iter().all(|&x| x == 0.0));

        let t = Tensor::ones(&[3, 2]);
        assert!(t.data().iter().all(|&x| x == 1.0));
    }

    #[test]
    fn test_try_from_data_rejects_bad_length() {
        assert!(Tensor::try_from_data(&[2, 2], vec![1.0; 3]).is_err());
        assert!(Tensor::try_from_data(&[2, 2], vec![1.0; 4]).is_ok());
    }

    #[test]
    fn test_matmul() {
        let a = Tensor::from_data(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = Tensor::from_data(&[3, 2], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let c = a.matmul(&b);
        assert_eq!(c.shape(), &[2, 2]);
        assert_eq!(c.data(), &[22.0, 28.0, 49.0, 64.0]);
    }

    #[test]
    fn test_transpose() {
        let a = Tensor::from_data(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = a.transpose();
        assert_eq!(b.shape(), &[3, 2]);
        assert_eq!(b.data(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_add_broadcast() {
        let a = Tensor::from_data(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = Tensor::from_data(&[3], vec![10.0, 20.0, 30.0]);
        let c = a.add(&b);
        assert_eq!(c.data(), &[11.0, 22.0, 33.0, 14.0, 25.0, 36.0]);
    }

    #[test]
    fn test_sum_axis() {
        let a = Tensor::from_data(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(a.sum_axis(0).data(), &[5.0, 7.0, 9.0]);
        assert_eq!(a.sum_axis(1).data(), &[6.0, 15.0]);
    }

    #[test]
    fn test_time_step_and_stack_are_inverse() {
        let x = Tensor::from_data(&[2, 3, 2], (0..12).map(|v| v as f32).collect());
        let steps: Vec<Tensor> = (0..3).map(|t| x.time_step(t)).collect();
        assert_eq!(steps[1].data(), &[2.0, 3.0, 8.0, 9.0]);
        assert_eq!(Tensor::stack_time(&steps), x);
    }

    #[test]
    fn test_reverse_time() {
        let x = Tensor::from_data(&[1, 3, 1], vec![1.0, 2.0, 3.0]);
        assert_eq!(x.reverse_time().data(), &[3.0, 2.0, 1.0]);
        assert_eq!(x.reverse_time().reverse_time(), x);
    }

    #[test]
    fn test_concat_and_split_last() {
        let a = Tensor::from_data(&[2, 1], vec![1.0, 2.0]);
        let b = Tensor::from_data(&[2, 2], vec![3.0, 4.0, 5.0, 6.0]);
        let c = a.concat_last(&b);
        assert_eq!(c.shape(), &[2, 3]);
        assert_eq!(c.data(), &[1.0, 3.0, 4.0, 2.0, 5.0, 6.0]);
        let (l, r) = c.split_last(1);
        assert_eq!(l, a);
        assert_eq!(r, b);
    }
}
