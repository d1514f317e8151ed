// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Host tensor type and view abstractions.

use crate::{Shape, TensorError};

/// An owned, n-dimensional `f32` tensor stored in contiguous row-major memory.
///
/// `Tensor` is the data carrier between the loader, the executable, and
/// output callbacks. Its buffer is meant to be reused: [`Tensor::resize`]
/// and [`Tensor::copy_from`] keep the existing allocation when it is large
/// enough, so repeated executions do not reallocate.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Shape,
    data: Vec<f32>,
}

/// Summary statistics over a tensor's values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TensorStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    /// Largest absolute value; `f32::INFINITY` if any value is non-finite.
    pub max_abs: f32,
}

impl Tensor {
    /// Creates a new tensor filled with zeros.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape};
    /// let t = Tensor::zeros(Shape::matrix(2, 3));
    /// assert_eq!(t.num_elements(), 6);
    /// ```
    pub fn zeros(shape: Shape) -> Self {
        let n = shape.num_elements();
        Self {
            shape,
            data: vec![0.0; n],
        }
    }

    /// Creates a tensor that takes ownership of `values`.
    ///
    /// Returns an error if `values.len()` does not match the shape.
    pub fn from_vec(shape: Shape, values: Vec<f32>) -> Result<Self, TensorError> {
        let Some(expected) = shape.checked_num_elements() else {
            return Err(TensorError::ShapeOverflow { shape });
        };
        if values.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            shape,
            data: values,
        })
    }

    /// Creates a tensor from a slice of `f32` values.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{Tensor, Shape};
    /// let t = Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap();
    /// assert_eq!(t.values(), &[1.0, 2.0, 3.0]);
    /// ```
    pub fn from_f32(shape: Shape, values: &[f32]) -> Result<Self, TensorError> {
        Self::from_vec(shape, values.to_vec())
    }

    /// Creates a rank-0 tensor holding a single value.
    pub fn scalar(value: f32) -> Self {
        Self {
            shape: Shape::scalar(),
            data: vec![value],
        }
    }

    /// Returns the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the number of elements.
    pub fn num_elements(&self) -> usize {
        self.data.len()
    }

    /// Returns an immutable view over this tensor's data.
    pub fn view(&self) -> TensorView<'_> {
        TensorView {
            shape: &self.shape,
            data: &self.data,
        }
    }

    /// Returns the values in row-major order.
    pub fn values(&self) -> &[f32] {
        &self.data
    }

    /// Returns the values mutably in row-major order.
    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Changes the shape, keeping the allocation where possible.
    ///
    /// Existing values are preserved up to the new length; any new
    /// elements are zero.
    pub fn resize(&mut self, shape: &Shape) {
        if &self.shape != shape {
            self.data.resize(shape.num_elements(), 0.0);
            self.shape = shape.clone();
        }
    }

    /// Overwrites this tensor with the shape and values of `src`,
    /// reusing the existing buffer.
    pub fn copy_from(&mut self, src: &TensorView<'_>) {
        self.resize(src.shape());
        self.data.copy_from_slice(src.values());
    }

    /// Fills the tensor with a constant value.
    pub fn fill(&mut self, value: f32) {
        self.data.iter_mut().for_each(|x| *x = value);
    }

    /// Computes min/max/mean/max-abs over the values.
    pub fn stats(&self) -> TensorStats {
        self.view().stats()
    }
}

/// A borrowed, read-only view over a [`Tensor`]'s data.
///
/// Views are zero-copy and tied to the lifetime of the source tensor,
/// enforced by the borrow checker.
#[derive(Debug, Clone, Copy)]
pub struct TensorView<'a> {
    shape: &'a Shape,
    data: &'a [f32],
}

impl<'a> TensorView<'a> {
    /// Creates a view from raw parts.
    ///
    /// Returns an error if `data` does not hold exactly `shape.num_elements()` values.
    pub fn from_parts(shape: &'a Shape, data: &'a [f32]) -> Result<Self, TensorError> {
        if data.len() != shape.num_elements() {
            return Err(TensorError::BufferSizeMismatch {
                expected: shape.num_elements(),
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// Returns the shape of the viewed tensor.
    pub fn shape(&self) -> &'a Shape {
        self.shape
    }

    /// Returns the viewed values.
    pub fn values(&self) -> &'a [f32] {
        self.data
    }

    /// Copies the view into an owned tensor.
    pub fn to_tensor(&self) -> Tensor {
        Tensor {
            shape: self.shape.clone(),
            data: self.data.to_vec(),
        }
    }

    /// Computes min/max/mean/max-abs over the values.
    ///
    /// An empty view reports all-zero statistics.
    pub fn stats(&self) -> TensorStats {
        if self.data.is_empty() {
            return TensorStats {
                min: 0.0,
                max: 0.0,
                mean: 0.0,
                max_abs: 0.0,
            };
        }
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut max_abs = 0.0f32;
        let mut sum = 0.0f64;
        for &x in self.data {
            min = min.min(x);
            max = max.max(x);
            max_abs = if x.is_finite() {
                max_abs.max(x.abs())
            } else {
                f32::INFINITY
            };
            sum += x as f64;
        }
        TensorStats {
            min,
            max,
            mean: (sum / self.data.len() as f64) as f32,
            max_abs,
        }
    }
}
