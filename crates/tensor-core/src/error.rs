// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for tensor operations.

use crate::Shape;

/// Errors that can occur during tensor operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TensorError {
    /// The number of provided values does not match the shape's element count.
    #[error("buffer size mismatch: shape needs {expected} elements, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// The shape's element count overflows `usize`.
    #[error("shape {shape} has too many elements to address")]
    ShapeOverflow { shape: Shape },

    /// Two tensors have incompatible shapes for the requested operation.
    #[error("incompatible shapes for {op}: {lhs} vs {rhs}")]
    ShapeMismatch {
        op: &'static str,
        lhs: Shape,
        rhs: Shape,
    },

    /// The operation does not accept a tensor of this rank.
    #[error("{op} does not support rank-{rank} input")]
    UnsupportedRank { op: &'static str, rank: usize },

    /// A numeric computation failed (e.g., NaN or overflow).
    #[error("numeric error in {op}: {detail}")]
    Numeric { op: &'static str, detail: String },
}
