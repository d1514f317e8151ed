// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Broadcasting element-wise arithmetic.

use crate::{Shape, Tensor, TensorError, TensorView};

/// Binary element-wise operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
}

impl BinaryOp {
    fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
        }
    }

    #[inline(always)]
    fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
        }
    }
}

/// Computes `output = lhs <op> rhs` with NumPy-style broadcasting.
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] if the shapes cannot be broadcast.
pub fn binary(
    op: BinaryOp,
    lhs: &TensorView<'_>,
    rhs: &TensorView<'_>,
    output: &mut Tensor,
) -> Result<(), TensorError> {
    let out_shape = lhs
        .shape()
        .broadcast_with(rhs.shape())
        .ok_or_else(|| TensorError::ShapeMismatch {
            op: op.name(),
            lhs: lhs.shape().clone(),
            rhs: rhs.shape().clone(),
        })?;
    output.resize(&out_shape);

    let a = lhs.values();
    let b = rhs.values();
    let dst = output.values_mut();

    // Fast paths: identical shapes, or a scalar on either side.
    if lhs.shape() == rhs.shape() {
        for ((d, &x), &y) in dst.iter_mut().zip(a).zip(b) {
            *d = op.apply(x, y);
        }
        return Ok(());
    }
    if b.len() == 1 {
        let y = b[0];
        for (d, &x) in dst.iter_mut().zip(a) {
            *d = op.apply(x, y);
        }
        return Ok(());
    }
    if a.len() == 1 {
        let x = a[0];
        for (d, &y) in dst.iter_mut().zip(b) {
            *d = op.apply(x, y);
        }
        return Ok(());
    }

    let a_index = BroadcastIndex::new(lhs.shape(), &out_shape);
    let b_index = BroadcastIndex::new(rhs.shape(), &out_shape);
    for (flat, d) in dst.iter_mut().enumerate() {
        *d = op.apply(a[a_index.source(flat)], b[b_index.source(flat)]);
    }
    Ok(())
}

/// Applies `max(x, 0)` element-wise.
pub fn relu(input: &TensorView<'_>, output: &mut Tensor) -> Result<(), TensorError> {
    output.resize(input.shape());
    for (d, &x) in output.values_mut().iter_mut().zip(input.values()) {
        *d = x.max(0.0);
    }
    Ok(())
}

/// Maps a flat index in the broadcast output back to the source tensor.
struct BroadcastIndex {
    out_strides: Vec<usize>,
    /// Source stride per output dimension; 0 where the source is broadcast.
    src_strides: Vec<usize>,
}

impl BroadcastIndex {
    fn new(src: &Shape, out: &Shape) -> Self {
        let rank = out.rank();
        let offset = rank - src.rank();
        let natural = src.strides();
        let src_strides = (0..rank)
            .map(|i| {
                if i < offset || src.dims()[i - offset] == 1 {
                    0
                } else {
                    natural[i - offset]
                }
            })
            .collect();
        Self {
            out_strides: out.strides(),
            src_strides,
        }
    }

    fn source(&self, mut flat: usize) -> usize {
        let mut idx = 0;
        for (&os, &ss) in self.out_strides.iter().zip(&self.src_strides) {
            let coord = flat / os;
            flat %= os;
            idx += coord * ss;
        }
        idx
    }
}
