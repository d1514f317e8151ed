// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Matrix multiplication with interchangeable algorithms.

use crate::{Shape, Tensor, TensorError, TensorView};
use rayon::prelude::*;

/// Cache block edge for [`MatMulAlgo::Tiled`].
const TILE: usize = 32;

/// Implementation strategy for [`matmul`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatMulAlgo {
    /// Straight ikj loop.
    Naive,
    /// Cache-blocked ikj loop. Same summation order per element as `Naive`
    /// within a block row, so results are stable across runs and machines.
    Tiled,
    /// Splits the K dimension across the current rayon pool and sums the
    /// partial products. The split count follows the pool size, so results
    /// may differ in the last bits between pools of different sizes.
    SplitK,
}

impl MatMulAlgo {
    /// Every variant, in preference order for tie-breaking.
    pub const ALL: [MatMulAlgo; 3] = [MatMulAlgo::Naive, MatMulAlgo::Tiled, MatMulAlgo::SplitK];

    pub fn name(self) -> &'static str {
        match self {
            MatMulAlgo::Naive => "naive",
            MatMulAlgo::Tiled => "tiled",
            MatMulAlgo::SplitK => "split_k",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    /// Whether the result is bit-identical regardless of thread count.
    pub fn is_reproducible(self) -> bool {
        !matches!(self, MatMulAlgo::SplitK)
    }
}

/// Performs matrix multiplication: `output = lhs @ rhs`.
///
/// `lhs` is `[M, K]`, `rhs` is `[K, N]`; `output` is resized to `[M, N]`.
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] if dimensions are incompatible.
pub fn matmul(
    lhs: &TensorView<'_>,
    rhs: &TensorView<'_>,
    output: &mut Tensor,
    algo: MatMulAlgo,
) -> Result<(), TensorError> {
    if !lhs.shape().is_matmul_compatible(rhs.shape()) {
        return Err(TensorError::ShapeMismatch {
            op: "matmul",
            lhs: lhs.shape().clone(),
            rhs: rhs.shape().clone(),
        });
    }

    let m = lhs.shape().dims()[0];
    let k = lhs.shape().dims()[1];
    let n = rhs.shape().dims()[1];
    output.resize(&Shape::matrix(m, n));

    let a = lhs.values();
    let b = rhs.values();
    let c = output.values_mut();

    match algo {
        MatMulAlgo::Naive => matmul_naive(a, b, c, m, k, n),
        MatMulAlgo::Tiled => matmul_tiled(a, b, c, m, k, n),
        MatMulAlgo::SplitK => matmul_split_k(a, b, c, m, k, n),
    }
    Ok(())
}

/// ikj loop: the inner loop is a saxpy on a row of C, sequential in memory.
fn matmul_naive(a: &[f32], b: &[f32], c: &mut [f32], m: usize, k: usize, n: usize) {
    c.iter_mut().for_each(|x| *x = 0.0);
    for i in 0..m {
        let c_row = &mut c[i * n..(i + 1) * n];
        for p in 0..k {
            let a_ip = a[i * k + p];
            let b_row = &b[p * n..(p + 1) * n];
            for (cj, &bj) in c_row.iter_mut().zip(b_row) {
                *cj += a_ip * bj;
            }
        }
    }
}

fn matmul_tiled(a: &[f32], b: &[f32], c: &mut [f32], m: usize, k: usize, n: usize) {
    c.iter_mut().for_each(|x| *x = 0.0);
    for i0 in (0..m).step_by(TILE) {
        let i1 = (i0 + TILE).min(m);
        for p0 in (0..k).step_by(TILE) {
            let p1 = (p0 + TILE).min(k);
            for j0 in (0..n).step_by(TILE) {
                let j1 = (j0 + TILE).min(n);
                for i in i0..i1 {
                    for p in p0..p1 {
                        let a_ip = a[i * k + p];
                        let b_row = &b[p * n + j0..p * n + j1];
                        let c_row = &mut c[i * n + j0..i * n + j1];
                        for (cj, &bj) in c_row.iter_mut().zip(b_row) {
                            *cj += a_ip * bj;
                        }
                    }
                }
            }
        }
    }
}

fn matmul_split_k(a: &[f32], b: &[f32], c: &mut [f32], m: usize, k: usize, n: usize) {
    let splits = rayon::current_num_threads().clamp(1, k.max(1));
    let chunk = k.div_ceil(splits).max(1);

    let partials: Vec<Vec<f32>> = (0..k)
        .step_by(chunk)
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|p0| {
            let p1 = (p0 + chunk).min(k);
            let mut part = vec![0.0f32; m * n];
            for i in 0..m {
                let c_row = &mut part[i * n..(i + 1) * n];
                for p in p0..p1 {
                    let a_ip = a[i * k + p];
                    for (cj, &bj) in c_row.iter_mut().zip(&b[p * n..(p + 1) * n]) {
                        *cj += a_ip * bj;
                    }
                }
            }
            part
        })
        .collect();

    c.iter_mut().for_each(|x| *x = 0.0);
    for part in &partials {
        for (cj, &pj) in c.iter_mut().zip(part) {
            *cj += pj;
        }
    }
}
