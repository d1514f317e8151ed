// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Sum reduction over the last dimension.

use crate::{Tensor, TensorError, TensorView};
use rayon::prelude::*;

/// Below this length pairwise summation falls back to a plain loop.
const PAIRWISE_BASE: usize = 64;

/// Implementation strategy for [`reduce_sum`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceAlgo {
    /// Left-to-right accumulation.
    Sequential,
    /// Recursive halving; lower rounding error on long rows.
    Pairwise,
    /// Per-row chunks summed on the current rayon pool. Chunk count follows
    /// the pool size, so the rounding differs between pool sizes.
    Parallel,
}

impl ReduceAlgo {
    pub const ALL: [ReduceAlgo; 3] = [
        ReduceAlgo::Sequential,
        ReduceAlgo::Pairwise,
        ReduceAlgo::Parallel,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ReduceAlgo::Sequential => "sequential",
            ReduceAlgo::Pairwise => "pairwise",
            ReduceAlgo::Parallel => "parallel",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    /// Whether the result is bit-identical regardless of thread count.
    pub fn is_reproducible(self) -> bool {
        !matches!(self, ReduceAlgo::Parallel)
    }
}

/// Sums `input` over its last dimension.
///
/// A `[.., N]` input produces a `[..]` output; a rank-1 input produces a
/// scalar.
///
/// # Errors
/// Returns [`TensorError::UnsupportedRank`] for scalar input.
pub fn reduce_sum(
    input: &TensorView<'_>,
    output: &mut Tensor,
    algo: ReduceAlgo,
) -> Result<(), TensorError> {
    if input.shape().rank() == 0 {
        return Err(TensorError::UnsupportedRank {
            op: "reduce_sum",
            rank: 0,
        });
    }

    let row_len = input.shape().last_dim();
    output.resize(&input.shape().without_last());
    let dst = output.values_mut();

    if row_len == 0 {
        dst.iter_mut().for_each(|x| *x = 0.0);
        return Ok(());
    }

    for (d, row) in dst.iter_mut().zip(input.values().chunks(row_len)) {
        *d = match algo {
            ReduceAlgo::Sequential => row.iter().sum(),
            ReduceAlgo::Pairwise => pairwise_sum(row),
            ReduceAlgo::Parallel => parallel_sum(row),
        };
    }
    Ok(())
}

fn pairwise_sum(values: &[f32]) -> f32 {
    if values.len() <= PAIRWISE_BASE {
        return values.iter().sum();
    }
    let (lo, hi) = values.split_at(values.len() / 2);
    pairwise_sum(lo) + pairwise_sum(hi)
}

fn parallel_sum(values: &[f32]) -> f32 {
    let chunks = rayon::current_num_threads().max(1);
    let chunk_len = values.len().div_ceil(chunks).max(1);
    let partials: Vec<f32> = values
        .par_chunks(chunk_len)
        .map(|c| c.iter().sum::<f32>())
        .collect();
    partials.iter().sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Shape;

    #[test]
    fn test_rows() {
        let input = Tensor::from_f32(Shape::matrix(2, 3), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        for algo in ReduceAlgo::ALL {
            let mut out = Tensor::zeros(Shape::scalar());
            reduce_sum(&input.view(), &mut out, algo).unwrap();
            assert_eq!(out.shape(), &Shape::vector(2));
            assert_eq!(out.values(), &[6.0, 15.0], "algo {}", algo.name());
        }
    }

    #[test]
    fn test_vector_to_scalar() {
        let values: Vec<f32> = (1..=1000).map(|i| i as f32).collect();
        let input = Tensor::from_vec(Shape::vector(1000), values).unwrap();
        let mut out = Tensor::zeros(Shape::vector(1));
        reduce_sum(&input.view(), &mut out, ReduceAlgo::Pairwise).unwrap();
        assert_eq!(out.shape(), &Shape::scalar());
        assert_eq!(out.values(), &[500_500.0]);
    }

    #[test]
    fn test_scalar_input_rejected() {
        let input = Tensor::scalar(1.0);
        let mut out = Tensor::zeros(Shape::scalar());
        let err = reduce_sum(&input.view(), &mut out, ReduceAlgo::Sequential).unwrap_err();
        assert_eq!(
            err,
            TensorError::UnsupportedRank {
                op: "reduce_sum",
                rank: 0
            }
        );
    }
}
