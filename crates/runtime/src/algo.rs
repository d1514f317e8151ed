// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Algorithm tables and per-operator selection.
//!
//! Each algorithm-selectable [`OpKind`] has a closed list of candidate
//! kernels. Selection narrows the list by the node's allow-list and, for
//! reproducible strategies, by bit-reproducibility, then picks one:
//!
//! - **Heuristic**: a per-kind preference order derived from the shapes.
//! - **Profile**: run every remaining candidate on synthetic inputs of the
//!   node's shapes and keep the fastest. Timings are cached per
//!   `(kind, shapes, candidates)` for the lifetime of the table, which the
//!   executor scopes to one compile.

use crate::RuntimeError;
use model_ir::{ExecutionStrategy, OpKind, OpNode};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tensor_core::{
    add_update, binary, gelu, matmul, reduce_sum, relu, softmax, BinaryOp, MatMulAlgo, ReduceAlgo,
    Shape, Tensor, TensorError, TensorView,
};

/// Timed repetitions per candidate, after one warm-up call.
const PROFILE_ITERS: usize = 3;

/// Inner dimension above which splitting K pays off.
const SPLIT_K_MIN_K: usize = 512;

/// Any matmul dimension at or above this is worth tiling.
const TILE_MIN_DIM: usize = 64;

/// Row length above which the parallel reduction pays off.
const PARALLEL_REDUCE_MIN: usize = 1 << 14;

/// Row length above which pairwise summation is preferred.
const PAIRWISE_REDUCE_MIN: usize = 128;

/// A concrete kernel variant chosen for one plan step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    MatMul(MatMulAlgo),
    Reduce(ReduceAlgo),
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Self::MatMul(a) => a.name(),
            Self::Reduce(a) => a.name(),
        }
    }

    pub fn is_reproducible(self) -> bool {
        match self {
            Self::MatMul(a) => a.is_reproducible(),
            Self::Reduce(a) => a.is_reproducible(),
        }
    }

    /// Every candidate for `kind`, in tie-breaking order. Empty for kinds
    /// without algorithm choice.
    pub fn candidates(kind: &OpKind) -> Vec<Algorithm> {
        match kind {
            OpKind::MatMul => MatMulAlgo::ALL.into_iter().map(Self::MatMul).collect(),
            OpKind::ReduceSum => ReduceAlgo::ALL.into_iter().map(Self::Reduce).collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runs one operator. `output` is resized by the kernel.
pub(crate) fn dispatch(
    kind: &OpKind,
    algo: Option<Algorithm>,
    inputs: &[TensorView<'_>],
    output: &mut Tensor,
) -> Result<(), TensorError> {
    match (kind, algo) {
        (OpKind::Add, _) => binary(BinaryOp::Add, &inputs[0], &inputs[1], output),
        (OpKind::Sub, _) => binary(BinaryOp::Sub, &inputs[0], &inputs[1], output),
        (OpKind::Mul, _) => binary(BinaryOp::Mul, &inputs[0], &inputs[1], output),
        (OpKind::Relu, _) => relu(&inputs[0], output),
        (OpKind::Gelu, _) => gelu(&inputs[0], output),
        (OpKind::Softmax, _) => softmax(&inputs[0], output),
        (OpKind::MatMul, Some(Algorithm::MatMul(a))) => matmul(&inputs[0], &inputs[1], output, a),
        (OpKind::MatMul, _) => matmul(&inputs[0], &inputs[1], output, MatMulAlgo::Naive),
        (OpKind::ReduceSum, Some(Algorithm::Reduce(a))) => reduce_sum(&inputs[0], output, a),
        (OpKind::ReduceSum, _) => reduce_sum(&inputs[0], output, ReduceAlgo::Sequential),
        (OpKind::AddUpdate(param), _) => {
            output.copy_from(&inputs[0]);
            add_update(output, &inputs[1], *param)
        }
    }
}

type CacheKey = (&'static str, Vec<Shape>, Vec<Algorithm>);

/// Algorithm selection state for one compile.
#[derive(Debug, Default)]
pub struct AlgoTable {
    profiled: HashMap<CacheKey, Algorithm>,
}

impl AlgoTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct profiling problems measured so far.
    pub fn profiled_len(&self) -> usize {
        self.profiled.len()
    }

    /// Picks an algorithm for `node`.
    ///
    /// Returns `Ok(None)` for operators without algorithm choice.
    ///
    /// # Errors
    /// [`RuntimeError::Compilation`] when the allow-list names an unknown
    /// algorithm, or when no candidate survives the filters.
    pub fn select(
        &mut self,
        node: &OpNode,
        input_shapes: &[&Shape],
        strategy: ExecutionStrategy,
    ) -> Result<Option<Algorithm>, RuntimeError> {
        let all = Algorithm::candidates(&node.kind);
        if all.is_empty() {
            return Ok(None);
        }
        let fail = |detail: String| RuntimeError::Compilation {
            strategy,
            operator: node.name.clone(),
            detail,
        };

        let mut candidates = match &node.policy.algorithms {
            None => all.clone(),
            Some(names) => {
                if let Some(unknown) = names
                    .iter()
                    .find(|n| !all.iter().any(|a| a.name() == n.as_str()))
                {
                    return Err(fail(format!(
                        "unknown {} algorithm '{unknown}' (available: {})",
                        node.kind,
                        join_names(&all)
                    )));
                }
                all.iter()
                    .copied()
                    .filter(|a| names.iter().any(|n| n == a.name()))
                    .collect()
            }
        };
        if strategy.is_reproducible() {
            candidates.retain(|a| a.is_reproducible());
        }
        if candidates.is_empty() {
            let allowed = node
                .policy
                .algorithms
                .as_ref()
                .map(|n| n.join(", "))
                .unwrap_or_else(|| join_names(&all));
            return Err(fail(format!(
                "no {} algorithm left after filtering (allowed: {allowed}; reproducible only: {})",
                node.kind,
                strategy.is_reproducible()
            )));
        }

        let chosen = if candidates.len() == 1 {
            candidates[0]
        } else if strategy.is_profiling() {
            self.profile(&node.kind, input_shapes, candidates)
                .map_err(|e| fail(format!("profiling run failed: {e}")))?
        } else {
            heuristic(&node.kind, input_shapes, &candidates)
        };
        tracing::debug!(
            "operator '{}' ({}): selected '{}' under {}",
            node.name,
            node.kind,
            chosen,
            strategy
        );
        Ok(Some(chosen))
    }

    fn profile(
        &mut self,
        kind: &OpKind,
        input_shapes: &[&Shape],
        candidates: Vec<Algorithm>,
    ) -> Result<Algorithm, TensorError> {
        let shapes: Vec<Shape> = input_shapes.iter().map(|s| (*s).clone()).collect();
        let key = (kind.as_str(), shapes, candidates);
        if let Some(&hit) = self.profiled.get(&key) {
            return Ok(hit);
        }

        let inputs: Vec<Tensor> = key.1.iter().map(synthetic).collect();
        let views: Vec<TensorView<'_>> = inputs.iter().map(Tensor::view).collect();
        let mut output = Tensor::scalar(0.0);

        let mut best: Option<(Algorithm, Duration)> = None;
        for &algo in &key.2 {
            dispatch(kind, Some(algo), &views, &mut output)?;
            let mut fastest = Duration::MAX;
            for _ in 0..PROFILE_ITERS {
                let start = Instant::now();
                dispatch(kind, Some(algo), &views, &mut output)?;
                fastest = fastest.min(start.elapsed());
            }
            tracing::debug!("profiled {} '{}': {:?}", kind, algo, fastest);
            if best.map_or(true, |(_, t)| fastest < t) {
                best = Some((algo, fastest));
            }
        }

        // `candidates` is never empty here, so `best` is always set.
        let chosen = best.map_or(key.2[0], |(a, _)| a);
        self.profiled.insert(key, chosen);
        Ok(chosen)
    }
}

/// Shape-driven preference order; the first preferred algorithm that is
/// still a candidate wins.
fn heuristic(kind: &OpKind, shapes: &[&Shape], candidates: &[Algorithm]) -> Algorithm {
    let preferred: Vec<Algorithm> = match kind {
        OpKind::MatMul => {
            let (m, k) = dims2(shapes.first().copied());
            let (_, n) = dims2(shapes.get(1).copied());
            let mut order = Vec::with_capacity(3);
            if k >= SPLIT_K_MIN_K && m * n <= k {
                order.push(Algorithm::MatMul(MatMulAlgo::SplitK));
            }
            if m.max(k).max(n) >= TILE_MIN_DIM {
                order.push(Algorithm::MatMul(MatMulAlgo::Tiled));
            }
            order.push(Algorithm::MatMul(MatMulAlgo::Naive));
            order
        }
        OpKind::ReduceSum => {
            let row = shapes.first().map_or(0, |s| s.last_dim());
            let mut order = Vec::with_capacity(3);
            if row >= PARALLEL_REDUCE_MIN {
                order.push(Algorithm::Reduce(ReduceAlgo::Parallel));
            }
            if row >= PAIRWISE_REDUCE_MIN {
                order.push(Algorithm::Reduce(ReduceAlgo::Pairwise));
            }
            order.push(Algorithm::Reduce(ReduceAlgo::Sequential));
            order
        }
        _ => Vec::new(),
    };
    preferred
        .into_iter()
        .find(|a| candidates.contains(a))
        .unwrap_or(candidates[0])
}

fn dims2(shape: Option<&Shape>) -> (usize, usize) {
    match shape.map(Shape::dims) {
        Some([a, b]) => (*a, *b),
        _ => (0, 0),
    }
}

/// Deterministic non-trivial values so profiling does not hit denormals or
/// all-zero fast paths.
fn synthetic(shape: &Shape) -> Tensor {
    let mut t = Tensor::zeros(shape.clone());
    for (i, v) in t.values_mut().iter_mut().enumerate() {
        *v = ((i % 17) as f32 - 8.0) * 0.125;
    }
    t
}

fn join_names(algos: &[Algorithm]) -> String {
    algos.iter().map(|a| a.name()).collect::<Vec<_>>().join(", ")
}
