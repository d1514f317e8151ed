// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Host-side tensors and the CPU kernels the execution runtime dispatches to.
//!
//! This crate provides:
//! - [`Tensor`]: an owned, row-major `f32` host tensor whose buffer is
//!   reused across executions.
//! - [`TensorView`]: a borrowed, read-only view handed to kernels and
//!   observers.
//! - [`Shape`]: dimension descriptors with broadcasting helpers.
//! - Kernels: element-wise arithmetic, the in-place [`add_update`], GELU,
//!   softmax, and the algorithm-selectable [`matmul`] and [`reduce_sum`].
//!
//! # Algorithm Variants
//! Kernels that have several valid implementations take an explicit
//! algorithm argument ([`MatMulAlgo`], [`ReduceAlgo`]). Picking one is the
//! caller's concern; the kernels never choose for themselves.
//!
//! Parallel variants run on the *current* rayon pool, so a caller that
//! wraps the call in `ThreadPool::install` controls the degree of
//! parallelism.

mod error;
mod ops;
mod shape;
mod tensor;

pub use error::TensorError;
pub use ops::{
    add_update, binary, gelu, matmul, reduce_sum, relu, softmax, AddUpdateParam, BinaryOp,
    MatMulAlgo, ReduceAlgo,
};
pub use shape::Shape;
pub use tensor::{Tensor, TensorStats, TensorView};
