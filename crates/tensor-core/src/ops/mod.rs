// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor kernels.
//!
//! Every kernel writes into a caller-owned output tensor, resizing it to
//! the result shape. Inputs are validated up front; a kernel never writes
//! a partial result after returning an error.

mod add_update_op;
mod elementwise_op;
mod gelu_op;
mod matmul_op;
mod reduce_op;
mod softmax_op;

pub use add_update_op::{add_update, AddUpdateParam};
pub use elementwise_op::{binary, relu, BinaryOp};
pub use gelu_op::gelu;
pub use matmul_op::{matmul, MatMulAlgo};
pub use reduce_op::{reduce_sum, ReduceAlgo};
pub use softmax_op::softmax;
