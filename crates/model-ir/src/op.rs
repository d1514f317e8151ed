// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operator kinds and their shape rules.

use std::fmt;
use tensor_core::{AddUpdateParam, Shape};

/// The computation an operator node performs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpKind {
    Add,
    Sub,
    Mul,
    Relu,
    Gelu,
    /// Softmax over the last dimension.
    Softmax,
    /// `[M, K] @ [K, N]`. Algorithm-selectable.
    MatMul,
    /// Sum over the last dimension. Algorithm-selectable.
    ReduceSum,
    /// `dest = alpha * dest + beta * delta + bias`, applied to a copy of
    /// the first input.
    AddUpdate(AddUpdateParam),
}

impl OpKind {
    /// Parses an operator name from a graph document.
    ///
    /// Accepts snake_case names plus a few aliases (`"matmul"`,
    /// `"mat_mul"`, `"reduce"`). Attributes are filled with defaults.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "add" => Some(Self::Add),
            "sub" | "subtract" => Some(Self::Sub),
            "mul" | "multiply" => Some(Self::Mul),
            "relu" => Some(Self::Relu),
            "gelu" => Some(Self::Gelu),
            "softmax" => Some(Self::Softmax),
            "matmul" | "mat_mul" => Some(Self::MatMul),
            "reduce_sum" | "reduce" => Some(Self::ReduceSum),
            "add_update" => Some(Self::AddUpdate(AddUpdateParam::default())),
            _ => None,
        }
    }

    /// Canonical document name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Relu => "relu",
            Self::Gelu => "gelu",
            Self::Softmax => "softmax",
            Self::MatMul => "matmul",
            Self::ReduceSum => "reduce_sum",
            Self::AddUpdate(_) => "add_update",
        }
    }

    /// Number of inputs the operator consumes.
    pub fn arity(&self) -> usize {
        match self {
            Self::Relu | Self::Gelu | Self::Softmax | Self::ReduceSum => 1,
            Self::Add | Self::Sub | Self::Mul | Self::MatMul | Self::AddUpdate(_) => 2,
        }
    }

    /// Whether the operator has interchangeable algorithms and therefore
    /// carries an execution policy.
    pub fn supports_algo_selection(&self) -> bool {
        matches!(self, Self::MatMul | Self::ReduceSum)
    }

    /// Computes the output shape from the input shapes.
    ///
    /// Returns a human-readable reason on failure; the caller attaches the
    /// operator name.
    pub fn infer_shape(&self, inputs: &[&Shape]) -> Result<Shape, String> {
        if inputs.len() != self.arity() {
            return Err(format!(
                "{} expects {} input(s), got {}",
                self.as_str(),
                self.arity(),
                inputs.len()
            ));
        }
        match self {
            Self::Add | Self::Sub | Self::Mul => {
                inputs[0].broadcast_with(inputs[1]).ok_or_else(|| {
                    format!("cannot broadcast {} with {}", inputs[0], inputs[1])
                })
            }
            Self::Relu | Self::Gelu | Self::Softmax => Ok(inputs[0].clone()),
            Self::MatMul => {
                let (a, b) = (inputs[0], inputs[1]);
                if !a.is_matmul_compatible(b) {
                    return Err(format!("incompatible matmul operands {a} and {b}"));
                }
                Ok(Shape::matrix(a.dims()[0], b.dims()[1]))
            }
            Self::ReduceSum => {
                if inputs[0].rank() == 0 {
                    return Err("reduce_sum needs at least one dimension".into());
                }
                Ok(inputs[0].without_last())
            }
            Self::AddUpdate(_) => {
                let (dest, delta) = (inputs[0], inputs[1]);
                if dest != delta && delta.num_elements() != 1 {
                    return Err(format!("delta {delta} does not fit destination {dest}"));
                }
                Ok(dest.clone())
            }
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
