// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! In-place scaled accumulate: `dest = alpha * dest + beta * delta + bias`.

use crate::{Tensor, TensorError, TensorView};

/// Coefficients for [`add_update`].
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AddUpdateParam {
    #[serde(default = "one")]
    pub alpha: f32,
    #[serde(default = "one")]
    pub beta: f32,
    #[serde(default)]
    pub bias: f32,
}

fn one() -> f32 {
    1.0
}

impl Default for AddUpdateParam {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
            bias: 0.0,
        }
    }
}

/// Updates `dest` in place.
///
/// `delta` must either match `dest`'s shape or hold a single element.
/// The update is element-wise and order-independent, so the kernel is
/// safe to call from any worker thread.
///
/// # Errors
/// Returns [`TensorError::ShapeMismatch`] if `delta` cannot be applied to `dest`.
pub fn add_update(
    dest: &mut Tensor,
    delta: &TensorView<'_>,
    param: AddUpdateParam,
) -> Result<(), TensorError> {
    let AddUpdateParam { alpha, beta, bias } = param;
    let d = delta.values();

    if delta.shape() == dest.shape() {
        for (x, &y) in dest.values_mut().iter_mut().zip(d) {
            *x = alpha * *x + beta * y + bias;
        }
        Ok(())
    } else if d.len() == 1 {
        let y = beta * d[0] + bias;
        for x in dest.values_mut() {
            *x = alpha * *x + y;
        }
        Ok(())
    } else {
        Err(TensorError::ShapeMismatch {
            op: "add_update",
            lhs: dest.shape().clone(),
            rhs: delta.shape().clone(),
        })
    }
}
