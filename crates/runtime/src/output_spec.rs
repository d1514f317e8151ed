// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Which result tensors are wanted and how they are delivered.

use crate::RuntimeError;
use model_ir::{LoadResult, VarId};
use std::fmt;
use tensor_core::Tensor;

/// Receives one materialized output per execution.
///
/// The tensor is borrowed for the duration of the call only; a callback
/// that needs the data afterwards must copy it.
pub type Callback = Box<dyn FnMut(&Tensor) + Send>;

/// A requested output and its delivery callback.
pub struct OutputBinding {
    pub name: String,
    pub var: VarId,
    callback: Callback,
}

/// Ordered output bindings. Delivery follows insertion order.
#[derive(Default)]
pub struct OutputSpec {
    bindings: Vec<OutputBinding>,
}

impl OutputSpec {
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bound output names in delivery order.
    pub fn names(&self) -> Vec<&str> {
        self.bindings.iter().map(|b| b.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputBinding> {
        self.bindings.iter()
    }

    /// Swaps every callback, keeping names and order.
    ///
    /// # Errors
    /// [`RuntimeError::CallbackCountMismatch`] unless exactly one callback
    /// per binding is supplied. Nothing is replaced on error.
    pub fn replace_callbacks(&mut self, callbacks: Vec<Callback>) -> Result<(), RuntimeError> {
        if callbacks.len() != self.bindings.len() {
            return Err(RuntimeError::CallbackCountMismatch {
                expected: self.bindings.len(),
                actual: callbacks.len(),
            });
        }
        for (binding, cb) in self.bindings.iter_mut().zip(callbacks) {
            binding.callback = cb;
        }
        Ok(())
    }

    /// Calls every callback once, in order, with the tensor `lookup` returns
    /// for its variable.
    pub(crate) fn deliver<'t>(&mut self, lookup: impl Fn(VarId) -> &'t Tensor) {
        for binding in &mut self.bindings {
            (binding.callback)(lookup(binding.var));
        }
    }
}

impl fmt::Debug for OutputSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.bindings.iter().map(|b| (&b.name, b.var)))
            .finish()
    }
}

/// Builds an [`OutputSpec`] against a loaded model's declared outputs.
pub struct OutputSpecBuilder<'a> {
    model: &'a LoadResult,
}

impl<'a> OutputSpecBuilder<'a> {
    pub fn new(model: &'a LoadResult) -> Self {
        Self { model }
    }

    /// Resolves each requested name and keeps the caller's order.
    ///
    /// # Errors
    /// - [`RuntimeError::UnknownOutput`] for a name the model does not declare.
    /// - [`RuntimeError::DuplicateOutput`] for a name requested twice.
    pub fn build(self, requests: Vec<(String, Callback)>) -> Result<OutputSpec, RuntimeError> {
        let mut bindings: Vec<OutputBinding> = Vec::with_capacity(requests.len());
        for (name, callback) in requests {
            let var = self
                .model
                .output_var(&name)
                .ok_or_else(|| RuntimeError::UnknownOutput { name: name.clone() })?;
            if bindings.iter().any(|b| b.name == name) {
                return Err(RuntimeError::DuplicateOutput { name });
            }
            bindings.push(OutputBinding {
                name,
                var,
                callback,
            });
        }
        if bindings.is_empty() {
            tracing::warn!("output spec binds no outputs; runs will deliver nothing");
        }
        Ok(OutputSpec { bindings })
    }
}
