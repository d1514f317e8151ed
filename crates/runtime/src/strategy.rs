// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Uniform execution-strategy assignment.

use crate::{ExecutorState, RuntimeError};
use model_ir::{graph::Validated, ExecutionStrategy, ModelGraph};

/// Holds the chosen strategy and writes it into every algorithm-selectable
/// operator of a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StrategyStore {
    strategy: ExecutionStrategy,
}

impl StrategyStore {
    pub fn new(strategy: ExecutionStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> ExecutionStrategy {
        self.strategy
    }

    pub fn set(&mut self, strategy: ExecutionStrategy) {
        self.strategy = strategy;
    }

    /// Sets the strategy on every algorithm-selectable operator and returns
    /// how many were touched. Applying twice is the same as applying once.
    ///
    /// # Errors
    /// [`RuntimeError::InvalidState`] if the graph was sealed by a compile.
    pub fn apply(&self, graph: &mut ModelGraph<Validated>) -> Result<usize, RuntimeError> {
        let name = graph.name().to_string();
        let policies = graph.policies_mut().ok_or(RuntimeError::InvalidState {
            operation: "apply an execution strategy",
            state: ExecutorState::Compiled,
        })?;
        let mut touched = 0;
        for (op, policy) in policies {
            tracing::trace!("operator '{op}': strategy {}", self.strategy);
            policy.strategy = Some(self.strategy);
            touched += 1;
        }
        tracing::debug!(
            "strategy '{}' applied to {touched} operators of '{name}'",
            self.strategy
        );
        Ok(touched)
    }
}
