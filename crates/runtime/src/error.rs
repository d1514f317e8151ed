// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the execution runtime.

use crate::ExecutorState;
use model_ir::ExecutionStrategy;

/// Errors returned by the orchestration layer.
///
/// Every error is returned from the call that caused it. Only
/// [`RuntimeError::Execution`] changes executor state (to
/// [`ExecutorState::Error`]); all others leave the previous state intact.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Model loading failed. The loader's error is passed through unchanged.
    #[error("model load failed: {0}")]
    Load(#[from] model_ir::ModelError),

    /// A requested output name is not a declared graph output.
    #[error("'{name}' is not a declared output of the model")]
    UnknownOutput { name: String },

    /// The same output was requested twice.
    #[error("output '{name}' requested more than once")]
    DuplicateOutput { name: String },

    /// The operation is not legal in the executor's current state.
    #[error("cannot {operation} while the executor is {state}")]
    InvalidState {
        operation: &'static str,
        state: ExecutorState,
    },

    /// Replacement callbacks do not match the bound outputs one-to-one.
    #[error("expected {expected} callbacks, got {actual}")]
    CallbackCountMismatch { expected: usize, actual: usize },

    /// An input name or input literal could not be used.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Algorithm selection failed for an operator.
    #[error("compilation failed for operator '{operator}' under strategy '{strategy}': {detail}")]
    Compilation {
        strategy: ExecutionStrategy,
        operator: String,
        detail: String,
    },

    /// An operator failed while the plan was running.
    #[error("execution error in operator '{operator}': {detail}")]
    Execution { operator: String, detail: String },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Writing a plugin report failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
