// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # runtime
//!
//! Orchestrates a loaded model from configuration to repeated execution.
//!
//! The runtime takes:
//! - A [`model_ir::LoadResult`] from the graph loader.
//! - An [`ExecutionStrategy`](model_ir::ExecutionStrategy), applied to every
//!   algorithm-selectable operator by the [`StrategyStore`].
//! - Optional plugins from the [`InstrumentationRegistry`].
//! - An [`OutputSpec`] naming the wanted outputs and their callbacks.
//!
//! And drives it through the [`ModelExecutor`] lifecycle:
//! ```text
//! Unloaded → Loaded → Configured → Compiled → Running → Completed
//! ```
//! with an absorbing `Error` state on execution failure.
//!
//! # Async Execution
//! Each executor owns a `rayon` pool. `run()` hands the compiled
//! [`AsyncExecutable`] to a worker and returns at once; `wait()` blocks on
//! the completion channel. Parallel kernel variants run on the same pool.

mod algo;
mod config;
mod data_parser;
mod engine;
mod error;
mod executable;
pub mod instrument;
mod output_spec;
mod strategy;
mod testcase;

pub use algo::{AlgoTable, Algorithm};
pub use config::RuntimeConfig;
pub use data_parser::parse_input;
pub use engine::{ConfigureRequest, ExecutorState, Launch, ModelExecutor};
pub use error::RuntimeError;
pub use executable::{AsyncExecutable, PlanStep};
pub use instrument::{
    InstrumentationOptions, InstrumentationRegistry, IoDumpHandle, IoRecord, OpProfile,
    ProfileReport, ProfilerHandle, RangeCheckerHandle, RangeViolation,
};
pub use output_spec::{Callback, OutputBinding, OutputSpec, OutputSpecBuilder};
pub use strategy::StrategyStore;
pub use testcase::TestCaseInputInjector;
