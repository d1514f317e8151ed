// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # model-ir
//!
//! The graph representation consumed by the `lar` execution runtime:
//!
//! - [`OpKind`]: the computation each operator node performs.
//! - [`ModelGraph`]: an arena of variable and operator nodes, with a
//!   **type-state pattern** (`Loaded` → `Validated`) and a seal flag that
//!   freezes execution policies once compiled.
//! - [`ExecutionStrategy`] / [`ExecutionPolicy`]: per-operator algorithm
//!   selection settings.
//! - [`GraphLoader`]: loads a [`LoadResult`] from a JSON graph document or
//!   a SafeTensors container (see [`document`]).
//!
//! # Example
//! ```no_run
//! use model_ir::{GraphLoader, LoadConfig, ModelSource};
//!
//! let bytes = std::fs::read("model.lar").unwrap();
//! let loaded = GraphLoader::load(ModelSource::Bytes(bytes), &LoadConfig::default()).unwrap();
//! println!("{}", loaded.graph);
//! ```

pub mod document;
mod error;
pub mod graph;
mod loader;
mod op;
mod policy;

pub use error::ModelError;
pub use graph::{GraphId, ModelGraph, MAX_TENSOR_ELEMENTS, OpId, OpNode, VarId, VarKind, VarNode};
pub use loader::{GraphLoader, LoadConfig, LoadResult, ModelSource, TestCase};
pub use op::OpKind;
pub use policy::{ExecutionPolicy, ExecutionStrategy};
