// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The JSON graph document.
//!
//! # Example
//! ```json
//! {
//!   "format_version": 1,
//!   "name": "affine",
//!   "inputs": [{ "name": "x", "shape": [1, 4] }],
//!   "constants": [{ "name": "w", "shape": [4, 2], "values": [1, 0, 0, 1, 1, 0, 0, 1] }],
//!   "operators": [
//!     { "name": "proj", "op": "matmul", "inputs": ["x", "w"], "output": "y",
//!       "algorithms": ["naive", "tiled"] }
//!   ],
//!   "outputs": ["y"],
//!   "testcases": [{ "x": { "shape": [1, 4], "values": [1, 2, 3, 4] } }]
//! }
//! ```
//!
//! In a SafeTensors container the same document is stored in the header
//! metadata with `values` omitted and `testcases` left empty; the payloads
//! live in the tensor section instead.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tensor_core::{AddUpdateParam, Shape};

/// Highest (and only) container format this loader understands.
pub const SUPPORTED_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    pub format_version: u32,
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<InputDecl>,
    #[serde(default)]
    pub constants: Vec<ConstDecl>,
    pub operators: Vec<OperatorDecl>,
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub testcases: Vec<BTreeMap<String, TensorData>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputDecl {
    pub name: String,
    pub shape: Shape,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstDecl {
    pub name: String,
    pub shape: Shape,
    /// Absent when the payload lives in a SafeTensors tensor section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorDecl {
    pub name: String,
    pub op: String,
    pub inputs: Vec<String>,
    pub output: String,
    /// Operator attributes. Only `add_update` reads any (`alpha`, `beta`,
    /// `bias`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithms: Option<Vec<String>>,
}

/// A shaped block of `f32` values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TensorData {
    pub shape: Shape,
    pub values: Vec<f32>,
}

impl OperatorDecl {
    /// Decodes `attrs` as [`AddUpdateParam`], filling defaults.
    pub(crate) fn add_update_param(&self) -> Result<AddUpdateParam, serde_json::Error> {
        match &self.attrs {
            Some(v) => serde_json::from_value(v.clone()),
            None => Ok(AddUpdateParam::default()),
        }
    }
}
