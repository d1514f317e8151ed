// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Runtime configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! model_path = "./models/affine.lar"
//! default_strategy = "profile-reproducible"
//! shared_mem = true
//! num_threads = 4
//! outputs = ["y"]
//! enable_profiling = true
//! profile_output = "profile.json"
//! range_check = 1e4
//! io_dump = false
//! iterations = 3
//! wait_timeout_ms = 5000
//! ```

use crate::instrument::InstrumentationOptions;
use model_ir::{ExecutionStrategy, LoadConfig};
use std::path::{Path, PathBuf};

/// Configuration for the execution runtime.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RuntimeConfig {
    /// Path to the model file (JSON graph document or SafeTensors container).
    pub model_path: PathBuf,
    /// Strategy applied when a configure request does not name one.
    #[serde(default)]
    pub default_strategy: ExecutionStrategy,
    /// Memory-map the model file instead of reading it.
    #[serde(default)]
    pub shared_mem: bool,
    /// Number of worker threads (defaults to number of online CPU cores).
    pub num_threads: Option<usize>,
    /// Outputs to bind. Empty means every declared output.
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Attach the per-operator profiler.
    #[serde(default)]
    pub enable_profiling: bool,
    /// Where to write the profile report as JSON.
    pub profile_output: Option<PathBuf>,
    /// Attach the numeric-range checker with this max-|x| threshold.
    pub range_check: Option<f32>,
    /// Attach the operator I/O dump plugin.
    #[serde(default)]
    pub io_dump: bool,
    /// Number of executions. `None` runs every bundled test case, or once
    /// when the model bundles none.
    pub iterations: Option<usize>,
    /// Upper bound on a single `wait()`, enforced by the caller.
    pub wait_timeout_ms: Option<u64>,
}

impl RuntimeConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, super::RuntimeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            super::RuntimeError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, super::RuntimeError> {
        toml::from_str(toml_str)
            .map_err(|e| super::RuntimeError::Config(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, super::RuntimeError> {
        toml::to_string_pretty(self)
            .map_err(|e| super::RuntimeError::Config(format!("TOML serialise error: {e}")))
    }

    /// Resolves the number of worker threads.
    pub fn resolve_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }

    /// Plugin selection implied by this config.
    pub fn instrumentation(&self) -> InstrumentationOptions {
        InstrumentationOptions {
            profiler: self.enable_profiling || self.profile_output.is_some(),
            range_check: self.range_check,
            io_dump: self.io_dump,
        }
    }

    /// Loader options implied by this config.
    pub fn load_config(&self) -> LoadConfig {
        LoadConfig {
            shared_mem: self.shared_mem,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("./model.lar"),
            default_strategy: ExecutionStrategy::Heuristic,
            shared_mem: false,
            num_threads: None,
            outputs: Vec::new(),
            enable_profiling: false,
            profile_output: None,
            range_check: None,
            io_dump: false,
            iterations: None,
            wait_timeout_ms: None,
        }
    }
}
