// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-operator algorithm-selection policy.

use std::fmt;
use std::str::FromStr;

/// How the compiler picks an algorithm for an algorithm-selectable operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionStrategy {
    /// Shape-based rule, fastest to compile.
    Heuristic,
    /// Shape-based rule restricted to bit-reproducible algorithms.
    HeuristicReproducible,
    /// Time every candidate on the node's shapes and keep the fastest.
    Profile,
    /// Like `Profile`, restricted to bit-reproducible algorithms.
    ProfileReproducible,
}

impl ExecutionStrategy {
    pub const ALL: [ExecutionStrategy; 4] = [
        ExecutionStrategy::Heuristic,
        ExecutionStrategy::HeuristicReproducible,
        ExecutionStrategy::Profile,
        ExecutionStrategy::ProfileReproducible,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heuristic => "heuristic",
            Self::HeuristicReproducible => "heuristic-reproducible",
            Self::Profile => "profile",
            Self::ProfileReproducible => "profile-reproducible",
        }
    }

    /// Whether candidates are limited to bit-reproducible algorithms.
    pub fn is_reproducible(self) -> bool {
        matches!(self, Self::HeuristicReproducible | Self::ProfileReproducible)
    }

    /// Whether selection times candidates instead of applying a rule.
    pub fn is_profiling(self) -> bool {
        matches!(self, Self::Profile | Self::ProfileReproducible)
    }
}

impl Default for ExecutionStrategy {
    fn default() -> Self {
        Self::Heuristic
    }
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStrategy {
    type Err = String;

    /// Accepts the kebab-case names, snake_case, and the short forms
    /// `"heuristic-repro"` / `"profile-repro"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "heuristic" => Ok(Self::Heuristic),
            "heuristic-reproducible" | "heuristic-repro" => Ok(Self::HeuristicReproducible),
            "profile" => Ok(Self::Profile),
            "profile-reproducible" | "profile-repro" => Ok(Self::ProfileReproducible),
            other => Err(format!(
                "unknown execution strategy '{other}' (expected one of: heuristic, \
                 heuristic-reproducible, profile, profile-reproducible)"
            )),
        }
    }
}

/// Policy slot carried by every algorithm-selectable operator node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionPolicy {
    /// Set by the strategy store before compilation. `None` until then.
    pub strategy: Option<ExecutionStrategy>,
    /// Algorithm names the model restricts this node to, if any.
    pub algorithms: Option<Vec<String>>,
}
