// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for model loading and graph construction.

/// Errors produced while turning model bytes into a [`crate::LoadResult`].
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The bytes are not a well-formed model, or they describe a graph that
    /// cannot be built (unknown operator, dangling tensor, bad shapes).
    #[error("malformed model: {0}")]
    Deserialization(String),

    /// The container declares a format version this loader does not speak.
    #[error("unsupported model format version {found} (supported: {supported})")]
    VersionMismatch { found: u32, supported: u32 },

    /// Reading the model from disk failed.
    #[error("failed to read model: {0}")]
    Io(#[from] std::io::Error),
}

impl ModelError {
    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        Self::Deserialization(detail.into())
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(e: serde_json::Error) -> Self {
        Self::Deserialization(format!("graph document: {e}"))
    }
}

impl From<safetensors::SafeTensorError> for ModelError {
    fn from(e: safetensors::SafeTensorError) -> Self {
        Self::Deserialization(format!("SafeTensors container: {e}"))
    }
}
