// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::path::PathBuf;

use st_trace::TraceError;
use thiserror::Error;

/// Result alias specialised for bundle export routines.
pub type BundleResult<T> = Result<T, BundleError>;

/// Unified error type for loading, transforming and writing a bundle.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("input {path:?} does not exist")]
    MissingInput { path: PathBuf },
    #[error("failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse JSON {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to parse TOML {path:?}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("bincode container {path:?}: {source}")]
    Bincode {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },
    #[error("required key `{0}` is missing")]
    MissingKey(String),
    #[error("key `{key}` is malformed: {reason}")]
    Malformed { key: String, reason: String },
    #[error("invalid export configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Trace(#[from] TraceError),
    #[error("output sink: {0}")]
    Sink(String),
    #[error("output format `{0}` is not compiled into this build")]
    FormatUnavailable(&'static str),
}

impl BundleError {
    pub(crate) fn malformed(key: &str, reason: impl Into<String>) -> Self {
        BundleError::Malformed {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BundleError::Io {
            path: path.into(),
            source,
        }
    }
}
