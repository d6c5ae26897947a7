// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use st_trace::VelocityFilter;

use crate::error::{BundleError, BundleResult};
use crate::sink::OutputFormat;

fn default_n_recording() -> usize {
    1
}

fn default_dict_key() -> String {
    "data_dict".to_string()
}

fn default_true() -> bool {
    true
}

fn default_velocity_threshold() -> f64 {
    VelocityFilter::DEFAULT_THRESHOLD
}

/// Settings of one export invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Primary input document.
    pub input_path: PathBuf,
    /// Destination file; derived from `input_path` when unset.
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    /// Optional registration document, used only when it exists.
    #[serde(default)]
    pub registration_path: Option<PathBuf>,
    /// Number of back-to-back recordings concatenated along the time axis.
    #[serde(default = "default_n_recording")]
    pub n_recording: usize,
    /// Key of the payload object inside the input document.
    #[serde(default = "default_dict_key")]
    pub dict_key: String,
    /// Write the thresholded velocity instead of the gap-filled raw one.
    #[serde(default = "default_true")]
    pub velocity_filter: bool,
    #[serde(default = "default_velocity_threshold")]
    pub velocity_threshold: f64,
    /// Emit progress messages in addition to warnings.
    #[serde(default = "default_true")]
    pub verbose: bool,
    #[serde(default)]
    pub format: OutputFormat,
}

impl ExportConfig {
    pub fn new<P: Into<PathBuf>>(input_path: P) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: None,
            registration_path: None,
            n_recording: default_n_recording(),
            dict_key: default_dict_key(),
            velocity_filter: true,
            velocity_threshold: default_velocity_threshold(),
            verbose: true,
            format: OutputFormat::default(),
        }
    }

    /// Loads a configuration from a `.toml` or `.json` file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> BundleResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| BundleError::io(path, source))?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            serde_json::from_str(&text).map_err(|source| BundleError::Json {
                path: path.to_path_buf(),
                source,
            })
        } else {
            toml::from_str(&text).map_err(|source| BundleError::Toml {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    pub fn with_output<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn with_registration<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.registration_path = Some(path.into());
        self
    }

    pub fn with_n_recording(mut self, n_recording: usize) -> Self {
        self.n_recording = n_recording;
        self
    }

    pub fn with_dict_key(mut self, key: impl Into<String>) -> Self {
        self.dict_key = key.into();
        self
    }

    pub fn with_velocity_filter(mut self, enabled: bool, threshold: f64) -> Self {
        self.velocity_filter = enabled;
        self.velocity_threshold = threshold;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Destination file, falling back to the input path with the format's
    /// extension.
    pub fn resolved_output(&self) -> PathBuf {
        self.output_path
            .clone()
            .unwrap_or_else(|| self.input_path.with_extension(self.format.extension()))
    }

    pub fn validate(&self) -> BundleResult<()> {
        if self.n_recording == 0 {
            return Err(BundleError::InvalidConfig(
                "n_recording must be at least 1".to_string(),
            ));
        }
        if self.dict_key.is_empty() {
            return Err(BundleError::InvalidConfig(
                "dict_key must not be empty".to_string(),
            ));
        }
        if !self.velocity_threshold.is_finite() || self.velocity_threshold < 0.0 {
            return Err(BundleError::InvalidConfig(format!(
                "velocity_threshold must be finite and >= 0 (got {})",
                self.velocity_threshold
            )));
        }
        if self.resolved_output() == self.input_path {
            return Err(BundleError::InvalidConfig(
                "output path would overwrite the input".to_string(),
            ));
        }
        Ok(())
    }
}
