// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Per-export diagnostics collector.

use std::fmt;
use std::path::PathBuf;

use tracing::{info, warn};

/// Recoverable condition encountered during an export.
#[derive(Clone, Debug, PartialEq)]
pub enum ExportWarning {
    /// A best-effort field could not be copied and was left out.
    SkippedField {
        group: &'static str,
        key: String,
        cause: String,
    },
    /// All-NaN entities were removed, so filtered and original indices differ.
    EntitiesDropped { dropped: usize, kept: usize },
    /// Sparse samples outside `[1, n_time]` were ignored.
    TimepointsOutOfRange { key: &'static str, count: usize },
    /// A registration path was configured but does not exist.
    RegistrationNotFound { path: PathBuf },
}

impl fmt::Display for ExportWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SkippedField { group, key, cause } => {
                write!(f, "skipped `{group}/{key}`: {cause}")
            }
            Self::EntitiesDropped { dropped, kept } => write!(
                f,
                "{dropped} all-NaN neuron(s) removed, {kept} kept; filtered indices differ from original indices"
            ),
            Self::TimepointsOutOfRange { key, count } => {
                write!(f, "`{key}` has {count} sample(s) outside the trace time range")
            }
            Self::RegistrationNotFound { path } => {
                write!(f, "registration input {} not found; skipping", path.display())
            }
        }
    }
}

/// Collector passed into an export; its lifetime is the export call.
///
/// Warnings are always forwarded to `tracing` and kept for the caller.
/// Progress messages are only emitted when the log is verbose.
#[derive(Clone, Debug, Default)]
pub struct ExportLog {
    verbose: bool,
    warnings: Vec<ExportWarning>,
}

impl ExportLog {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            warnings: Vec::new(),
        }
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn warn(&mut self, warning: ExportWarning) {
        warn!(target: "st_bundle::export", "{warning}");
        self.warnings.push(warning);
    }

    pub fn progress(&self, message: impl fmt::Display) {
        if self.verbose {
            info!(target: "st_bundle::export", "{message}");
        }
    }

    pub fn warnings(&self) -> &[ExportWarning] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<ExportWarning> {
        std::mem::take(&mut self.warnings)
    }
}
