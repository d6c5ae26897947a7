// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use thiserror::Error;

/// Result alias specialised for trace transforms.
pub type TraceResult<T> = Result<T, TraceError>;

/// Failures raised by the trace transforms.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TraceError {
    /// Two arrays that must describe the same entities or timepoints disagree.
    #[error("{label}: expected shape {expected:?}, got {got:?}")]
    ShapeMismatch {
        label: &'static str,
        expected: (usize, usize),
        got: (usize, usize),
    },
    /// The time axis cannot be split into the requested number of recordings.
    #[error("cannot split {n_time} timepoints into {n_recording} recordings: {reason}")]
    InvalidSegmentation {
        n_time: usize,
        n_recording: usize,
        reason: &'static str,
    },
    /// A signal had no finite sample to interpolate from.
    #[error("signal `{label}` has no finite samples")]
    EmptySignal { label: &'static str },
    /// Velocity magnitude thresholds must be finite and non-negative.
    #[error("velocity threshold must be finite and >= 0 (got {threshold})")]
    InvalidThreshold { threshold: f64 },
}
