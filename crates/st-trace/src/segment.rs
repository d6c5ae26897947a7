// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{TraceError, TraceResult};

/// Contiguous slice of the time axis belonging to one physical recording,
/// 1-based and closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub first: usize,
    pub last: usize,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.last + 1 - self.first
    }

    pub fn is_empty(&self) -> bool {
        self.last < self.first
    }
}

/// Splits `[1, n_time]` into `n_recording` equal, back-to-back segments.
///
/// Only exact splits are accepted: `n_time` must be a multiple of
/// `n_recording`.
pub fn split_recording(n_time: usize, n_recording: usize) -> TraceResult<Vec<Segment>> {
    let invalid = |reason| TraceError::InvalidSegmentation {
        n_time,
        n_recording,
        reason,
    };
    if n_recording == 0 {
        return Err(invalid("at least one recording is required"));
    }
    if n_recording > n_time {
        return Err(invalid("more recordings than timepoints"));
    }
    if n_time % n_recording != 0 {
        return Err(invalid("timepoints do not divide evenly between recordings"));
    }
    let width = n_time / n_recording;
    Ok((0..n_recording)
        .map(|k| Segment {
            first: k * width + 1,
            last: (k + 1) * width,
        })
        .collect())
}

/// `[n_recording, 2]` table of `[first, last]` rows.
pub fn segments_table(segments: &[Segment]) -> Array2<i64> {
    let mut table = Array2::zeros((segments.len(), 2));
    for (row, segment) in segments.iter().enumerate() {
        table[[row, 0]] = segment.first as i64;
        table[[row, 1]] = segment.last as i64;
    }
    table
}
