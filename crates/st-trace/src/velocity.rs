// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Velocity conditioning and reversal event extraction.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{TraceError, TraceResult};

/// One contiguous run of a binary indicator, 1-based and closed on both ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInterval {
    pub start: usize,
    pub end: usize,
}

impl EventInterval {
    /// Number of samples covered by the event.
    pub fn duration(&self) -> usize {
        self.end + 1 - self.start
    }
}

/// Marks samples where the source signal is strictly negative. NaN never
/// counts as a reversal.
pub fn reversal_indicator(source: &[f64]) -> Vec<u8> {
    source.iter().map(|v| u8::from(*v < 0.0)).collect()
}

/// Extracts the runs of a 0/1 indicator.
///
/// A run starts on every 0→1 transition at the post-transition index and ends
/// at its last 1. The boundaries of the sequence act as implicit zeros, so an
/// indicator already high at index 1 opens an event at 1 and one still high at
/// the end closes at `indicator.len()`. Any non-zero sample counts as high.
pub fn extract_events(indicator: &[u8]) -> Vec<EventInterval> {
    let high = |i: usize| indicator.get(i).is_some_and(|v| *v != 0);
    let mut events = Vec::new();
    let mut start = None;
    for i in 0..indicator.len() {
        if !high(i) {
            continue;
        }
        if i == 0 || !high(i - 1) {
            start = Some(i + 1);
        }
        if !high(i + 1) {
            if let Some(start) = start.take() {
                events.push(EventInterval { start, end: i + 1 });
            }
        }
    }
    events
}

/// `[n_events, 2]` table of `[start, end]` rows.
pub fn events_table(events: &[EventInterval]) -> Array2<i64> {
    let mut table = Array2::zeros((events.len(), 2));
    for (row, event) in events.iter().enumerate() {
        table[[row, 0]] = event.start as i64;
        table[[row, 1]] = event.end as i64;
    }
    table
}

/// Replaces non-finite samples by linear interpolation between the nearest
/// finite neighbours. Leading and trailing gaps take the nearest finite value.
pub fn fill_gaps(signal: &[f64]) -> TraceResult<Vec<f64>> {
    let anchors: Vec<usize> = signal
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(i, _)| i)
        .collect();
    let (Some(&first), Some(&last)) = (anchors.first(), anchors.last()) else {
        return Err(TraceError::EmptySignal { label: "velocity" });
    };

    let mut filled = signal.to_vec();
    filled[..first].fill(signal[first]);
    filled[last + 1..].fill(signal[last]);
    for pair in anchors.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if b - a < 2 {
            continue;
        }
        let (va, vb) = (signal[a], signal[b]);
        let span = (b - a) as f64;
        for (offset, slot) in filled[a + 1..b].iter_mut().enumerate() {
            let w = (offset + 1) as f64 / span;
            *slot = va + w * (vb - va);
        }
    }
    Ok(filled)
}

/// Magnitude gate applied to a gap-filled velocity trace.
///
/// Samples with `|v| < threshold` are treated as stage noise and replaced with
/// `0.0`; samples at or above the threshold pass through unchanged.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VelocityFilter {
    threshold: f64,
}

impl VelocityFilter {
    pub const DEFAULT_THRESHOLD: f64 = 0.2;

    pub fn new(threshold: f64) -> TraceResult<Self> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(TraceError::InvalidThreshold { threshold });
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Gap-fills `velocity` then zeroes every sub-threshold sample.
    pub fn apply(&self, velocity: &[f64]) -> TraceResult<Vec<f64>> {
        let mut filled = fill_gaps(velocity)?;
        for v in filled.iter_mut() {
            if v.abs() < self.threshold {
                *v = 0.0;
            }
        }
        Ok(filled)
    }
}

impl Default for VelocityFilter {
    fn default() -> Self {
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
        }
    }
}
