// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Pure transforms for calcium-imaging recordings.
//!
//! Every public index in this crate is **1-based**: sparse timepoints, event
//! intervals, recording segments and exported index tables all count from
//! one so the emitted tables can be consumed directly by analysis tools that
//! share that convention. Internal bookkeeping stays 0-based.

pub mod error;
pub mod filter;
pub mod normalize;
pub mod segment;
pub mod sparse;
pub mod velocity;

pub use error::{TraceError, TraceResult};
pub use filter::{filter_invalid_rows, FilteredTraces, IndexMap};
pub use normalize::{normalize_rows, standardize_rows, Baseline, Mean, Percentile};
pub use segment::{segments_table, split_recording, Segment};
pub use sparse::{reconstruct_background, reconstruct_dense, Reconstruction, SparseTrace};
pub use velocity::{
    events_table, extract_events, fill_gaps, reversal_indicator, EventInterval, VelocityFilter,
};
