// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Sparse-to-dense reconstruction of per-entity traces.
//!
//! Raw traces arrive as `timepoint → value` maps with holes wherever the
//! extraction step had no measurement. Reconstruction keeps those holes as NaN
//! so downstream consumers can tell "not measured" apart from a real zero.

use std::collections::BTreeMap;

use ndarray::Array2;
use tracing::debug;

/// Sparse record of one entity, keyed by 1-based timepoint.
pub type SparseTrace = BTreeMap<usize, f64>;

/// Dense matrix produced from sparse traces.
#[derive(Clone, Debug)]
pub struct Reconstruction {
    /// `[n_rows, max_t]`, NaN wherever no value was recorded.
    pub matrix: Array2<f64>,
    /// Number of recorded samples dropped because their timepoint fell
    /// outside `[1, max_t]`.
    pub out_of_range: usize,
}

/// Rebuilds a dense `[entities.len(), max_t]` matrix.
///
/// Row `r` holds the trace of `entities[r]`. Entities that have no entry in
/// `traces` produce an all-NaN row.
pub fn reconstruct_dense(
    traces: &BTreeMap<usize, SparseTrace>,
    entities: &[usize],
    max_t: usize,
) -> Reconstruction {
    let mut matrix = Array2::from_elem((entities.len(), max_t), f64::NAN);
    let mut out_of_range = 0;
    for (row, entity) in entities.iter().enumerate() {
        let Some(trace) = traces.get(entity) else {
            debug!(entity, "no sparse trace recorded for entity");
            continue;
        };
        out_of_range += scatter_into(trace, max_t, |col, value| matrix[[row, col]] = value);
    }
    Reconstruction {
        matrix,
        out_of_range,
    }
}

/// Rebuilds a single `[1, max_t]` background vector.
pub fn reconstruct_background(trace: &SparseTrace, max_t: usize) -> Reconstruction {
    let mut matrix = Array2::from_elem((1, max_t), f64::NAN);
    let out_of_range = scatter_into(trace, max_t, |col, value| matrix[[0, col]] = value);
    Reconstruction {
        matrix,
        out_of_range,
    }
}

fn scatter_into(trace: &SparseTrace, max_t: usize, mut write: impl FnMut(usize, f64)) -> usize {
    let mut skipped = 0;
    for (&t, &value) in trace {
        if t == 0 || t > max_t {
            skipped += 1;
            continue;
        }
        write(t - 1, value);
    }
    skipped
}
