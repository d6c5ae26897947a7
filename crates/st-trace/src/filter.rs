// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use ndarray::{Array2, Axis};

use crate::error::{TraceError, TraceResult};

/// Bidirectional map between the original entity rows and the rows kept after
/// NaN filtering.
///
/// Indices are stored 0-based; the exported tables are 1-based. Dropped
/// entities have no filtered index and therefore no row in either table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexMap {
    filtered_to_original: Vec<usize>,
    original_to_filtered: Vec<Option<usize>>,
}

impl IndexMap {
    /// Builds the map from a per-row keep mask in one pass.
    pub fn from_mask(keep: &[bool]) -> Self {
        let kept = keep.iter().filter(|k| **k).count();
        let mut filtered_to_original = vec![0; kept];
        let mut original_to_filtered = vec![None; keep.len()];
        let mut next = 0;
        for (original, _) in keep.iter().enumerate().filter(|(_, k)| **k) {
            filtered_to_original[next] = original;
            original_to_filtered[original] = Some(next);
            next += 1;
        }
        Self {
            filtered_to_original,
            original_to_filtered,
        }
    }

    pub fn n_original(&self) -> usize {
        self.original_to_filtered.len()
    }

    pub fn n_kept(&self) -> usize {
        self.filtered_to_original.len()
    }

    pub fn n_dropped(&self) -> usize {
        self.n_original() - self.n_kept()
    }

    /// 0-based original row of a filtered row.
    pub fn original_of(&self, filtered: usize) -> Option<usize> {
        self.filtered_to_original.get(filtered).copied()
    }

    /// 0-based filtered row of an original row, `None` when it was dropped.
    pub fn filtered_of(&self, original: usize) -> Option<usize> {
        self.original_to_filtered.get(original).copied().flatten()
    }

    /// True when every filtered index equals its original index, i.e. nothing
    /// was dropped.
    pub fn is_identity(&self) -> bool {
        self.filtered_to_original
            .iter()
            .enumerate()
            .all(|(filtered, original)| filtered == *original)
            && self.n_dropped() == 0
    }

    /// `[n_kept, 2]` table of 1-based `[filtered, original]` rows.
    pub fn filtered_to_original_table(&self) -> Array2<i64> {
        let mut table = Array2::zeros((self.n_kept(), 2));
        for (filtered, original) in self.filtered_to_original.iter().enumerate() {
            table[[filtered, 0]] = filtered as i64 + 1;
            table[[filtered, 1]] = *original as i64 + 1;
        }
        table
    }

    /// `[n_kept, 2]` table of 1-based `[original, filtered]` rows, ordered by
    /// original index.
    pub fn original_to_filtered_table(&self) -> Array2<i64> {
        let mut table = Array2::zeros((self.n_kept(), 2));
        let kept = self
            .original_to_filtered
            .iter()
            .enumerate()
            .filter_map(|(original, filtered)| filtered.map(|f| (original, f)));
        for (row, (original, filtered)) in kept.enumerate() {
            table[[row, 0]] = original as i64 + 1;
            table[[row, 1]] = filtered as i64 + 1;
        }
        table
    }

    /// Applies the same row selection to another matrix over the original
    /// entities.
    pub fn select_rows(&self, matrix: &Array2<f64>) -> TraceResult<Array2<f64>> {
        if matrix.nrows() != self.n_original() {
            return Err(TraceError::ShapeMismatch {
                label: "row selection",
                expected: (self.n_original(), matrix.ncols()),
                got: matrix.dim(),
            });
        }
        Ok(gather_rows(matrix, &self.filtered_to_original))
    }
}

/// Trace matrix with invalid rows removed.
#[derive(Clone, Debug)]
pub struct FilteredTraces {
    pub matrix: Array2<f64>,
    pub map: IndexMap,
}

/// Drops every row whose samples are all NaN.
pub fn filter_invalid_rows(traces: &Array2<f64>) -> FilteredTraces {
    let keep: Vec<bool> = traces
        .axis_iter(Axis(0))
        .map(|row| row.iter().any(|v| !v.is_nan()))
        .collect();
    let map = IndexMap::from_mask(&keep);
    let matrix = gather_rows(traces, &map.filtered_to_original);
    FilteredTraces { matrix, map }
}

fn gather_rows(matrix: &Array2<f64>, rows: &[usize]) -> Array2<f64> {
    Array2::from_shape_fn((rows.len(), matrix.ncols()), |(r, c)| matrix[[rows[r], c]])
}
