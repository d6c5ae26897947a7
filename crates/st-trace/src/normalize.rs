// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Per-row baseline normalisation and z-scoring.

use ndarray::{Array2, ArrayView1, Axis, Zip};

/// Per-row summary statistic used as the denominator of a ratio trace.
///
/// Implementations must ignore NaN samples and return NaN when a row has no
/// finite sample left.
pub trait Baseline {
    fn baseline(&self, row: ArrayView1<'_, f64>) -> f64;

    /// Short tag used in dataset names and logs.
    fn label(&self) -> &'static str;
}

/// Percentile baseline, `0.0..=100.0`, with linear interpolation between
/// order statistics.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Percentile(pub f64);

impl Baseline for Percentile {
    fn baseline(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut finite: Vec<f64> = row.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return f64::NAN;
        }
        finite.sort_by(f64::total_cmp);
        let p = self.0.clamp(0.0, 100.0) / 100.0;
        let h = (finite.len() - 1) as f64 * p;
        let lo = h.floor() as usize;
        let hi = (lo + 1).min(finite.len() - 1);
        finite[lo] + (h - lo as f64) * (finite[hi] - finite[lo])
    }

    fn label(&self) -> &'static str {
        "percentile"
    }
}

/// Arithmetic mean over finite samples.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Mean;

impl Baseline for Mean {
    fn baseline(&self, row: ArrayView1<'_, f64>) -> f64 {
        finite_mean(row).0
    }

    fn label(&self) -> &'static str {
        "mean"
    }
}

fn finite_mean(row: ArrayView1<'_, f64>) -> (f64, usize) {
    let (sum, count) = row
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0_f64, 0usize), |(s, n), v| (s + *v, n + 1));
    if count == 0 {
        (f64::NAN, 0)
    } else {
        (sum / count as f64, count)
    }
}

/// Divides each row by its own baseline. Zero or NaN baselines propagate
/// inf/NaN into that row.
pub fn normalize_rows<B: Baseline + ?Sized>(traces: &Array2<f64>, baseline: &B) -> Array2<f64> {
    let mut out = traces.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let base = baseline.baseline(row.view());
        row.mapv_inplace(|v| v / base);
    }
    out
}

/// Z-scores each row against its finite samples using the sample standard
/// deviation. Rows with fewer than two finite samples or no spread become NaN.
pub fn standardize_rows(traces: &Array2<f64>) -> Array2<f64> {
    let mut out = Array2::from_elem(traces.raw_dim(), f64::NAN);
    Zip::from(out.rows_mut())
        .and(traces.rows())
        .for_each(|mut dst, src| {
            let (mean, count) = finite_mean(src);
            if count < 2 {
                return;
            }
            let var = src
                .iter()
                .filter(|v| v.is_finite())
                .map(|v| (v - mean).powi(2))
                .sum::<f64>()
                / (count - 1) as f64;
            let std = var.sqrt();
            if std == 0.0 {
                return;
            }
            dst.zip_mut_with(&src, |d, s| *d = (s - mean) / std);
        });
    out
}
