// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Export orchestration.
//!
//! Every mandatory array is computed before a sink is opened, so a failure in
//! loading or transforming the primary input never touches the destination.
//! Best-effort fields are resolved against a fixed table; any field that is
//! missing or mis-shaped is logged and left out.

use std::path::PathBuf;

use ndarray::Ix2;
use st_trace::{
    events_table, extract_events, fill_gaps, filter_invalid_rows, normalize_rows,
    reconstruct_background, reconstruct_dense, reversal_indicator, segments_table,
    split_recording, standardize_rows, Mean, Percentile, Reconstruction, Segment, TraceError,
    VelocityFilter,
};

use crate::config::ExportConfig;
use crate::error::{BundleError, BundleResult};
use crate::input::Bundle;
use crate::log::{ExportLog, ExportWarning};
use crate::sink::{open_sink, Dataset, OutputSink};

pub const GROUP_TRACES: &str = "traces";
pub const GROUP_BEHAVIOR: &str = "behavior";
pub const GROUP_TIMING: &str = "timing";
pub const GROUP_STIMULUS: &str = "stimulus";
pub const GROUP_REGISTRATION: &str = "registration";
pub const GROUP_RAW_TRACES: &str = "raw_traces";

pub const KEY_TRACE_ORIGINAL: &str = "trace_array_original";
pub const KEY_TRACE_STANDARDIZED: &str = "trace_array";
pub const KEY_VELOCITY: &str = "velocity";
pub const KEY_REVERSAL_SOURCE: &str = "reversal_source";
pub const KEY_VALID_NEURONS: &str = "valid_neurons";
pub const KEY_RAW_ACTIVITY: &str = "raw_activity";
pub const KEY_RAW_MARKER: &str = "raw_marker";
pub const KEY_RAW_ACTIVITY_BKG: &str = "raw_activity_bkg";
pub const KEY_RAW_MARKER_BKG: &str = "raw_marker_bkg";
pub const KEY_STIMULUS: &str = "stim_begin_confocal";

/// Percentile used for the `F20` ratio trace.
pub const BASELINE_PERCENTILE: f64 = 20.0;

/// Shape a best-effort field must have to be copied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldShape {
    /// One sample per confocal timepoint.
    Series,
    /// One-dimensional, any length.
    Vector,
    /// Two-dimensional float array with one column per confocal timepoint.
    SeriesMatrix,
    /// Two-dimensional float array.
    Matrix,
    /// Two-dimensional integer table.
    IndexTable,
}

pub const BEHAVIOR_FIELDS: &[(&str, FieldShape)] = &[
    ("head_angle", FieldShape::Series),
    ("angular_velocity", FieldShape::Series),
    ("pumping", FieldShape::Series),
    ("worm_curvature", FieldShape::Series),
    ("body_angle", FieldShape::SeriesMatrix),
    ("body_angle_absolute", FieldShape::SeriesMatrix),
    ("body_angle_all", FieldShape::SeriesMatrix),
    ("zeroed_x_confocal", FieldShape::Series),
    ("zeroed_y_confocal", FieldShape::Series),
];

pub const TIMING_FIELDS: &[(&str, FieldShape)] = &[
    ("timestamp_confocal", FieldShape::Series),
    ("timestamp_nir", FieldShape::Vector),
];

pub const REGISTRATION_FIELDS: &[(&str, FieldShape)] = &[
    ("roi_match_confidence", FieldShape::Matrix),
    ("roi_match", FieldShape::IndexTable),
];

/// What an export produced.
#[derive(Clone, Debug)]
pub struct ExportSummary {
    /// File written, `None` when exporting into a caller-supplied sink.
    pub output_path: Option<PathBuf>,
    pub n_entity_full: usize,
    pub n_entity_kept: usize,
    pub n_time: usize,
    pub segments: Vec<Segment>,
    pub n_events: usize,
    pub groups: Vec<&'static str>,
    pub warnings: Vec<ExportWarning>,
}

struct GroupPayload {
    name: &'static str,
    datasets: Vec<(String, Dataset)>,
}

impl GroupPayload {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            datasets: Vec::new(),
        }
    }

    fn push(&mut self, name: &str, data: impl Into<Dataset>) {
        self.datasets.push((name.to_string(), data.into()));
    }
}

struct Prepared {
    groups: Vec<GroupPayload>,
    n_entity_full: usize,
    n_entity_kept: usize,
    n_time: usize,
    segments: Vec<Segment>,
    n_events: usize,
}

impl Prepared {
    fn summary(&self, output_path: Option<PathBuf>, log: &ExportLog) -> ExportSummary {
        ExportSummary {
            output_path,
            n_entity_full: self.n_entity_full,
            n_entity_kept: self.n_entity_kept,
            n_time: self.n_time,
            segments: self.segments.clone(),
            n_events: self.n_events,
            groups: self.groups.iter().map(|g| g.name).collect(),
            warnings: log.warnings().to_vec(),
        }
    }
}

/// Exports the configured bundle into a new file.
///
/// `config.verbose` decides whether `log` emits progress messages.
pub fn export_bundle(config: &ExportConfig, log: &mut ExportLog) -> BundleResult<ExportSummary> {
    config.validate()?;
    log.set_verbose(config.verbose);
    let prepared = prepare(config, log)?;
    let output = config.resolved_output();
    log.progress(format_args!("writing {}", output.display()));
    let mut sink = open_sink(config.format, &output)?;
    write_groups(sink.as_mut(), &prepared.groups)?;
    sink.finish()?;
    Ok(prepared.summary(Some(output), log))
}

/// Runs the export pipeline against a caller-supplied sink.
pub fn export_to_sink(
    config: &ExportConfig,
    sink: &mut dyn OutputSink,
    log: &mut ExportLog,
) -> BundleResult<ExportSummary> {
    config.validate()?;
    log.set_verbose(config.verbose);
    let prepared = prepare(config, log)?;
    write_groups(sink, &prepared.groups)?;
    sink.finish()?;
    Ok(prepared.summary(None, log))
}

fn write_groups(sink: &mut dyn OutputSink, groups: &[GroupPayload]) -> BundleResult<()> {
    for group in groups {
        sink.create_group(group.name)?;
        for (name, data) in &group.datasets {
            sink.write_dataset(group.name, name, data)?;
        }
    }
    Ok(())
}

fn prepare(config: &ExportConfig, log: &mut ExportLog) -> BundleResult<Prepared> {
    let bundle = Bundle::load(&config.input_path, &config.dict_key)?;
    log.progress(format_args!(
        "loaded `{}` from {}",
        config.dict_key,
        bundle.source().display()
    ));

    let original = bundle.matrix(KEY_TRACE_ORIGINAL)?;
    let filtered = filter_invalid_rows(&original);
    let n_time = filtered.matrix.ncols();
    log.progress(format_args!(
        "{} of {} neurons kept, {} timepoints",
        filtered.map.n_kept(),
        filtered.map.n_original(),
        n_time
    ));
    if !filtered.map.is_identity() {
        log.warn(ExportWarning::EntitiesDropped {
            dropped: filtered.map.n_dropped(),
            kept: filtered.map.n_kept(),
        });
    }

    let standardized = if bundle.contains(KEY_TRACE_STANDARDIZED) {
        let full = bundle.matrix(KEY_TRACE_STANDARDIZED)?;
        if full.dim() != original.dim() {
            return Err(TraceError::ShapeMismatch {
                label: KEY_TRACE_STANDARDIZED,
                expected: original.dim(),
                got: full.dim(),
            }
            .into());
        }
        filtered.map.select_rows(&full)?
    } else {
        log.progress("no standardized trace in input; z-scoring the filtered trace");
        standardize_rows(&filtered.matrix)
    };

    let segments = split_recording(n_time, config.n_recording)?;
    let by_percentile = normalize_rows(&filtered.matrix, &Percentile(BASELINE_PERCENTILE));
    let by_mean = normalize_rows(&filtered.matrix, &Mean);

    let raw_velocity = series(&bundle, KEY_VELOCITY, n_time)?;
    let velocity = if config.velocity_filter {
        VelocityFilter::new(config.velocity_threshold)?.apply(&raw_velocity)?
    } else {
        fill_gaps(&raw_velocity)?
    };
    let indicator = reversal_indicator(&series(&bundle, KEY_REVERSAL_SOURCE, n_time)?);
    let events = extract_events(&indicator);
    log.progress(format_args!("{} reversal events", events.len()));

    let valid = bundle.index_list(KEY_VALID_NEURONS)?;
    let activity = reconstruct_dense(&bundle.sparse_traces(KEY_RAW_ACTIVITY)?, &valid, n_time);
    let marker = reconstruct_dense(&bundle.sparse_traces(KEY_RAW_MARKER)?, &valid, n_time);
    let activity_bkg = reconstruct_background(&bundle.sparse_trace(KEY_RAW_ACTIVITY_BKG)?, n_time);
    let marker_bkg = reconstruct_background(&bundle.sparse_trace(KEY_RAW_MARKER_BKG)?, n_time);

    let mut traces = GroupPayload::new(GROUP_TRACES);
    traces.push("trace_array_F20", by_percentile);
    traces.push("trace_array_Fmean", by_mean);
    traces.push("trace_array", standardized);
    traces.push("trace_array_original", filtered.matrix.clone());
    traces.push("idx_splits", segments_table(&segments));
    traces.push(
        "neuron_filtered_to_original",
        filtered.map.filtered_to_original_table(),
    );
    traces.push(
        "neuron_original_to_filtered",
        filtered.map.original_to_filtered_table(),
    );

    let mut behavior = GroupPayload::new(GROUP_BEHAVIOR);
    behavior.push("velocity", velocity);
    behavior.push(
        "reversal_vec",
        indicator.iter().map(|v| i64::from(*v)).collect::<Vec<_>>(),
    );
    behavior.push("reversal_events", events_table(&events));
    copy_fields(&bundle, &mut behavior, BEHAVIOR_FIELDS, n_time, log);

    let mut timing = GroupPayload::new(GROUP_TIMING);
    copy_fields(&bundle, &mut timing, TIMING_FIELDS, n_time, log);

    let mut groups = vec![traces, behavior, timing];
    if let Some(stimulus) = stimulus_group(&bundle, n_time, log) {
        groups.push(stimulus);
    }
    if let Some(registration) = registration_group(config, n_time, log) {
        groups.push(registration);
    }

    let mut raw = GroupPayload::new(GROUP_RAW_TRACES);
    for (name, rec) in [
        (KEY_RAW_ACTIVITY, activity),
        (KEY_RAW_ACTIVITY_BKG, activity_bkg),
        (KEY_RAW_MARKER, marker),
        (KEY_RAW_MARKER_BKG, marker_bkg),
    ] {
        raw.push(raw_dataset_name(name), checked(name, rec, log));
    }
    groups.push(raw);

    Ok(Prepared {
        groups,
        n_entity_full: filtered.map.n_original(),
        n_entity_kept: filtered.map.n_kept(),
        n_time,
        segments,
        n_events: events.len(),
    })
}

fn raw_dataset_name(key: &str) -> &str {
    key.strip_prefix("raw_").unwrap_or(key)
}

fn checked(key: &'static str, rec: Reconstruction, log: &mut ExportLog) -> ndarray::Array2<f64> {
    if rec.out_of_range > 0 {
        log.warn(ExportWarning::TimepointsOutOfRange {
            key,
            count: rec.out_of_range,
        });
    }
    rec.matrix
}

fn series(bundle: &Bundle, key: &str, n_time: usize) -> BundleResult<Vec<f64>> {
    let values = bundle.vector(key)?;
    if values.len() != n_time {
        return Err(BundleError::malformed(
            key,
            format!("expected {n_time} samples, found {}", values.len()),
        ));
    }
    Ok(values)
}

fn read_field(
    bundle: &Bundle,
    key: &str,
    shape: FieldShape,
    n_time: usize,
) -> BundleResult<Dataset> {
    match shape {
        FieldShape::IndexTable => {
            let table = bundle.int_array(key)?;
            if table.ndim() != 2 {
                return Err(BundleError::malformed(key, "expected a two-dimensional table"));
            }
            Ok(Dataset::Int(table))
        }
        FieldShape::Matrix | FieldShape::SeriesMatrix => {
            let matrix = bundle
                .array(key)?
                .into_dimensionality::<Ix2>()
                .map_err(|_| BundleError::malformed(key, "expected a two-dimensional array"))?;
            if shape == FieldShape::SeriesMatrix && matrix.ncols() != n_time {
                return Err(BundleError::malformed(
                    key,
                    format!("expected {n_time} columns, found {}", matrix.ncols()),
                ));
            }
            Ok(Dataset::from(matrix))
        }
        FieldShape::Series | FieldShape::Vector => {
            let array = bundle.array(key)?;
            if array.ndim() != 1 {
                return Err(BundleError::malformed(key, "expected a one-dimensional array"));
            }
            if shape == FieldShape::Series && array.len() != n_time {
                return Err(BundleError::malformed(
                    key,
                    format!("expected {n_time} samples, found {}", array.len()),
                ));
            }
            Ok(Dataset::Float(array))
        }
    }
}

fn copy_fields(
    bundle: &Bundle,
    group: &mut GroupPayload,
    fields: &[(&str, FieldShape)],
    n_time: usize,
    log: &mut ExportLog,
) {
    for &(key, shape) in fields {
        match read_field(bundle, key, shape, n_time) {
            Ok(data) => group.push(key, data),
            Err(err) => log.warn(ExportWarning::SkippedField {
                group: group.name,
                key: key.to_string(),
                cause: err.to_string(),
            }),
        }
    }
}

fn stimulus_group(bundle: &Bundle, n_time: usize, log: &mut ExportLog) -> Option<GroupPayload> {
    if !bundle.contains(KEY_STIMULUS) {
        return None;
    }
    let mut group = GroupPayload::new(GROUP_STIMULUS);
    copy_fields(
        bundle,
        &mut group,
        &[(KEY_STIMULUS, FieldShape::Vector)],
        n_time,
        log,
    );
    let has_onsets = group
        .datasets
        .iter()
        .any(|(_, data)| data.shape().first().is_some_and(|n| *n > 0));
    has_onsets.then_some(group)
}

fn registration_group(
    config: &ExportConfig,
    n_time: usize,
    log: &mut ExportLog,
) -> Option<GroupPayload> {
    let path = config.registration_path.as_ref()?;
    if !path.exists() {
        log.warn(ExportWarning::RegistrationNotFound { path: path.clone() });
        return None;
    }
    let document = match Bundle::load_root(path) {
        Ok(document) => document,
        Err(err) => {
            log.warn(ExportWarning::SkippedField {
                group: GROUP_REGISTRATION,
                key: path.display().to_string(),
                cause: err.to_string(),
            });
            return None;
        }
    };
    let mut group = GroupPayload::new(GROUP_REGISTRATION);
    copy_fields(&document, &mut group, REGISTRATION_FIELDS, n_time, log);
    (!group.datasets.is_empty()).then_some(group)
}
