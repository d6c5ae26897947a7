// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use approx::assert_abs_diff_eq;
use serde_json::{json, Value};
use st_bundle::{
    export_bundle, export_to_sink, read_container, BundleError, Container, ExportConfig,
    ExportLog, ExportWarning, MemorySink, OutputFormat,
};
use st_trace::TraceError;
use tempfile::{tempdir, TempDir};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

fn recording() -> Value {
    let ramp: Vec<f64> = (1..=10).map(f64::from).collect();
    let nir: Vec<f64> = (0..25).map(|i| f64::from(i) * 0.05).collect();
    json!({
        "data_dict": {
            "trace_array_original": [
                ramp,
                [null, null, null, null, null, null, null, null, null, null],
                [2.0, 2.0, 2.0, 2.0, 2.0, 4.0, 4.0, 4.0, 4.0, 4.0],
            ],
            "velocity": [0.1, 0.5, null, -0.3, -0.05, 0.25, 0.0, -0.4, null, 0.15],
            "reversal_source": [-1.0, -1.0, 0.5, 0.5, -0.2, 0.3, 0.3, -1.0, -1.0, -1.0],
            "valid_neurons": [1, 3],
            "raw_activity": {
                "1": {"1": 10.0, "2": 11.0, "10": 12.0},
                "3": {"5": 3.0, "11": 99.0},
            },
            "raw_marker": [{"1": 1.0}, null, {"2": 2.0}],
            "raw_activity_bkg": {"1": 0.1, "3": 0.3},
            "raw_marker_bkg": {},
            "head_angle": [0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9],
            "angular_velocity": [0.0, 0.1],
            "body_angle": [
                [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
                [2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0],
            ],
            "timestamp_confocal": [0.0, 0.6, 1.2, 1.8, 2.4, 3.0, 3.6, 4.2, 4.8, 5.4],
            "timestamp_nir": nir,
            "stim_begin_confocal": [3],
        }
    })
}

struct Fixture {
    dir: TempDir,
    input: PathBuf,
}

impl Fixture {
    fn new(document: Value) -> Self {
        let dir = tempdir().unwrap();
        let input = dir.path().join("recording.json");
        fs::write(&input, serde_json::to_vec(&document).unwrap()).unwrap();
        Self { dir, input }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn config(&self) -> ExportConfig {
        ExportConfig::new(&self.input)
            .with_output(self.path("recording.bin"))
            .with_format(OutputFormat::Bincode)
            .with_n_recording(2)
            .with_velocity_filter(true, 0.2)
            .with_verbose(false)
    }
}

fn float(container: &Container, group: &str, name: &str) -> ndarray::ArrayD<f64> {
    container
        .dataset(group, name)
        .unwrap()
        .unwrap_or_else(|| panic!("{group}/{name} missing"))
        .as_float()
        .unwrap()
        .clone()
}

fn table(container: &Container, group: &str, name: &str) -> Vec<Vec<i64>> {
    let data = container
        .dataset(group, name)
        .unwrap()
        .unwrap_or_else(|| panic!("{group}/{name} missing"));
    let array = data.as_int().unwrap();
    array
        .outer_iter()
        .map(|row| row.iter().copied().collect())
        .collect()
}

fn write_registration(path: &Path) {
    let document = json!({
        "roi_match_confidence": [[0.9, 0.1], [0.2, 0.8]],
        "roi_match": [[1, 2], [2, 1]],
    });
    fs::write(path, serde_json::to_vec(&document).unwrap()).unwrap();
}

/// Counts `INFO` events seen while installed.
#[derive(Clone, Default)]
struct InfoCounter(Arc<AtomicUsize>);

impl InfoCounter {
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl<S: Subscriber> Layer<S> for InfoCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::INFO {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn progress_lines(config: &ExportConfig, log: &mut ExportLog) -> usize {
    let counter = InfoCounter::default();
    let subscriber = tracing_subscriber::registry().with(counter.clone());
    tracing::subscriber::with_default(subscriber, || {
        export_to_sink(config, &mut MemorySink::new(), log).unwrap();
    });
    counter.count()
}

#[test]
fn end_to_end_export_writes_every_group() {
    let fixture = Fixture::new(recording());
    let registration = fixture.path("registration.json");
    write_registration(&registration);
    let config = fixture.config().with_registration(&registration);
    let mut log = ExportLog::new(config.verbose);

    let summary = export_bundle(&config, &mut log).unwrap();
    assert_eq!(summary.n_entity_full, 3);
    assert_eq!(summary.n_entity_kept, 2);
    assert_eq!(summary.n_time, 10);
    assert_eq!(summary.n_events, 3);
    assert_eq!(
        summary.groups,
        vec!["traces", "behavior", "timing", "stimulus", "registration", "raw_traces"]
    );

    let container = read_container(summary.output_path.as_ref().unwrap()).unwrap();

    // traces
    assert_eq!(float(&container, "traces", "trace_array_original").shape(), &[2, 10]);
    assert_eq!(table(&container, "traces", "idx_splits"), vec![vec![1, 5], vec![6, 10]]);
    assert_eq!(
        table(&container, "traces", "neuron_filtered_to_original"),
        vec![vec![1, 1], vec![2, 3]]
    );
    assert_eq!(
        table(&container, "traces", "neuron_original_to_filtered"),
        vec![vec![1, 1], vec![3, 2]]
    );
    let f20 = float(&container, "traces", "trace_array_F20");
    assert_abs_diff_eq!(f20[[0, 0]], 1.0 / 2.8, epsilon = 1e-12);
    assert_abs_diff_eq!(f20[[1, 9]], 2.0, epsilon = 1e-12);
    let fmean = float(&container, "traces", "trace_array_Fmean");
    assert_abs_diff_eq!(fmean[[0, 9]], 10.0 / 5.5, epsilon = 1e-12);
    let zscored = float(&container, "traces", "trace_array");
    assert_eq!(zscored.shape(), &[2, 10]);
    let row_mean = zscored.iter().take(10).sum::<f64>() / 10.0;
    assert_abs_diff_eq!(row_mean, 0.0, epsilon = 1e-12);

    // behavior
    let velocity = float(&container, "behavior", "velocity");
    let expected = [0.0, 0.5, 0.0, -0.3, 0.0, 0.25, 0.0, -0.4, 0.0, 0.0];
    for (got, want) in velocity.iter().zip(expected) {
        assert_abs_diff_eq!(*got, want, epsilon = 1e-12);
    }
    assert_eq!(
        table(&container, "behavior", "reversal_events"),
        vec![vec![1, 2], vec![5, 5], vec![8, 10]]
    );
    let reversal = container.dataset("behavior", "reversal_vec").unwrap().unwrap();
    assert_eq!(
        reversal.as_int().unwrap().iter().copied().collect::<Vec<_>>(),
        vec![1, 1, 0, 0, 1, 0, 0, 1, 1, 1]
    );
    assert!(container.dataset("behavior", "head_angle").unwrap().is_some());
    assert_eq!(float(&container, "behavior", "body_angle").shape(), &[2, 10]);
    assert!(container.dataset("behavior", "angular_velocity").unwrap().is_none());
    assert!(container.dataset("behavior", "pumping").unwrap().is_none());

    // timing, stimulus, registration
    assert_eq!(float(&container, "timing", "timestamp_nir").shape(), &[25]);
    assert_eq!(float(&container, "stimulus", "stim_begin_confocal").shape(), &[1]);
    assert_eq!(table(&container, "registration", "roi_match"), vec![vec![1, 2], vec![2, 1]]);
    assert_eq!(
        float(&container, "registration", "roi_match_confidence").shape(),
        &[2, 2]
    );

    // raw traces
    let activity = float(&container, "raw_traces", "activity");
    assert_eq!(activity.shape(), &[2, 10]);
    assert_eq!(activity[[0, 0]], 10.0);
    assert_eq!(activity[[0, 9]], 12.0);
    assert_eq!(activity[[1, 4]], 3.0);
    assert!(activity[[1, 0]].is_nan());
    let marker = float(&container, "raw_traces", "marker");
    assert_eq!(marker[[0, 0]], 1.0);
    assert_eq!(marker[[1, 1]], 2.0);
    assert_eq!(float(&container, "raw_traces", "activity_bkg").shape(), &[1, 10]);
    let marker_bkg = float(&container, "raw_traces", "marker_bkg");
    assert!(marker_bkg.iter().all(|v| v.is_nan()));

    // diagnostics
    let warnings = log.warnings();
    assert!(warnings.contains(&ExportWarning::EntitiesDropped {
        dropped: 1,
        kept: 2
    }));
    assert!(warnings.contains(&ExportWarning::TimepointsOutOfRange {
        key: "raw_activity",
        count: 1
    }));
    let skipped: Vec<&str> = warnings
        .iter()
        .filter_map(|w| match w {
            ExportWarning::SkippedField { key, .. } => Some(key.as_str()),
            _ => None,
        })
        .collect();
    assert!(skipped.contains(&"angular_velocity"));
    assert!(skipped.contains(&"pumping"));
    assert!(!skipped.contains(&"head_angle"));
    assert_eq!(summary.warnings, warnings);
}

#[test]
fn unfiltered_velocity_is_only_gap_filled() {
    let fixture = Fixture::new(recording());
    let config = fixture.config().with_velocity_filter(false, 0.2);
    let mut sink = MemorySink::new();
    let mut log = ExportLog::new(false);
    export_to_sink(&config, &mut sink, &mut log).unwrap();
    assert!(sink.is_finished());

    let velocity = float(sink.container(), "behavior", "velocity");
    let expected = [0.1, 0.5, 0.1, -0.3, -0.05, 0.25, 0.0, -0.4, -0.125, 0.15];
    for (got, want) in velocity.iter().zip(expected) {
        assert_abs_diff_eq!(*got, want, epsilon = 1e-12);
    }
    assert!(!fixture.path("recording.bin").exists());
}

#[test]
fn precomputed_standardized_trace_is_filtered_alongside() {
    let mut document = recording();
    let standardized: Vec<Vec<f64>> = (0..3)
        .map(|row| (0..10).map(|t| f64::from(row * 100 + t)).collect())
        .collect();
    document["data_dict"]["trace_array"] = json!(standardized);
    let fixture = Fixture::new(document);
    let mut sink = MemorySink::new();
    let mut log = ExportLog::new(false);
    export_to_sink(&fixture.config(), &mut sink, &mut log).unwrap();

    let trace = float(sink.container(), "traces", "trace_array");
    assert_eq!(trace.shape(), &[2, 10]);
    assert_eq!(trace[[0, 3]], 3.0);
    assert_eq!(trace[[1, 3]], 203.0);
}

#[test]
fn mismatched_standardized_trace_aborts() {
    let mut document = recording();
    document["data_dict"]["trace_array"] = json!([[1.0, 2.0]]);
    let fixture = Fixture::new(document);
    let config = fixture.config();
    let err = export_bundle(&config, &mut ExportLog::new(false)).unwrap_err();
    assert!(matches!(
        err,
        BundleError::Trace(TraceError::ShapeMismatch { .. })
    ));
    assert!(!config.resolved_output().exists());
}

#[test]
fn missing_mandatory_key_aborts_without_output() {
    let mut document = recording();
    document["data_dict"]
        .as_object_mut()
        .unwrap()
        .remove("velocity");
    let fixture = Fixture::new(document);
    let config = fixture.config();
    match export_bundle(&config, &mut ExportLog::new(false)) {
        Err(BundleError::MissingKey(key)) => assert_eq!(key, "velocity"),
        other => panic!("unexpected {other:?}"),
    }
    assert!(!config.resolved_output().exists());
}

#[test]
fn uneven_segmentation_is_fatal() {
    let fixture = Fixture::new(recording());
    let config = fixture.config().with_n_recording(3);
    let err = export_bundle(&config, &mut ExportLog::new(false)).unwrap_err();
    assert!(matches!(
        err,
        BundleError::Trace(TraceError::InvalidSegmentation { .. })
    ));
    assert!(!config.resolved_output().exists());
}

#[test]
fn absent_registration_is_warned_and_omitted() {
    let fixture = Fixture::new(recording());
    let config = fixture
        .config()
        .with_registration(fixture.path("no-such-registration.json"));
    let mut sink = MemorySink::new();
    let mut log = ExportLog::new(false);
    let summary = export_to_sink(&config, &mut sink, &mut log).unwrap();
    assert!(!summary.groups.contains(&"registration"));
    assert!(!sink.container().has_group("registration"));
    assert!(log
        .warnings()
        .iter()
        .any(|w| matches!(w, ExportWarning::RegistrationNotFound { .. })));
}

#[test]
fn custom_dict_key_and_missing_input() {
    let mut document = recording();
    let payload = document.as_object_mut().unwrap().remove("data_dict").unwrap();
    let fixture = Fixture::new(json!({ "session": payload }));

    let wrong_key = export_bundle(&fixture.config(), &mut ExportLog::new(false));
    assert!(matches!(wrong_key, Err(BundleError::MissingKey(ref key)) if key == "data_dict"));

    let config = fixture.config().with_dict_key("session");
    assert!(export_bundle(&config, &mut ExportLog::new(false)).is_ok());

    let missing = ExportConfig::new(fixture.path("absent.json")).with_verbose(false);
    assert!(matches!(
        export_bundle(&missing, &mut ExportLog::new(false)),
        Err(BundleError::MissingInput { .. })
    ));
}

#[test]
fn config_verbosity_governs_progress_output() {
    let fixture = Fixture::new(recording());

    let mut log = ExportLog::new(true);
    let quiet = fixture.config().with_verbose(false);
    assert_eq!(progress_lines(&quiet, &mut log), 0);
    assert!(!log.is_verbose());
    assert!(!log.warnings().is_empty());

    let mut log = ExportLog::new(false);
    let chatty = fixture.config().with_verbose(true);
    assert!(progress_lines(&chatty, &mut log) > 0);
    assert!(log.is_verbose());
}

#[cfg(feature = "hdf5")]
#[test]
fn hdf5_export_writes_groups_and_datasets() {
    let forward = vec![1.0_f64; 10];
    let mut document = recording();
    document["data_dict"]["reversal_source"] = json!(forward);
    let fixture = Fixture::new(document);
    let output = fixture.path("recording.h5");
    let config = fixture
        .config()
        .with_format(OutputFormat::Hdf5)
        .with_output(&output);
    let summary = export_bundle(&config, &mut ExportLog::new(false)).unwrap();
    assert_eq!(summary.n_events, 0);

    let file = hdf5::File::open(&output).unwrap();
    let mut groups = file.member_names().unwrap();
    groups.sort();
    assert_eq!(
        groups,
        vec!["behavior", "raw_traces", "stimulus", "timing", "traces"]
    );

    let splits = file.dataset("traces/idx_splits").unwrap();
    assert_eq!(splits.shape(), vec![2, 2]);
    let splits: ndarray::Array2<i64> = splits.read_2d().unwrap();
    assert_eq!(splits, ndarray::array![[1i64, 5], [6, 10]]);

    let events = file.dataset("behavior/reversal_events").unwrap();
    assert_eq!(events.shape(), vec![0, 2]);
    let activity = file.dataset("raw_traces/activity").unwrap();
    assert_eq!(activity.shape(), vec![2, 10]);
}

#[cfg(not(feature = "hdf5"))]
#[test]
fn hdf5_output_requires_the_feature() {
    let fixture = Fixture::new(recording());
    let config = fixture
        .config()
        .with_format(OutputFormat::Hdf5)
        .with_output(fixture.path("recording.h5"));
    let err = export_bundle(&config, &mut ExportLog::new(false)).unwrap_err();
    assert!(matches!(err, BundleError::FormatUnavailable("hdf5")));
    assert!(!fixture.path("recording.h5").exists());
}
