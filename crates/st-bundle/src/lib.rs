// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Export of calcium-imaging recording bundles into grouped binary containers.
//!
//! ```no_run
//! use st_bundle::{export_bundle, ExportConfig, ExportLog};
//!
//! let config = ExportConfig::new("recording.json").with_n_recording(2);
//! let mut log = ExportLog::new(config.verbose);
//! let summary = export_bundle(&config, &mut log)?;
//! println!("{} neurons kept", summary.n_entity_kept);
//! # Ok::<(), st_bundle::BundleError>(())
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod input;
pub mod log;
pub mod sink;
pub mod telemetry;

pub use config::ExportConfig;
pub use error::{BundleError, BundleResult};
pub use export::{export_bundle, export_to_sink, ExportSummary, FieldShape};
pub use input::Bundle;
pub use log::{ExportLog, ExportWarning};
pub use sink::{open_sink, read_container, Container, Dataset, MemorySink, OutputFormat, OutputSink};
