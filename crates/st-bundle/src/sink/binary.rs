// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Container, Dataset, OutputSink};
use crate::error::{BundleError, BundleResult};

/// Sink that serialises a [`Container`] with bincode.
///
/// Nothing touches the disk until [`OutputSink::finish`]; the file is written
/// to a temporary sibling first and renamed into place, so a failed export
/// never leaves a truncated container behind.
#[derive(Debug)]
pub struct BincodeSink {
    path: PathBuf,
    container: Container,
    finished: bool,
}

impl BincodeSink {
    pub fn create<P: AsRef<Path>>(path: P) -> BundleResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                return Err(BundleError::io(
                    parent,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "output directory missing"),
                ));
            }
        }
        Ok(Self {
            path,
            container: Container::default(),
            finished: false,
        })
    }

    fn write_atomic(&self) -> BundleResult<()> {
        let tmp = self.path.with_extension("bin.tmp");
        let written = self.write_to(&tmp).and_then(|()| {
            fs::rename(&tmp, &self.path).map_err(|source| BundleError::io(&self.path, source))
        });
        if written.is_err() && tmp.exists() {
            if let Err(err) = fs::remove_file(&tmp) {
                debug!(path = %tmp.display(), error = %err, "failed to remove temporary container");
            }
        }
        written
    }

    fn write_to(&self, tmp: &Path) -> BundleResult<()> {
        let file = File::create(tmp).map_err(|source| BundleError::io(tmp, source))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, &self.container).map_err(|source| {
            BundleError::Bincode {
                path: tmp.to_path_buf(),
                source,
            }
        })?;
        writer.flush().map_err(|source| BundleError::io(tmp, source))
    }
}

impl OutputSink for BincodeSink {
    fn create_group(&mut self, name: &str) -> BundleResult<()> {
        self.container.create_group(name)
    }

    fn write_dataset(&mut self, group: &str, name: &str, data: &Dataset) -> BundleResult<()> {
        self.container.insert(group, name, data)
    }

    fn finish(&mut self) -> BundleResult<()> {
        if self.finished {
            return Ok(());
        }
        self.write_atomic()?;
        self.finished = true;
        debug!(path = %self.path.display(), "container written");
        Ok(())
    }
}

impl Drop for BincodeSink {
    fn drop(&mut self) {
        if !self.finished {
            debug!(path = %self.path.display(), "discarding unfinished container");
        }
    }
}

/// Reads a container written by [`BincodeSink`].
pub fn read_container<P: AsRef<Path>>(path: P) -> BundleResult<Container> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| BundleError::io(path, source))?;
    bincode::deserialize_from(BufReader::new(file)).map_err(|source| BundleError::Bincode {
        path: path.to_path_buf(),
        source,
    })
}
