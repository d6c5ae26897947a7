// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use hdf5::{File, Group, H5Type};
use ndarray::ArrayD;
use tracing::debug;

use super::{Dataset, OutputSink};
use crate::error::{BundleError, BundleResult};

fn sink_error(err: hdf5::Error) -> BundleError {
    BundleError::Sink(err.to_string())
}

/// Zero-sized arrays only get their extents; there is nothing to write.
fn write_array<T: H5Type>(group: &Group, name: &str, array: &ArrayD<T>) -> hdf5::Result<()> {
    if array.is_empty() {
        group
            .new_dataset::<T>()
            .shape(array.shape().to_vec())
            .create(name)?;
    } else {
        group.new_dataset_builder().with_data(array).create(name)?;
    }
    Ok(())
}

/// Sink writing an HDF5 file with one HDF5 group per export group.
pub struct Hdf5Sink {
    path: PathBuf,
    file: Option<File>,
    groups: BTreeMap<String, Group>,
}

impl Hdf5Sink {
    pub fn create<P: AsRef<Path>>(path: P) -> BundleResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(sink_error)?;
        Ok(Self {
            path,
            file: Some(file),
            groups: BTreeMap::new(),
        })
    }

    fn file(&self) -> BundleResult<&File> {
        self.file
            .as_ref()
            .ok_or_else(|| BundleError::Sink(format!("{} is already closed", self.path.display())))
    }
}

impl OutputSink for Hdf5Sink {
    fn create_group(&mut self, name: &str) -> BundleResult<()> {
        if self.groups.contains_key(name) {
            return Err(BundleError::Sink(format!("group `{name}` already exists")));
        }
        let group = self.file()?.create_group(name).map_err(sink_error)?;
        self.groups.insert(name.to_string(), group);
        Ok(())
    }

    fn write_dataset(&mut self, group: &str, name: &str, data: &Dataset) -> BundleResult<()> {
        let handle = self
            .groups
            .get(group)
            .ok_or_else(|| BundleError::Sink(format!("group `{group}` does not exist")))?;
        match data {
            Dataset::Float(array) => write_array(handle, name, array),
            Dataset::Int(array) => write_array(handle, name, array),
        }
        .map_err(sink_error)
    }

    fn finish(&mut self) -> BundleResult<()> {
        self.groups.clear();
        if let Some(file) = self.file.take() {
            file.flush().map_err(sink_error)?;
            file.close().map_err(sink_error)?;
            debug!(path = %self.path.display(), "hdf5 file closed");
        }
        Ok(())
    }
}

impl Drop for Hdf5Sink {
    fn drop(&mut self) {
        self.groups.clear();
        if self.file.take().is_some() {
            debug!(path = %self.path.display(), "closing unfinished hdf5 file");
        }
    }
}
