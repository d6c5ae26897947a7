// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Hierarchical output sinks: named groups holding named n-dimensional arrays.

mod binary;
#[cfg(feature = "hdf5")]
mod h5;

use std::collections::BTreeMap;
use std::path::Path;

use ndarray::{Array1, Array2, ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::{BundleError, BundleResult};

pub use binary::{read_container, BincodeSink};
#[cfg(feature = "hdf5")]
pub use h5::Hdf5Sink;

/// Array payload handed to a sink.
#[derive(Clone, Debug, PartialEq)]
pub enum Dataset {
    Float(ArrayD<f64>),
    Int(ArrayD<i64>),
}

impl Dataset {
    pub fn shape(&self) -> &[usize] {
        match self {
            Dataset::Float(array) => array.shape(),
            Dataset::Int(array) => array.shape(),
        }
    }

    pub fn as_float(&self) -> Option<&ArrayD<f64>> {
        match self {
            Dataset::Float(array) => Some(array),
            Dataset::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<&ArrayD<i64>> {
        match self {
            Dataset::Int(array) => Some(array),
            Dataset::Float(_) => None,
        }
    }
}

impl From<ArrayD<f64>> for Dataset {
    fn from(array: ArrayD<f64>) -> Self {
        Dataset::Float(array)
    }
}

impl From<Array2<f64>> for Dataset {
    fn from(array: Array2<f64>) -> Self {
        Dataset::Float(array.into_dyn())
    }
}

impl From<Vec<f64>> for Dataset {
    fn from(values: Vec<f64>) -> Self {
        Dataset::Float(Array1::from(values).into_dyn())
    }
}

impl From<ArrayD<i64>> for Dataset {
    fn from(array: ArrayD<i64>) -> Self {
        Dataset::Int(array)
    }
}

impl From<Array2<i64>> for Dataset {
    fn from(array: Array2<i64>) -> Self {
        Dataset::Int(array.into_dyn())
    }
}

impl From<Vec<i64>> for Dataset {
    fn from(values: Vec<i64>) -> Self {
        Dataset::Int(Array1::from(values).into_dyn())
    }
}

/// Destination of an export.
///
/// Groups must be created before datasets are written into them. `finish`
/// flushes and closes the destination; dropping a sink without finishing it
/// releases every resource it holds.
pub trait OutputSink {
    fn create_group(&mut self, name: &str) -> BundleResult<()>;

    fn write_dataset(&mut self, group: &str, name: &str, data: &Dataset) -> BundleResult<()>;

    fn finish(&mut self) -> BundleResult<()>;
}

/// Format of the file produced by [`open_sink`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Bincode-encoded [`Container`].
    Bincode,
    /// HDF5 file, available with the `hdf5` feature.
    Hdf5,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Bincode => "bin",
            OutputFormat::Hdf5 => "h5",
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        if cfg!(feature = "hdf5") {
            OutputFormat::Hdf5
        } else {
            OutputFormat::Bincode
        }
    }
}

/// Opens a file sink of the requested format.
pub fn open_sink(format: OutputFormat, path: &Path) -> BundleResult<Box<dyn OutputSink>> {
    match format {
        OutputFormat::Bincode => Ok(Box::new(BincodeSink::create(path)?)),
        #[cfg(feature = "hdf5")]
        OutputFormat::Hdf5 => Ok(Box::new(Hdf5Sink::create(path)?)),
        #[cfg(not(feature = "hdf5"))]
        OutputFormat::Hdf5 => Err(BundleError::FormatUnavailable("hdf5")),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
enum StoredData {
    Float(Vec<f64>),
    Int(Vec<i64>),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct StoredDataset {
    shape: Vec<usize>,
    data: StoredData,
}

impl StoredDataset {
    fn from_dataset(dataset: &Dataset) -> StoredDataset {
        let shape = dataset.shape().to_vec();
        let data = match dataset {
            Dataset::Float(array) => StoredData::Float(array.iter().copied().collect()),
            Dataset::Int(array) => StoredData::Int(array.iter().copied().collect()),
        };
        StoredDataset { shape, data }
    }

    fn to_dataset(&self) -> BundleResult<Dataset> {
        let shape = IxDyn(&self.shape);
        let dataset = match &self.data {
            StoredData::Float(values) => {
                ArrayD::from_shape_vec(shape, values.clone()).map(Dataset::Float)
            }
            StoredData::Int(values) => ArrayD::from_shape_vec(shape, values.clone()).map(Dataset::Int),
        };
        dataset.map_err(|err| BundleError::Sink(format!("corrupt dataset: {err}")))
    }
}

/// In-memory group → dataset tree shared by the memory and bincode sinks.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Container {
    groups: BTreeMap<String, BTreeMap<String, StoredDataset>>,
}

impl Container {
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }

    pub fn dataset_names(&self, group: &str) -> Vec<&str> {
        self.groups
            .get(group)
            .map(|datasets| datasets.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Decodes one dataset, `Ok(None)` when the group or name is unknown.
    pub fn dataset(&self, group: &str, name: &str) -> BundleResult<Option<Dataset>> {
        self.groups
            .get(group)
            .and_then(|datasets| datasets.get(name))
            .map(StoredDataset::to_dataset)
            .transpose()
    }

    fn create_group(&mut self, name: &str) -> BundleResult<()> {
        if self.groups.contains_key(name) {
            return Err(BundleError::Sink(format!("group `{name}` already exists")));
        }
        self.groups.insert(name.to_string(), BTreeMap::new());
        Ok(())
    }

    fn insert(&mut self, group: &str, name: &str, data: &Dataset) -> BundleResult<()> {
        let datasets = self
            .groups
            .get_mut(group)
            .ok_or_else(|| BundleError::Sink(format!("group `{group}` does not exist")))?;
        if datasets.contains_key(name) {
            return Err(BundleError::Sink(format!(
                "dataset `{group}/{name}` already exists"
            )));
        }
        datasets.insert(name.to_string(), StoredDataset::from_dataset(data));
        Ok(())
    }
}

/// Sink that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    container: Container,
    finished: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn into_container(self) -> Container {
        self.container
    }
}

impl OutputSink for MemorySink {
    fn create_group(&mut self, name: &str) -> BundleResult<()> {
        self.container.create_group(name)
    }

    fn write_dataset(&mut self, group: &str, name: &str, data: &Dataset) -> BundleResult<()> {
        self.container.insert(group, name, data)
    }

    fn finish(&mut self) -> BundleResult<()> {
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn datasets_need_an_existing_group() {
        let mut sink = MemorySink::new();
        let data = Dataset::from(vec![1.0, 2.0]);
        assert!(sink.write_dataset("traces", "x", &data).is_err());
        sink.create_group("traces").unwrap();
        sink.write_dataset("traces", "x", &data).unwrap();
        assert!(sink.write_dataset("traces", "x", &data).is_err());
        assert!(sink.create_group("traces").is_err());
    }

    #[test]
    fn container_decodes_shapes() {
        let mut sink = MemorySink::new();
        sink.create_group("g").unwrap();
        sink.write_dataset("g", "t", &Dataset::from(array![[1i64, 2], [3, 4], [5, 6]]))
            .unwrap();
        sink.finish().unwrap();
        assert!(sink.is_finished());

        let container = sink.into_container();
        let table = container.dataset("g", "t").unwrap().unwrap();
        assert_eq!(table.shape(), &[3, 2]);
        assert_eq!(table.as_int().unwrap()[[2, 1]], 6);
        assert!(container.dataset("g", "missing").unwrap().is_none());
        assert!(container.dataset("other", "t").unwrap().is_none());
        assert_eq!(container.dataset_names("g"), vec!["t"]);
    }

    #[test]
    fn corrupt_dataset_is_an_error_not_a_miss() {
        let mut container = Container::default();
        container.create_group("g").unwrap();
        container.groups.get_mut("g").unwrap().insert(
            "bad".to_string(),
            StoredDataset {
                shape: vec![2, 3],
                data: StoredData::Float(vec![1.0, 2.0]),
            },
        );
        assert!(matches!(
            container.dataset("g", "bad"),
            Err(BundleError::Sink(_))
        ));
    }

    #[test]
    fn default_format_follows_features() {
        let expected = if cfg!(feature = "hdf5") { "h5" } else { "bin" };
        assert_eq!(OutputFormat::default().extension(), expected);
    }
}
