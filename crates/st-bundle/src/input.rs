// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Structured input mapping.
//!
//! Recordings are exchanged as JSON documents whose payload lives under a
//! dictionary key (`data_dict` by default). Float arrays use `null` for
//! missing samples. Sparse traces are objects keyed by 1-based timepoint; a
//! collection of sparse traces is either an object keyed by entity id or an
//! array where position `i` holds entity `i + 1`.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2, ArrayD, IxDyn};
use serde_json::{Map, Value};
use st_trace::SparseTrace;

use crate::error::{BundleError, BundleResult};

/// Key/value payload of one input document.
#[derive(Clone, Debug)]
pub struct Bundle {
    source: PathBuf,
    fields: Map<String, Value>,
}

impl Bundle {
    /// Loads `path` and returns the object stored under `dict_key`.
    pub fn load<P: AsRef<Path>>(path: P, dict_key: &str) -> BundleResult<Self> {
        let path = path.as_ref();
        let document = read_json(path)?;
        let payload = match document {
            Value::Object(mut root) => root
                .remove(dict_key)
                .ok_or_else(|| BundleError::MissingKey(dict_key.to_string()))?,
            _ => return Err(BundleError::malformed(dict_key, "document root is not an object")),
        };
        Self::from_value(path, dict_key, payload)
    }

    /// Loads `path` and uses the whole document as the payload.
    pub fn load_root<P: AsRef<Path>>(path: P) -> BundleResult<Self> {
        let path = path.as_ref();
        let document = read_json(path)?;
        Self::from_value(path, "<root>", document)
    }

    /// Wraps an in-memory JSON object.
    pub fn from_value(
        source: impl Into<PathBuf>,
        label: &str,
        value: Value,
    ) -> BundleResult<Self> {
        match value {
            Value::Object(fields) => Ok(Self {
                source: source.into(),
                fields,
            }),
            _ => Err(BundleError::malformed(label, "payload is not an object")),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    fn get(&self, key: &str) -> BundleResult<&Value> {
        self.fields
            .get(key)
            .ok_or_else(|| BundleError::MissingKey(key.to_string()))
    }

    /// Rectangular `[rows, cols]` float matrix given as an array of rows.
    pub fn matrix(&self, key: &str) -> BundleResult<Array2<f64>> {
        let rows = as_array(key, self.get(key)?)?;
        let n_cols = match rows.first() {
            Some(first) => as_array(key, first)?.len(),
            None => 0,
        };
        let mut data = Vec::with_capacity(rows.len() * n_cols);
        for (r, row) in rows.iter().enumerate() {
            let row = as_array(key, row)?;
            if row.len() != n_cols {
                return Err(BundleError::malformed(
                    key,
                    format!("row {r} has {} columns, expected {n_cols}", row.len()),
                ));
            }
            for value in row {
                data.push(as_float(key, value)?);
            }
        }
        Array2::from_shape_vec((rows.len(), n_cols), data)
            .map_err(|err| BundleError::malformed(key, err.to_string()))
    }

    /// Flat float vector.
    pub fn vector(&self, key: &str) -> BundleResult<Vec<f64>> {
        as_array(key, self.get(key)?)?
            .iter()
            .map(|value| as_float(key, value))
            .collect()
    }

    /// Flat list of non-negative integer ids.
    pub fn index_list(&self, key: &str) -> BundleResult<Vec<usize>> {
        as_array(key, self.get(key)?)?
            .iter()
            .map(|value| as_index(key, value))
            .collect()
    }

    /// One- or two-dimensional float array, whichever the value encodes.
    pub fn array(&self, key: &str) -> BundleResult<ArrayD<f64>> {
        let value = self.get(key)?;
        let items = as_array(key, value)?;
        if items.first().is_some_and(Value::is_array) {
            Ok(self.matrix(key)?.into_dyn())
        } else {
            Ok(Array1::from(self.vector(key)?).into_dyn())
        }
    }

    /// One- or two-dimensional integer array.
    pub fn int_array(&self, key: &str) -> BundleResult<ArrayD<i64>> {
        let items = as_array(key, self.get(key)?)?;
        if !items.first().is_some_and(Value::is_array) {
            let data: Vec<i64> = items
                .iter()
                .map(|value| as_int(key, value))
                .collect::<BundleResult<_>>()?;
            return Ok(Array1::from(data).into_dyn());
        }
        let n_cols = as_array(key, &items[0])?.len();
        let mut data = Vec::with_capacity(items.len() * n_cols);
        for row in items {
            let row = as_array(key, row)?;
            if row.len() != n_cols {
                return Err(BundleError::malformed(key, "ragged integer table"));
            }
            for value in row {
                data.push(as_int(key, value)?);
            }
        }
        ArrayD::from_shape_vec(IxDyn(&[items.len(), n_cols]), data)
            .map_err(|err| BundleError::malformed(key, err.to_string()))
    }

    /// Single sparse trace keyed by timepoint.
    pub fn sparse_trace(&self, key: &str) -> BundleResult<SparseTrace> {
        parse_sparse(key, self.get(key)?)
    }

    /// Sparse traces of every entity, keyed by 1-based entity id.
    pub fn sparse_traces(&self, key: &str) -> BundleResult<BTreeMap<usize, SparseTrace>> {
        let mut traces = BTreeMap::new();
        match self.get(key)? {
            Value::Object(entities) => {
                for (entity, trace) in entities {
                    traces.insert(parse_key(key, entity)?, parse_sparse(key, trace)?);
                }
            }
            Value::Array(entities) => {
                for (idx, trace) in entities.iter().enumerate() {
                    if !trace.is_null() {
                        traces.insert(idx + 1, parse_sparse(key, trace)?);
                    }
                }
            }
            _ => return Err(BundleError::malformed(key, "expected an object or array of traces")),
        }
        Ok(traces)
    }
}

fn read_json(path: &Path) -> BundleResult<Value> {
    if !path.exists() {
        return Err(BundleError::MissingInput {
            path: path.to_path_buf(),
        });
    }
    let file = File::open(path).map_err(|source| BundleError::io(path, source))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| BundleError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn as_array<'a>(key: &str, value: &'a Value) -> BundleResult<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| BundleError::malformed(key, format!("expected an array, found {}", kind(value))))
}

fn as_float(key: &str, value: &Value) -> BundleResult<f64> {
    match value {
        Value::Null => Ok(f64::NAN),
        Value::Bool(flag) => Ok(f64::from(u8::from(*flag))),
        Value::Number(number) => number
            .as_f64()
            .ok_or_else(|| BundleError::malformed(key, format!("{number} is not representable"))),
        other => Err(BundleError::malformed(
            key,
            format!("expected a number, found {}", kind(other)),
        )),
    }
}

fn as_int(key: &str, value: &Value) -> BundleResult<i64> {
    if let Some(int) = value.as_i64() {
        return Ok(int);
    }
    match value.as_f64() {
        Some(float) if float.fract() == 0.0 && float.abs() < i64::MAX as f64 => Ok(float as i64),
        _ => Err(BundleError::malformed(
            key,
            format!("expected an integer, found {value}"),
        )),
    }
}

fn as_index(key: &str, value: &Value) -> BundleResult<usize> {
    let int = as_int(key, value)?;
    usize::try_from(int)
        .map_err(|_| BundleError::malformed(key, format!("negative index {int}")))
}

fn parse_key(key: &str, raw: &str) -> BundleResult<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| BundleError::malformed(key, format!("`{raw}` is not an index")))
}

fn parse_sparse(key: &str, value: &Value) -> BundleResult<SparseTrace> {
    let entries = value
        .as_object()
        .ok_or_else(|| BundleError::malformed(key, format!("expected a timepoint map, found {}", kind(value))))?;
    entries
        .iter()
        .map(|(t, v)| Ok((parse_key(key, t)?, as_float(key, v)?)))
        .collect()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
