//! Directory of JSON array files, one directory per source.
//!
//! Each file holds the shared time axis and any number of fields:
//!
//! ```json
//! {
//!   "variables": {
//!     "time": { "v": 1, "dim": [3], "data": [0.0, 1.0, 2.0] },
//!     "tas":  { "v": 1, "dim": [3, 1, 2], "data": [280.0, 281.0, 280.5, null, 282.0, 283.0] }
//!   },
//!   "fill_values": { "tas": 1e20 }
//! }
//! ```
//!
//! Arrays use ndarray's serde layout. `null` cells are read as NaN.

use climtab_core::errors::{CoreError, CoreResult};
use climtab_core::source::{SourceReader, SourceSeries, TIME_AXIS};
use ndarray::{Array1, ArrayD};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File extension of array files.
pub const EXTENSION: &str = "json";

/// Contents of one array file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayFile {
    pub variables: BTreeMap<String, ArrayD<Option<f64>>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fill_values: BTreeMap<String, f64>,
}

impl ArrayFile {
    /// A file holding only the time axis.
    pub fn new(time: Vec<f64>) -> Self {
        let mut file = Self::default();
        let time: Array1<Option<f64>> = time.into_iter().map(Some).collect();
        file.variables.insert(TIME_AXIS.to_string(), time.into_dyn());
        file
    }

    pub fn with_field(mut self, name: impl Into<String>, values: &ArrayD<f64>) -> Self {
        let values = values.mapv(|v| (!v.is_nan()).then_some(v));
        self.variables.insert(name.into(), values);
        self
    }

    pub fn with_fill_value(mut self, name: impl Into<String>, fill_value: f64) -> Self {
        self.fill_values.insert(name.into(), fill_value);
        self
    }

    /// Write the file as JSON.
    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()
    }
}

/// Only the time axis of an array file; every other variable is skipped.
#[derive(Deserialize)]
struct TimeOnly {
    variables: TimeVariable,
}

#[derive(Deserialize)]
struct TimeVariable {
    time: Option<ArrayD<Option<f64>>>,
}

/// Reads `<root>/<source_id>/*.json`.
#[derive(Debug, Clone)]
pub struct JsonArrayDirectory {
    root: PathBuf,
}

impl JsonArrayDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_dir(&self, source_id: &str) -> PathBuf {
        self.root.join(source_id)
    }

    fn parse<T: DeserializeOwned>(&self, source_id: &str, file: &str) -> CoreResult<T> {
        let path = self.source_dir(source_id).join(file);
        let handle =
            File::open(&path).map_err(|e| CoreError::source_read(source_id, file, e.to_string()))?;
        serde_json::from_reader(BufReader::new(handle))
            .map_err(|e| CoreError::source_read(source_id, file, e.to_string()))
    }
}

/// The time axis as a flat list; it must be present and one-dimensional.
fn time_axis(source_id: &str, file: &str, time: Option<&ArrayD<Option<f64>>>) -> CoreResult<Vec<f64>> {
    let time = time.ok_or_else(|| {
        CoreError::source_read(source_id, file, format!("missing variable {TIME_AXIS:?}"))
    })?;
    if time.ndim() != 1 {
        return Err(CoreError::source_read(
            source_id,
            file,
            format!("{TIME_AXIS:?} must be one-dimensional, found shape {:?}", time.shape()),
        ));
    }
    Ok(time.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

impl SourceReader for JsonArrayDirectory {
    fn list_files(&self, source_id: &str) -> CoreResult<Vec<String>> {
        let dir = self.source_dir(source_id);
        let unreadable =
            |e: std::io::Error| CoreError::source_read(source_id, dir.display().to_string(), e.to_string());

        let mut files = Vec::new();
        for entry in fs::read_dir(&dir).map_err(unreadable)? {
            let path = entry.map_err(unreadable)?.path();
            if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                if !name.starts_with('.') {
                    files.push(name.to_string());
                }
            }
        }
        files.sort();
        debug!(source = source_id, files = files.len(), "Listed source directory");
        Ok(files)
    }

    fn read_series(
        &self,
        source_id: &str,
        file: &str,
        field_name: &str,
    ) -> CoreResult<SourceSeries> {
        let mut contents: ArrayFile = self.parse(source_id, file)?;
        let missing =
            |name: &str| CoreError::source_read(source_id, file, format!("missing variable {name:?}"));

        let time = time_axis(source_id, file, contents.variables.get(TIME_AXIS))?;
        let values = contents
            .variables
            .remove(field_name)
            .ok_or_else(|| missing(field_name))?
            .mapv(|v| v.unwrap_or(f64::NAN));

        let series = SourceSeries::new(time, values);
        Ok(match contents.fill_values.get(field_name) {
            Some(&fill_value) => series.with_fill_value(fill_value),
            None => series,
        })
    }

    fn read_time_axis(&self, source_id: &str, file: &str) -> CoreResult<Vec<f64>> {
        let contents: TimeOnly = self.parse(source_id, file)?;
        time_axis(source_id, file, contents.variables.time.as_ref())
    }
}
