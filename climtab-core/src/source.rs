//! Access to raw source files.
//!
//! The aggregator never touches the filesystem directly. It asks a
//! [`SourceReader`] for the files belonging to a source and for the time axis
//! and data array of one field within a file. `climtab-sources` provides the
//! on-disk readers; [`InMemorySource`] backs tests and embedding.

use crate::errors::{CoreError, CoreResult};
use ndarray::{Array1, ArrayD};
use std::collections::{BTreeMap, HashMap};

/// Name of the time axis in every source file.
pub const TIME_AXIS: &str = "time";

/// One field of one source file: a time axis and the matching records.
///
/// `values` has shape `[time]` for scalar fields or `[time, spatial...]` for
/// gridded ones.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSeries {
    pub time: Vec<f64>,
    pub values: ArrayD<f64>,
    /// Declared fill value for masked cells, if the file has one
    pub fill_value: Option<f64>,
}

impl SourceSeries {
    pub fn new(time: Vec<f64>, values: ArrayD<f64>) -> Self {
        Self {
            time,
            values,
            fill_value: None,
        }
    }

    /// A scalar series, one value per time step.
    pub fn scalar(time: Vec<f64>, values: Vec<f64>) -> Self {
        Self::new(time, Array1::from(values).into_dyn())
    }

    pub fn with_fill_value(mut self, fill_value: f64) -> Self {
        self.fill_value = Some(fill_value);
        self
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Check that the data array lines up with the time axis.
    ///
    /// Returns a human readable reason on failure; callers attach the file context.
    pub fn check_shape(&self, gridded: bool) -> Result<(), String> {
        let shape = self.values.shape();
        match shape.first() {
            None => return Err("field is zero-dimensional, expected a time axis".to_string()),
            Some(&len) if len != self.time.len() => {
                return Err(format!(
                    "field has {len} records but the time axis has {}",
                    self.time.len()
                ))
            }
            Some(_) => {}
        }
        if !gridded && shape.len() != 1 {
            return Err(format!(
                "expected a scalar field of shape [time], found {shape:?}"
            ));
        }
        if gridded && shape[1..].iter().any(|&extent| extent == 0) {
            return Err(format!("gridded field has no spatial cells, shape {shape:?}"));
        }
        if let Some(bad) = self.time.iter().find(|t| !t.is_finite()) {
            return Err(format!("time axis contains non-finite value {bad}"));
        }
        Ok(())
    }
}

/// Provides the files of each source and the series stored in them.
pub trait SourceReader {
    /// Identifiers of every file belonging to `source_id`.
    ///
    /// Correctness must not depend on this order; it only decides which
    /// records are seen first when a variable is capped.
    fn list_files(&self, source_id: &str) -> CoreResult<Vec<String>>;

    /// Read `field_name` and the time axis from one file.
    fn read_series(&self, source_id: &str, file: &str, field_name: &str)
        -> CoreResult<SourceSeries>;

    /// Read only the time axis of one file.
    fn read_time_axis(&self, source_id: &str, file: &str) -> CoreResult<Vec<f64>>;
}

impl<R: SourceReader + ?Sized> SourceReader for &R {
    fn list_files(&self, source_id: &str) -> CoreResult<Vec<String>> {
        (**self).list_files(source_id)
    }

    fn read_series(
        &self,
        source_id: &str,
        file: &str,
        field_name: &str,
    ) -> CoreResult<SourceSeries> {
        (**self).read_series(source_id, file, field_name)
    }

    fn read_time_axis(&self, source_id: &str, file: &str) -> CoreResult<Vec<f64>> {
        (**self).read_time_axis(source_id, file)
    }
}

/// A file held in memory by [`InMemorySource`].
#[derive(Debug, Clone, Default)]
pub struct MemoryFile {
    time: Vec<f64>,
    fields: HashMap<String, ArrayD<f64>>,
    fill_values: HashMap<String, f64>,
}

impl MemoryFile {
    pub fn new(time: Vec<f64>) -> Self {
        Self {
            time,
            ..Default::default()
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, values: ArrayD<f64>) -> Self {
        self.fields.insert(name.into(), values);
        self
    }

    pub fn with_scalar_field(self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.with_field(name, Array1::from(values).into_dyn())
    }

    pub fn with_fill_value(mut self, name: impl Into<String>, fill_value: f64) -> Self {
        self.fill_values.insert(name.into(), fill_value);
        self
    }
}

/// Sources kept entirely in memory, listed in insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    sources: BTreeMap<String, Vec<(String, MemoryFile)>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(
        &mut self,
        source_id: impl Into<String>,
        file: impl Into<String>,
        contents: MemoryFile,
    ) -> &mut Self {
        self.sources
            .entry(source_id.into())
            .or_default()
            .push((file.into(), contents));
        self
    }

    fn file(&self, source_id: &str, file: &str) -> CoreResult<&MemoryFile> {
        self.sources
            .get(source_id)
            .and_then(|files| files.iter().find(|(name, _)| name == file))
            .map(|(_, contents)| contents)
            .ok_or_else(|| CoreError::source_read(source_id, file, "no such file"))
    }
}

impl SourceReader for InMemorySource {
    fn list_files(&self, source_id: &str) -> CoreResult<Vec<String>> {
        let files = self.sources.get(source_id).ok_or_else(|| {
            CoreError::source_read(source_id, source_id, "no such source directory")
        })?;
        Ok(files.iter().map(|(name, _)| name.clone()).collect())
    }

    fn read_series(
        &self,
        source_id: &str,
        file: &str,
        field_name: &str,
    ) -> CoreResult<SourceSeries> {
        let contents = self.file(source_id, file)?;
        let values = contents.fields.get(field_name).ok_or_else(|| {
            CoreError::source_read(source_id, file, format!("missing field {field_name:?}"))
        })?;
        Ok(SourceSeries {
            time: contents.time.clone(),
            values: values.clone(),
            fill_value: contents.fill_values.get(field_name).copied(),
        })
    }

    fn read_time_axis(&self, source_id: &str, file: &str) -> CoreResult<Vec<f64>> {
        Ok(self.file(source_id, file)?.time.clone())
    }
}
