//! Run configuration loaded from TOML.
//!
//! ```toml
//! data_dir = "/data/globus"
//! baseline = "1900/01/01"
//! table = "values.csv"
//! target_field = "tas"
//!
//! [[variables]]
//! source_id = "solar-vars"
//! field_name = "f107"
//! start_date = "1850/01/01"
//! end_date = "2015/01/01"
//! ```
//!
//! Relative `data_dir` and `table` paths are resolved against the directory
//! containing the configuration file.

use crate::errors::ConfigError;
use climtab_core::dates::{parse_date, DEFAULT_BASELINE};
use climtab_core::table::DAY_FIELD;
use climtab_core::VariableDescriptor;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Where sources live, where the table goes and which variables to ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// Directory holding one sub-directory per source
    pub data_dir: PathBuf,
    /// Global day zero, `%Y/%m/%d`
    pub baseline: String,
    /// Path of the CSV table
    pub table: PathBuf,
    /// Column placed last when the table is reordered
    pub target_field: String,
    /// Variables in processing order
    pub variables: Vec<VariableDescriptor>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            baseline: DEFAULT_BASELINE.to_string(),
            table: PathBuf::from("values.csv"),
            target_field: "tas".to_string(),
            variables: vec![],
        }
    }
}

impl IngestConfig {
    /// Read and validate the configuration at `path`.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        Self::from_toml_str(&text, base_dir).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse configuration text, resolving relative paths against `base_dir`.
    pub fn from_toml_str(text: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let mut config: IngestConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.data_dir = resolve(base_dir, &config.data_dir);
        config.table = resolve(base_dir, &config.table);
        config.validate()?;
        Ok(config)
    }

    /// The baseline as a date.
    pub fn baseline_date(&self) -> Result<NaiveDate, ConfigError> {
        Ok(parse_date(&self.baseline)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.baseline_date()?;
        if self.target_field.is_empty() {
            return Err(ConfigError::Invalid("target_field must not be empty".to_string()));
        }

        let mut columns = HashSet::new();
        for variable in &self.variables {
            if variable.source_id.is_empty() || variable.field_name.is_empty() {
                return Err(ConfigError::Invalid(
                    "every variable needs a source_id and a field_name".to_string(),
                ));
            }
            if variable.column_name().is_empty() || variable.column_name() == DAY_FIELD {
                return Err(ConfigError::Invalid(format!(
                    "{}: column name {:?} is reserved or empty",
                    variable.source_id,
                    variable.column_name()
                )));
            }
            if !columns.insert(variable.column_name()) {
                return Err(ConfigError::DuplicateColumn(variable.column_name().to_string()));
            }
        }
        Ok(())
    }
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}
