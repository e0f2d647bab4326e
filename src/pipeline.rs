//! Ingestion runs: aggregate each configured variable and merge it into the table.
//!
//! Every variable is a separate load → merge → save cycle, so an interrupted run
//! leaves the table as of the last variable that completed.

use crate::config::IngestConfig;
use crate::errors::IngestResult;
use climtab_core::dates::{format_date, offset_to_date, shift_date};
use climtab_core::maintenance::{reorder_columns, sort_by_day};
use climtab_core::persist::{load, save};
use climtab_core::source::SourceReader;
use climtab_core::table::MergeStats;
use climtab_core::{Aggregator, CoreError, CoreResult, VariableDescriptor};
use climtab_sources::JsonArrayDirectory;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// What happened to one variable during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VariableStatus {
    Merged {
        days: usize,
        new_days: usize,
    },
    /// The variable's sources could not be read; the table was left untouched.
    Skipped {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableReport {
    pub column: String,
    #[serde(flatten)]
    pub status: VariableStatus,
}

/// Summary of [`run_all`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub variables: Vec<VariableReport>,
    /// Rows in the table after the run
    pub rows: usize,
}

impl IngestReport {
    pub fn merged(&self) -> impl Iterator<Item = &VariableReport> {
        self.variables
            .iter()
            .filter(|v| matches!(v.status, VariableStatus::Merged { .. }))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &VariableReport> {
        self.variables
            .iter()
            .filter(|v| matches!(v.status, VariableStatus::Skipped { .. }))
    }

    /// True when no variable was skipped.
    pub fn is_complete(&self) -> bool {
        self.skipped().next().is_none()
    }
}

/// Aggregate one variable and merge it into the table at `table_path`.
///
/// The table is only loaded once aggregation has succeeded, and is saved as soon
/// as the merge is done.
pub fn process_var<R: SourceReader>(
    aggregator: &Aggregator<R>,
    table_path: &Path,
    variable: &VariableDescriptor,
) -> CoreResult<MergeStats> {
    let values = aggregator.aggregate(variable)?;

    let mut table = load(table_path)?;
    let stats = table.merge_column(variable.column_name(), &values)?;
    save(&table, table_path)?;

    info!(
        variable = variable.column_name(),
        days = values.len(),
        new_days = stats.new_days,
        rows = table.len(),
        "Merged variable"
    );
    Ok(stats)
}

/// Process every configured variable, then sort the table by day and move the
/// target field last.
///
/// Variables whose sources cannot be read are skipped and reported; any other
/// error aborts the run. No table file is created when nothing was merged.
pub fn run_all<R: SourceReader>(config: &IngestConfig, reader: R) -> IngestResult<IngestReport> {
    let aggregator = Aggregator::new(reader, config.baseline_date()?);
    let mut report = IngestReport::default();
    let existed = config.table.exists();

    for variable in &config.variables {
        let status = match process_var(&aggregator, &config.table, variable) {
            Ok(stats) => VariableStatus::Merged {
                days: stats.new_days + stats.updated_days,
                new_days: stats.new_days,
            },
            Err(e) if e.is_variable_local() => {
                warn!(variable = variable.column_name(), error = %e, "Skipping variable");
                VariableStatus::Skipped {
                    reason: e.to_string(),
                }
            }
            Err(e) => return Err(e.into()),
        };
        report.variables.push(VariableReport {
            column: variable.column_name().to_string(),
            status,
        });
    }

    if existed || report.merged().next().is_some() {
        let mut table = load(&config.table)?;
        sort_by_day(&mut table);
        reorder_columns(&mut table, Some(&config.target_field));
        save(&table, &config.table)?;
        report.rows = table.len();
    }

    info!(
        merged = report.merged().count(),
        skipped = report.skipped().count(),
        rows = report.rows,
        "Ingestion finished"
    );
    Ok(report)
}

/// [`run_all`] reading array files under the configured data directory.
pub fn ingest(config: &IngestConfig) -> IngestResult<IngestReport> {
    run_all(config, JsonArrayDirectory::new(&config.data_dir))
}

/// Dates covered by one source, in its own calendar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRange {
    pub source_id: String,
    /// Date of the first record of the first file
    pub first: String,
    /// Date of the last record of the last file
    pub last: String,
    /// Last day kept when the variable has an end date
    pub crop: Option<String>,
}

/// First and last dates found in `variable`'s source files.
pub fn date_range<R: SourceReader>(
    reader: &R,
    variable: &VariableDescriptor,
    format: &str,
) -> CoreResult<SourceRange> {
    let source_id = &variable.source_id;
    let files = reader.list_files(source_id)?;
    let (Some(first_file), Some(last_file)) = (files.first(), files.last()) else {
        return Err(CoreError::source_read(source_id, source_id, "no files"));
    };

    let first_time = reader.read_time_axis(source_id, first_file)?.first().copied();
    let last_time = reader.read_time_axis(source_id, last_file)?.last().copied();
    let (Some(first_time), Some(last_time)) = (first_time, last_time) else {
        return Err(CoreError::source_read(source_id, first_file, "empty time axis"));
    };

    let start = format_date(variable.start_date);
    let crop = variable
        .end_date
        .map(|end| shift_date(end, -1).map(format_date))
        .transpose()?;

    Ok(SourceRange {
        source_id: source_id.clone(),
        first: offset_to_date(first_time, &start, format)?,
        last: offset_to_date(last_time, &start, format)?,
        crop,
    })
}

/// [`date_range`] for each distinct source, using its first configured variable.
pub fn source_ranges<R: SourceReader>(
    config: &IngestConfig,
    reader: &R,
    format: &str,
) -> Vec<(String, CoreResult<SourceRange>)> {
    let mut seen = HashSet::new();
    config
        .variables
        .iter()
        .filter(|v| seen.insert(v.source_id.as_str()))
        .map(|v| (v.source_id.clone(), date_range(reader, v, format)))
        .collect()
}
