use std::path::PathBuf;
use thiserror::Error;

/// Error type for ingestion, merge and maintenance operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid date {value:?}, expected format {expected}")]
    InvalidDateFormat { value: String, expected: String },
    #[error("Offset of {offset} days from {baseline} is outside the supported calendar range")]
    DateOutOfRange { baseline: String, offset: f64 },
    #[error("Could not read {file} for source {source_id}: {reason}")]
    SourceRead {
        source_id: String,
        file: String,
        reason: String,
    },
    #[error("Malformed table {} at line {line}: {reason}", path.display())]
    TableRead {
        path: PathBuf,
        line: u64,
        reason: String,
    },
    #[error("Could not write table {}", path.display())]
    TableWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Field {0:?} is not part of the table schema")]
    UnknownField(String),
    #[error("{0:?} cannot be used as a value field name")]
    InvalidFieldName(String),
    #[error("Record has {found} cells but the schema has {expected} fields")]
    SchemaMismatch { expected: usize, found: usize },
    #[error("Field {field:?} has no values")]
    EmptyColumn { field: String },
    #[error("Normalization requires complete rows, found {count} row(s) with absent cells")]
    IncompleteRows { count: usize },
    #[error("Field {field:?} has a zero value range and cannot be normalized")]
    DegenerateRange { field: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Whether the error only affects the variable being aggregated.
    ///
    /// Everything else invalidates the run as a whole.
    pub fn is_variable_local(&self) -> bool {
        matches!(self, CoreError::SourceRead { .. })
    }

    pub fn source_read(
        source_id: impl Into<String>,
        file: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        CoreError::SourceRead {
            source_id: source_id.into(),
            file: file.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience type for `Result<T, CoreError>`.
pub type CoreResult<T> = Result<T, CoreError>;
