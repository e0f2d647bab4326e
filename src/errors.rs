use climtab_core::CoreError;
use std::path::PathBuf;
use thiserror::Error;

/// Problems with the run configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not read config {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid config: {0}")]
    Invalid(String),
    #[error("Column {0:?} is produced by more than one variable")]
    DuplicateColumn(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Error aborting an ingestion run.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type IngestResult<T> = Result<T, IngestError>;
