//! # climtab
//!
//! Builds a single day-indexed CSV table out of climate variables stored as
//! chunked array files, one directory per source. Each configured variable is
//! averaged to one value per day, shifted onto a shared baseline date and merged
//! into the table as its own column.
//!
//! The heavy lifting lives in `climtab-core`; this crate adds the TOML
//! configuration, the run loop and the command-line interface.

pub mod cli;
pub mod config;
pub mod errors;
pub mod pipeline;

pub use config::IngestConfig;
pub use errors::{ConfigError, IngestError, IngestResult};
pub use pipeline::{ingest, process_var, run_all, IngestReport};
