//! Source readers for climtab.
//!
//! [`JsonArrayDirectory`] reads one directory per source, each holding a
//! chunk of the series per JSON array file.

pub mod json_array;

pub use json_array::{ArrayFile, JsonArrayDirectory};
