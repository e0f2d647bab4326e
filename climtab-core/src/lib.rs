//! Core of climtab: calendar arithmetic, per-variable daily aggregation and the
//! day-indexed table that aggregated variables are merged into.
//!
//! Reading concrete array files lives in `climtab-sources`; this crate only
//! depends on the [`source::SourceReader`] seam.

pub mod aggregate;
pub mod dates;
pub mod errors;
pub mod maintenance;
pub mod persist;
pub mod source;
pub mod table;
pub mod variable;

pub use aggregate::{Aggregator, DayValues};
pub use errors::{CoreError, CoreResult};
pub use table::{DayTable, Schema};
pub use variable::{GridMask, VariableDescriptor};
