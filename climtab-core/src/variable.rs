//! Variable descriptors.
//!
//! A [`VariableDescriptor`] names one source directory and the field to extract
//! from it, together with the calendar information needed to place its records
//! on the table's global time axis.

use crate::dates::{self, serde_date};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How masked or missing cells are treated when a gridded record is averaged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GridMask {
    /// Plain arithmetic mean over every cell. NaN cells propagate into the result.
    #[default]
    IncludeAll,
    /// Exclude NaN cells and cells equal to the file's declared fill value.
    ///
    /// Records with no valid cells are dropped before grouping.
    SkipMissing,
}

impl fmt::Display for GridMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridMask::IncludeAll => write!(f, "include-all"),
            GridMask::SkipMissing => write!(f, "skip-missing"),
        }
    }
}

/// One variable to ingest: a source directory plus the field read from it.
///
/// # Example
///
/// ```rust
/// use climtab_core::dates::parse_date;
/// use climtab_core::variable::VariableDescriptor;
///
/// let f107 = VariableDescriptor::new("solar-vars", "f107", false, parse_date("1850/01/01").unwrap())
///     .with_end_date(parse_date("2015/01/01").unwrap());
///
/// let baseline = parse_date("1900/01/01").unwrap();
/// assert_eq!(f107.day_offset(baseline), -18262);
/// assert_eq!(f107.end_offset(), Some(60265));
/// assert_eq!(f107.column_name(), "f107");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDescriptor {
    /// Directory (relative to the data root) holding the variable's files
    pub source_id: String,
    /// Field read from each file
    pub field_name: String,
    /// Whether each record is a spatial array that must be averaged
    #[serde(default)]
    pub is_gridded: bool,
    /// Day zero of the source files' time axis
    #[serde(with = "serde_date")]
    pub start_date: NaiveDate,
    /// Exclusive cutoff; days on or after it are cropped (e.g. projections)
    #[serde(default, with = "serde_date::option")]
    pub end_date: Option<NaiveDate>,
    /// Hard cap on the number of distinct days retained
    #[serde(default)]
    pub max_days: Option<usize>,
    /// Column written to the table, defaults to `field_name`
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub grid_mask: GridMask,
}

impl VariableDescriptor {
    pub fn new(
        source_id: impl Into<String>,
        field_name: impl Into<String>,
        is_gridded: bool,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            field_name: field_name.into(),
            is_gridded,
            start_date,
            end_date: None,
            max_days: None,
            display_name: None,
            grid_mask: GridMask::default(),
        }
    }

    pub fn with_end_date(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }

    pub fn with_max_days(mut self, max_days: usize) -> Self {
        self.max_days = Some(max_days);
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn with_grid_mask(mut self, grid_mask: GridMask) -> Self {
        self.grid_mask = grid_mask;
        self
    }

    /// Name of the table column populated by this variable.
    pub fn column_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.field_name)
    }

    /// Shift that re-expresses the variable's own day numbers against `baseline`.
    pub fn day_offset(&self, baseline: NaiveDate) -> i64 {
        dates::days_between(baseline, self.start_date)
    }

    /// Cutoff in the variable's own day numbers, if an end date is set.
    pub fn end_offset(&self) -> Option<i64> {
        self.end_date
            .map(|end| dates::days_between(self.start_date, end))
    }
}
