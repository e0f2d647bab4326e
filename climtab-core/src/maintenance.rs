//! Whole-table maintenance: ordering, filtering and min–max scaling.
//!
//! These operate on a loaded [`DayTable`]; callers load, apply and save.
//! Normalization returns the [`MinMax`] range of every column so that model
//! output can later be mapped back with [`denormalize`].

use crate::dates::offset_to_date;
use crate::errors::{CoreError, CoreResult};
use crate::table::DayTable;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

/// Value range of one column, recorded before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMax {
    pub min: f64,
    pub max: f64,
}

impl MinMax {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Map `value` into `[0, 1]` relative to this range.
    pub fn normalize(&self, value: f64) -> f64 {
        (value - self.min) / self.span()
    }

    /// Inverse of [`MinMax::normalize`].
    pub fn denormalize(&self, value: f64) -> f64 {
        value * self.span() + self.min
    }
}

/// Map a normalized value back to its original scale.
pub fn denormalize(value: f64, range: MinMax) -> f64 {
    range.denormalize(value)
}

/// Put rows in ascending day order.
pub fn sort_by_day(table: &mut DayTable) {
    table.sort_rows_by_day();
}

/// Move `target` (if present) to the last column.
///
/// The day column always leads; the remaining fields keep their relative order.
pub fn reorder_columns(table: &mut DayTable, target: Option<&str>) {
    let fields = table.schema().fields();
    let target_index = target.and_then(|t| table.schema().position(t));
    let mut order: Vec<usize> = (0..fields.len())
        .filter(|i| Some(*i) != target_index)
        .collect();
    order.extend(target_index);
    table.permute_fields(&order);
}

/// Remove rows with at least one absent cell; returns the number removed.
pub fn drop_incomplete_rows(table: &mut DayTable) -> usize {
    let removed = table.retain_rows(|record| record.is_complete());
    info!(removed, remaining = table.len(), "Dropped incomplete rows");
    removed
}

/// Remove rows whose every value cell is absent; returns the number removed.
pub fn drop_blank_rows(table: &mut DayTable) -> usize {
    let removed = table.retain_rows(|record| !record.is_blank());
    info!(removed, remaining = table.len(), "Dropped blank rows");
    removed
}

/// Remove the named columns. Fails without changes if any is unknown.
pub fn drop_columns<S: AsRef<str>>(table: &mut DayTable, fields: &[S]) -> CoreResult<()> {
    let indices = fields
        .iter()
        .map(|field| {
            let field = field.as_ref();
            table
                .schema()
                .position(field)
                .ok_or_else(|| CoreError::UnknownField(field.to_string()))
        })
        .collect::<CoreResult<HashSet<_>>>()?;
    table.remove_fields(&indices);
    Ok(())
}

/// Calendar date of every row, in ascending day order.
pub fn row_dates(table: &DayTable, baseline: &str, format: &str) -> CoreResult<Vec<(i64, String)>> {
    let mut days: Vec<i64> = table.days().collect();
    days.sort_unstable();
    days.into_iter()
        .map(|day| -> CoreResult<(i64, String)> {
            Ok((day, offset_to_date(day as f64, baseline, format)?))
        })
        .collect()
}

/// Smallest and largest present value of `field`.
pub fn column_range(table: &DayTable, field: &str) -> CoreResult<MinMax> {
    table
        .column(field)?
        .into_iter()
        .flatten()
        .fold(None, |range: Option<MinMax>, v| {
            Some(match range {
                None => MinMax::new(v, v),
                Some(r) => MinMax::new(r.min.min(v), r.max.max(v)),
            })
        })
        .ok_or_else(|| CoreError::EmptyColumn {
            field: field.to_string(),
        })
}

/// Rescale every value column to `[0, 1]` with `(v - min) / (max - min)`.
///
/// Every row must be complete; run [`drop_incomplete_rows`] first. Ranges are
/// computed for all columns before anything is modified, so a failure leaves
/// the table untouched. Returns the range used for each column.
pub fn normalize(table: &mut DayTable) -> CoreResult<BTreeMap<String, MinMax>> {
    let incomplete = table.rows().filter(|(_, r)| !r.is_complete()).count();
    if incomplete > 0 {
        warn!(incomplete, "Refusing to normalize a table with absent cells");
        return Err(CoreError::IncompleteRows { count: incomplete });
    }
    if table.is_empty() {
        return Ok(BTreeMap::new());
    }

    let mut ranges = Vec::with_capacity(table.schema().len());
    for field in table.schema().fields() {
        let range = column_range(table, field)?;
        if range.span() == 0.0 || !range.span().is_finite() {
            return Err(CoreError::DegenerateRange {
                field: field.clone(),
            });
        }
        ranges.push((field.clone(), range));
    }

    for (index, (_, range)) in ranges.iter().enumerate() {
        let range = *range;
        table.map_column(index, move |v| range.normalize(v));
    }
    Ok(ranges.into_iter().collect())
}
