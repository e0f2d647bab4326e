//! In-memory day-indexed table.
//!
//! A [`DayTable`] maps day offsets to [`DayRecord`]s. The set of value fields is
//! held by the table's [`Schema`], and every record carries exactly one cell per
//! schema field. New records only come from [`Schema::default_record`] and new
//! fields widen every existing record, so the table is always rectangular and an
//! absent cell (`None`) is never confused with `0.0`.
//!
//! The `"day"` key column ([`DAY_FIELD`]) is implicit: it is not part of the
//! schema's value fields but always leads the header on disk.
//!
//! ```rust
//! use climtab_core::aggregate::DayValues;
//! use climtab_core::table::DayTable;
//!
//! let mut table = DayTable::new();
//! table.merge_column("tas", &DayValues::from([(0, 287.1), (1, 287.4)])).unwrap();
//! table.merge_column("huss", &DayValues::from([(1, 0.01)])).unwrap();
//!
//! assert_eq!(table.len(), 2);
//! assert_eq!(table.value(0, "tas"), Some(287.1));
//! assert_eq!(table.value(0, "huss"), None);
//! ```

use crate::aggregate::DayValues;
use crate::errors::{CoreError, CoreResult};
use indexmap::IndexMap;
use std::collections::HashSet;

/// Name of the key column.
pub const DAY_FIELD: &str = "day";

/// Ordered set of value field names known to a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<String>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a schema from a header row, which must contain [`DAY_FIELD`] once.
    ///
    /// Returns the position of the day column within `header` alongside the schema.
    pub fn from_header<'a>(header: impl IntoIterator<Item = &'a str>) -> Result<(Self, usize), String> {
        let mut schema = Schema::new();
        let mut day_index = None;
        let mut seen = HashSet::new();

        for (index, name) in header.into_iter().enumerate() {
            if name.is_empty() {
                return Err(format!("column {} has an empty name", index + 1));
            }
            if !seen.insert(name) {
                return Err(format!("column {name:?} appears more than once"));
            }
            if name == DAY_FIELD {
                day_index = Some(index);
            } else {
                schema.fields.push(name.to_string());
            }
        }

        let day_index = day_index.ok_or_else(|| format!("missing {DAY_FIELD:?} column"))?;
        Ok((schema, day_index))
    }

    /// Value fields, in column order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.position(field).is_some()
    }

    pub fn position(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == field)
    }

    /// Column names as written to disk: the day column followed by every field.
    pub fn header(&self) -> impl Iterator<Item = &str> {
        std::iter::once(DAY_FIELD).chain(self.fields.iter().map(String::as_str))
    }

    /// A record with every field of this schema absent.
    pub fn default_record(&self) -> DayRecord {
        DayRecord {
            cells: vec![None; self.fields.len()],
        }
    }

    fn push(&mut self, field: &str) -> CoreResult<usize> {
        if field.is_empty() || field == DAY_FIELD {
            return Err(CoreError::InvalidFieldName(field.to_string()));
        }
        self.fields.push(field.to_string());
        Ok(self.fields.len() - 1)
    }
}

/// Values of one day, one cell per schema field.
#[derive(Debug, Clone, PartialEq)]
pub struct DayRecord {
    cells: Vec<Option<f64>>,
}

impl DayRecord {
    pub fn cells(&self) -> &[Option<f64>] {
        &self.cells
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.cells.get(index).copied().flatten()
    }

    /// Set the cell at column `index`.
    pub fn set(&mut self, index: usize, value: Option<f64>) -> CoreResult<()> {
        let expected = self.cells.len();
        let cell = self.cells.get_mut(index).ok_or(CoreError::SchemaMismatch {
            expected,
            found: index + 1,
        })?;
        *cell = value;
        Ok(())
    }

    /// True when no cell is absent.
    pub fn is_complete(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// True when every cell is absent.
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }

    /// Overlay the present cells of `other`, keeping ours where `other` is absent.
    fn overlay(&mut self, other: &DayRecord) {
        for (cell, incoming) in self.cells.iter_mut().zip(&other.cells) {
            if incoming.is_some() {
                *cell = *incoming;
            }
        }
    }
}

/// Counts reported by [`DayTable::merge_column`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Whether the column was new to the schema
    pub new_field: bool,
    /// Days that did not exist in the table before
    pub new_days: usize,
    /// Days that already existed and had their cell set
    pub updated_days: usize,
}

/// Day offset → record table with an explicit schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayTable {
    schema: Schema,
    rows: IndexMap<i64, DayRecord>,
}

impl DayTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty table with the given schema.
    pub fn with_schema(schema: Schema) -> Self {
        Self {
            schema,
            rows: IndexMap::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Day offsets in row order.
    pub fn days(&self) -> impl Iterator<Item = i64> + '_ {
        self.rows.keys().copied()
    }

    /// Rows in order.
    pub fn rows(&self) -> impl Iterator<Item = (i64, &DayRecord)> {
        self.rows.iter().map(|(day, record)| (*day, record))
    }

    pub fn record(&self, day: i64) -> Option<&DayRecord> {
        self.rows.get(&day)
    }

    /// Value of `field` on `day`, `None` when the row, field or cell is absent.
    pub fn value(&self, day: i64, field: &str) -> Option<f64> {
        let index = self.schema.position(field)?;
        self.rows.get(&day).and_then(|record| record.get(index))
    }

    /// Every present cell as `(day, field, value)`, in row then column order.
    pub fn cells(&self) -> impl Iterator<Item = (i64, &str, f64)> {
        self.rows.iter().flat_map(move |(day, record)| {
            self.schema
                .fields
                .iter()
                .zip(&record.cells)
                .filter_map(move |(field, cell)| cell.map(|v| (*day, field.as_str(), v)))
        })
    }

    /// Register `field` if it is new, widening every row with an absent cell.
    ///
    /// Returns the field's column index.
    pub fn add_field(&mut self, field: &str) -> CoreResult<usize> {
        if let Some(index) = self.schema.position(field) {
            return Ok(index);
        }
        let index = self.schema.push(field)?;
        for record in self.rows.values_mut() {
            record.cells.push(None);
        }
        Ok(index)
    }

    /// Set a single cell, creating the row when the day is new.
    pub fn set_value(&mut self, day: i64, field: &str, value: Option<f64>) -> CoreResult<()> {
        let index = self.add_field(field)?;
        let schema = &self.schema;
        self.rows
            .entry(day)
            .or_insert_with(|| schema.default_record())
            .cells[index] = value;
        Ok(())
    }

    /// Insert a full record, merging cell by cell with an existing row for `day`.
    ///
    /// The record must have been built for this table's schema.
    pub fn upsert_record(&mut self, day: i64, record: DayRecord) -> CoreResult<()> {
        if record.cells.len() != self.schema.len() {
            return Err(CoreError::SchemaMismatch {
                expected: self.schema.len(),
                found: record.cells.len(),
            });
        }
        match self.rows.get_mut(&day) {
            Some(existing) => existing.overlay(&record),
            None => {
                self.rows.insert(day, record);
            }
        }
        Ok(())
    }

    /// Overlay one variable's values as column `column`.
    ///
    /// Rows missing from `day_values` are untouched; days new to the table get
    /// a default record first. Merging the same values twice is a no-op.
    pub fn merge_column(&mut self, column: &str, day_values: &DayValues) -> CoreResult<MergeStats> {
        let new_field = !self.schema.contains(column);
        let index = self.add_field(column)?;
        let mut stats = MergeStats {
            new_field,
            ..Default::default()
        };

        for (&day, &value) in day_values {
            match self.rows.get_mut(&day) {
                Some(record) => {
                    record.cells[index] = Some(value);
                    stats.updated_days += 1;
                }
                None => {
                    let mut record = self.schema.default_record();
                    record.cells[index] = Some(value);
                    self.rows.insert(day, record);
                    stats.new_days += 1;
                }
            }
        }
        Ok(stats)
    }

    /// All cells of `field` in row order.
    pub fn column(&self, field: &str) -> CoreResult<Vec<Option<f64>>> {
        let index = self
            .schema
            .position(field)
            .ok_or_else(|| CoreError::UnknownField(field.to_string()))?;
        Ok(self.rows.values().map(|record| record.cells[index]).collect())
    }

    pub(crate) fn sort_rows_by_day(&mut self) {
        self.rows.sort_keys();
    }

    /// Keep rows for which `keep` returns true; returns how many were removed.
    pub(crate) fn retain_rows(&mut self, mut keep: impl FnMut(&DayRecord) -> bool) -> usize {
        let before = self.rows.len();
        self.rows.retain(|_, record| keep(record));
        before - self.rows.len()
    }

    /// Rearrange columns to `order`, which must be a permutation of the fields.
    pub(crate) fn permute_fields(&mut self, order: &[usize]) {
        debug_assert_eq!(order.len(), self.schema.len());
        self.schema.fields = order.iter().map(|&i| self.schema.fields[i].clone()).collect();
        for record in self.rows.values_mut() {
            record.cells = order.iter().map(|&i| record.cells[i]).collect();
        }
    }

    /// Drop the columns at `indices`.
    pub(crate) fn remove_fields(&mut self, indices: &HashSet<usize>) {
        let keep = |i: &usize| !indices.contains(i);
        self.schema.fields = (0..self.schema.len())
            .filter(keep)
            .map(|i| self.schema.fields[i].clone())
            .collect();
        for record in self.rows.values_mut() {
            record.cells = (0..record.cells.len())
                .filter(keep)
                .map(|i| record.cells[i])
                .collect();
        }
    }

    /// Apply `f` to every present cell of column `index`.
    pub(crate) fn map_column(&mut self, index: usize, f: impl Fn(f64) -> f64) {
        for record in self.rows.values_mut() {
            if let Some(cell) = record.cells[index].as_mut() {
                *cell = f(*cell);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn triples(table: &DayTable) -> BTreeSet<(i64, String, u64)> {
        table
            .cells()
            .map(|(day, field, value)| (day, field.to_string(), value.to_bits()))
            .collect()
    }

    fn ten_day_tas() -> DayTable {
        let mut table = DayTable::new();
        let tas: DayValues = (0..10).map(|d| (d, 280.0 + d as f64)).collect();
        table.merge_column("tas", &tas).unwrap();
        table
    }

    #[test]
    fn header_parsing() {
        let (schema, day_index) = Schema::from_header(["tas", "day", "huss"]).unwrap();
        assert_eq!(schema.fields(), ["tas", "huss"]);
        assert_eq!(day_index, 1);
        assert_eq!(schema.header().collect::<Vec<_>>(), ["day", "tas", "huss"]);

        assert!(Schema::from_header(["tas", "huss"]).unwrap_err().contains("day"));
        assert!(Schema::from_header(["day", "tas", "tas"]).is_err());
        assert!(Schema::from_header(["day", ""]).is_err());
        assert!(Schema::from_header(["day", "day"]).is_err());
    }

    #[test]
    fn default_record_matches_schema() {
        let (schema, _) = Schema::from_header(["day", "a", "b", "c"]).unwrap();
        let record = schema.default_record();
        assert_eq!(record.cells(), [None, None, None]);
        assert!(record.is_blank());
        assert!(!record.is_complete());
    }

    #[test]
    fn merging_a_new_column_keeps_existing_values() {
        let mut table = ten_day_tas();
        let huss = DayValues::from([(2, 0.01), (3, 0.02), (15, 0.03)]);
        let stats = table.merge_column("huss", &huss).unwrap();

        assert_eq!(
            stats,
            MergeStats {
                new_field: true,
                new_days: 1,
                updated_days: 2
            }
        );
        assert_eq!(table.len(), 11);
        for day in 0..10 {
            assert_eq!(table.value(day, "tas"), Some(280.0 + day as f64));
        }
        assert_eq!(table.value(0, "huss"), None);
        assert_eq!(table.value(2, "huss"), Some(0.01));
        assert_eq!(table.value(15, "huss"), Some(0.03));
        assert_eq!(table.value(15, "tas"), None);
        assert!(table.rows().all(|(_, r)| r.cells().len() == 2));
    }

    #[test]
    fn merge_is_idempotent() {
        let mut once = ten_day_tas();
        let huss = DayValues::from([(2, 0.01), (30, 0.5)]);
        once.merge_column("huss", &huss).unwrap();

        let mut twice = once.clone();
        let stats = twice.merge_column("huss", &huss).unwrap();
        assert_eq!(once, twice);
        assert!(!stats.new_field);
        assert_eq!(stats.new_days, 0);
    }

    #[test]
    fn remerging_a_column_overwrites_only_given_days() {
        let mut table = ten_day_tas();
        table
            .merge_column("tas", &DayValues::from([(4, 1.0)]))
            .unwrap();
        assert_eq!(table.value(4, "tas"), Some(1.0));
        assert_eq!(table.value(5, "tas"), Some(285.0));
    }

    #[test]
    fn day_is_not_a_value_field() {
        let mut table = DayTable::new();
        assert!(matches!(
            table.merge_column("day", &DayValues::from([(0, 1.0)])),
            Err(CoreError::InvalidFieldName(_))
        ));
        assert!(table.schema().is_empty());
    }

    #[test]
    fn upsert_merges_cells() {
        let mut table = DayTable::new();
        table.set_value(0, "a", Some(1.0)).unwrap();
        table.add_field("b").unwrap();

        let mut record = table.schema().default_record();
        record.cells = vec![None, Some(2.0)];
        table.upsert_record(0, record).unwrap();

        assert_eq!(table.value(0, "a"), Some(1.0));
        assert_eq!(table.value(0, "b"), Some(2.0));
        assert_eq!(triples(&table).len(), 2);

        let short = DayRecord { cells: vec![None] };
        assert!(matches!(
            table.upsert_record(1, short),
            Err(CoreError::SchemaMismatch { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn field_rearrangement() {
        let mut table = DayTable::new();
        table.set_value(0, "a", Some(1.0)).unwrap();
        table.set_value(0, "b", Some(2.0)).unwrap();
        table.set_value(0, "c", None).unwrap();
        let before = triples(&table);

        table.permute_fields(&[2, 0, 1]);
        assert_eq!(table.schema().fields(), ["c", "a", "b"]);
        assert_eq!(triples(&table), before);

        table.remove_fields(&HashSet::from([1]));
        assert_eq!(table.schema().fields(), ["c", "b"]);
        assert_eq!(table.value(0, "b"), Some(2.0));
        assert_eq!(table.value(0, "a"), None);
    }
}
