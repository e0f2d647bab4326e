//! CSV persistence for [`DayTable`].
//!
//! The header row lists `day` followed by the schema's fields. Each following
//! row holds the integer day offset and one cell per field; an empty cell means
//! the value is absent.
//!
//! [`save`] never leaves a partially written table behind: rows are written to
//! a temporary sibling file which is synced and then renamed over the target.

use crate::errors::{CoreError, CoreResult};
use crate::table::{DayTable, Schema};
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Load the table stored at `path`.
///
/// A missing file or a file without a header row yields an empty table. Rows
/// sharing a day offset are merged cell by cell, later present cells winning.
pub fn load(path: &Path) -> CoreResult<DayTable> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No table yet, starting empty");
            return Ok(DayTable::new());
        }
        Err(e) => return Err(e.into()),
    };
    let table = read_table(file, path)?;
    debug!(
        path = %path.display(),
        rows = table.len(),
        fields = table.schema().len(),
        "Loaded table"
    );
    Ok(table)
}

/// Parse a table from any reader. `path` is only used in error messages.
pub fn read_table<R: Read>(reader: R, path: &Path) -> CoreResult<DayTable> {
    let malformed = |line: u64, reason: String| CoreError::TableRead {
        path: path.to_path_buf(),
        line,
        reason,
    };
    let csv_error = |e: csv::Error| {
        let line = e.position().map(|p| p.line()).unwrap_or(0);
        match e.into_kind() {
            csv::ErrorKind::Io(io) => CoreError::Io(io),
            kind => malformed(line, csv_error_reason(kind)),
        }
    };

    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);

    let header = reader.headers().map_err(csv_error)?.clone();
    if header.is_empty() {
        return Ok(DayTable::new());
    }
    let (schema, day_index) =
        Schema::from_header(header.iter()).map_err(|reason| malformed(1, reason))?;
    let mut table = DayTable::with_schema(schema);

    for row in reader.records() {
        let row = row.map_err(csv_error)?;
        let line = row.position().map(|p| p.line()).unwrap_or(0);

        let mut record = table.schema().default_record();
        let cells = row
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != day_index)
            .map(|(_, raw)| raw);
        for (field, raw) in cells.enumerate() {
            let cell = parse_cell(raw).map_err(|reason| malformed(line, reason))?;
            record.set(field, cell)?;
        }
        let raw_day = row.get(day_index).unwrap_or_default();
        let day = raw_day
            .trim()
            .parse::<i64>()
            .map_err(|_| malformed(line, format!("day {raw_day:?} is not an integer")))?;

        table.upsert_record(day, record)?;
    }
    Ok(table)
}

/// Write `table` to `path`, replacing any previous contents atomically.
pub fn save(table: &DayTable, path: &Path) -> CoreResult<()> {
    let write_error = |source: io::Error| CoreError::TableWrite {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_error)?;
    }

    let tmp_path = temp_path(path);
    let mut guard = TempFileGuard::new(tmp_path.clone());
    {
        let file = File::create(&tmp_path).map_err(write_error)?;
        let mut writer = BufWriter::new(file);
        write_table(table, &mut writer)?;
        let file = writer
            .into_inner()
            .map_err(|e| write_error(e.into_error()))?;
        file.sync_all().map_err(write_error)?;
    }
    fs::rename(&tmp_path, path).map_err(write_error)?;
    guard.disarm();

    debug!(path = %path.display(), rows = table.len(), "Saved table");
    Ok(())
}

/// Serialize `table` as CSV into `writer`.
pub fn write_table<W: Write>(table: &DayTable, writer: W) -> CoreResult<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    let into_io = |e: csv::Error| match e.into_kind() {
        csv::ErrorKind::Io(io) => io,
        kind => io::Error::new(io::ErrorKind::Other, csv_error_reason(kind)),
    };

    csv_writer
        .write_record(table.schema().header())
        .map_err(into_io)?;

    let mut row = Vec::with_capacity(table.schema().len() + 1);
    for (day, record) in table.rows() {
        row.clear();
        row.push(day.to_string());
        row.extend(record.cells().iter().map(|cell| match cell {
            Some(value) => format_value(*value),
            None => String::new(),
        }));
        csv_writer.write_record(&row).map_err(into_io)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Shortest text that parses back to exactly `value`.
pub fn format_value(value: f64) -> String {
    format!("{value:?}")
}

fn parse_cell(raw: &str) -> Result<Option<f64>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<f64>()
        .map(Some)
        .map_err(|_| format!("{raw:?} is not a number"))
}

fn csv_error_reason(kind: csv::ErrorKind) -> String {
    match kind {
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => format!("expected {expected_len} cells, found {len}"),
        csv::ErrorKind::Utf8 { err, .. } => format!("invalid UTF-8: {err}"),
        other => format!("{other:?}"),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "table".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

/// Removes a temporary file on drop unless disarmed after a successful rename.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::DayValues;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn parse(text: &str) -> CoreResult<DayTable> {
        read_table(text.as_bytes(), Path::new("values.csv"))
    }

    fn triples(table: &DayTable) -> BTreeSet<(i64, String, u64)> {
        table
            .cells()
            .map(|(day, field, value)| (day, field.to_string(), value.to_bits()))
            .collect()
    }

    fn render(table: &DayTable) -> String {
        let mut out = Vec::new();
        write_table(table, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn missing_and_empty_files_are_empty_tables() {
        let dir = TempDir::new().unwrap();
        let missing = load(&dir.path().join("values.csv")).unwrap();
        assert!(missing.is_empty());
        assert!(missing.schema().is_empty());

        let empty = dir.path().join("empty.csv");
        fs::write(&empty, "").unwrap();
        let table = load(&empty).unwrap();
        assert!(table.is_empty());
        assert!(table.schema().is_empty());
    }

    #[test]
    fn header_only_keeps_schema() {
        let table = parse("tas,day,huss\n").unwrap();
        assert!(table.is_empty());
        assert_eq!(table.schema().fields(), ["tas", "huss"]);
    }

    #[test]
    fn absent_cells_are_distinct_from_zero() {
        let table = parse("day,tas,huss\n0,0,\n1,,0.5\n").unwrap();
        assert_eq!(table.value(0, "tas"), Some(0.0));
        assert_eq!(table.value(0, "huss"), None);
        assert_eq!(table.value(1, "tas"), None);
        assert_eq!(render(&table), "day,tas,huss\n0,0.0,\n1,,0.5\n");
    }

    #[test]
    fn malformed_input() {
        let cases = [
            ("tas,huss\n1,2\n", 1),
            ("day,tas,tas\n", 1),
            ("day,tas\n0,1\nx,2\n", 3),
            ("day,tas\n0,abc\n", 2),
            ("day,tas\n0,1,2\n", 2),
        ];
        for (text, expected_line) in cases {
            match parse(text) {
                Err(CoreError::TableRead { line, .. }) => {
                    assert_eq!(line, expected_line, "input {text:?}")
                }
                other => panic!("expected TableRead for {text:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn duplicate_days_merge_cells() {
        let table = parse("day,a,b\n5,1,\n5,,2\n5,3,\n").unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.value(5, "a"), Some(3.0));
        assert_eq!(table.value(5, "b"), Some(2.0));
    }

    #[test]
    fn save_then_load_preserves_every_cell() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("values.csv");

        let mut table = DayTable::new();
        table
            .merge_column("tas", &DayValues::from([(-18262, 287.123456789), (3, 1e-12)]))
            .unwrap();
        table
            .merge_column("f107", &DayValues::from([(3, 70.5), (42002, -0.0), (7, 1e300)]))
            .unwrap();
        table.add_field("unused").unwrap();

        save(&table, &path).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(triples(&loaded), triples(&table));
        assert_eq!(loaded.schema(), table.schema());
        assert_eq!(loaded.days().collect::<Vec<_>>(), table.days().collect::<Vec<_>>());
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn save_replaces_previous_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("values.csv");
        fs::write(&path, "day,old\n1,1\n2,2\n3,3\n").unwrap();

        let mut table = DayTable::new();
        table.set_value(9, "new", Some(1.5)).unwrap();
        save(&table, &path).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "day,new\n9,1.5\n");
    }

    #[test]
    fn field_names_needing_quotes_round_trip() {
        let mut table = DayTable::new();
        table.set_value(1, "Emissions|CO2, fossil", Some(2.0)).unwrap();
        table.set_value(1, "say \"hi\"", None).unwrap();
        let text = render(&table);
        let loaded = parse(&text).unwrap();
        assert_eq!(loaded.schema(), table.schema());
        assert_eq!(loaded.value(1, "Emissions|CO2, fossil"), Some(2.0));
    }

    #[test]
    fn values_from_other_writers_parse() {
        let table = parse("day,a,b,c\n1,3.0,nan,1E-3\n").unwrap();
        assert_eq!(table.value(1, "a"), Some(3.0));
        assert!(table.value(1, "b").unwrap().is_nan());
        assert_eq!(table.value(1, "c"), Some(0.001));
    }
}
