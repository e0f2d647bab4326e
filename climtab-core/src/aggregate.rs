//! Reduction of a variable's source files to one value per day.
//!
//! For every file of a variable the [`Aggregator`]:
//!
//! 1. reduces each record to a scalar (spatial mean for gridded fields),
//! 2. truncates the record's time to an integer day in the variable's own calendar,
//! 3. averages contiguous runs of records that share a day,
//! 4. drops days at or past the variable's cutoff,
//! 5. stores the day's value re-expressed against the global baseline.
//!
//! A day seen again later (in the same file after a gap, or in a later file)
//! overwrites the earlier value. When `max_days` is set, aggregation of the
//! whole variable stops as soon as that many distinct days are held.

use crate::errors::{CoreError, CoreResult};
use crate::source::{SourceReader, SourceSeries};
use crate::variable::{GridMask, VariableDescriptor};
use chrono::NaiveDate;
use ndarray::Axis;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Aggregated values of one variable keyed by global day offset.
pub type DayValues = BTreeMap<i64, f64>;

/// One record reduced to a scalar and placed on an integer day.
///
/// `value` is `None` when every cell of the record was masked.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ReducedRecord {
    day: i64,
    value: Option<f64>,
}

/// Aggregates variables read through a [`SourceReader`].
#[derive(Debug)]
pub struct Aggregator<R> {
    reader: R,
    baseline: NaiveDate,
}

impl<R: SourceReader> Aggregator<R> {
    /// `baseline` is the global day zero that the resulting keys are relative to.
    pub fn new(reader: R, baseline: NaiveDate) -> Self {
        Self { reader, baseline }
    }

    pub fn baseline(&self) -> NaiveDate {
        self.baseline
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Reduce every file of `variable` to a day → value mapping.
    ///
    /// Fails with [`CoreError::SourceRead`] on the first unreadable or
    /// malformed file; nothing aggregated so far is returned in that case.
    pub fn aggregate(&self, variable: &VariableDescriptor) -> CoreResult<DayValues> {
        let day_offset = variable.day_offset(self.baseline);
        let end_offset = variable.end_offset();
        let mut values = DayValues::new();

        if variable.max_days == Some(0) {
            return Ok(values);
        }

        let files = self.reader.list_files(&variable.source_id)?;
        info!(
            source = %variable.source_id,
            variable = %variable.field_name,
            files = files.len(),
            day_offset,
            "Aggregating variable"
        );

        'files: for file in &files {
            let series =
                self.reader
                    .read_series(&variable.source_id, file, &variable.field_name)?;
            let records = reduce_records(&series, variable)
                .map_err(|reason| CoreError::source_read(&variable.source_id, file, reason))?;
            debug!(file = %file, records = records.len(), "Read source file");

            for group in records.chunk_by(|a, b| a.day == b.day) {
                let day = group[0].day;
                if end_offset.is_some_and(|end| day >= end) {
                    continue;
                }
                let Some(mean) = mean(group.iter().filter_map(|r| r.value)) else {
                    continue;
                };
                let key = day.checked_add(day_offset).ok_or_else(|| {
                    CoreError::source_read(
                        &variable.source_id,
                        file,
                        format!("day {day} cannot be shifted by {day_offset}"),
                    )
                })?;
                values.insert(key, mean);

                if variable.max_days.is_some_and(|cap| values.len() >= cap) {
                    debug!(cap = values.len(), "Reached max_days, stopping");
                    break 'files;
                }
            }
        }

        info!(
            variable = %variable.field_name,
            days = values.len(),
            "Aggregated variable"
        );
        Ok(values)
    }
}

/// Reduce every record of a series to a scalar on its truncated day.
fn reduce_records(
    series: &SourceSeries,
    variable: &VariableDescriptor,
) -> Result<Vec<ReducedRecord>, String> {
    series.check_shape(variable.is_gridded)?;

    let records = series
        .values
        .axis_iter(Axis(0))
        .zip(series.time.iter())
        .map(|(record, &time)| {
            let value = if variable.is_gridded {
                spatial_mean(record.iter().copied(), variable.grid_mask, series.fill_value)
            } else {
                record.iter().next().copied()
            };
            ReducedRecord {
                // Toward zero, the same as an integer cast of the raw time value.
                day: time.trunc() as i64,
                value,
            }
        })
        .collect();
    Ok(records)
}

fn spatial_mean(
    cells: impl Iterator<Item = f64>,
    mask: GridMask,
    fill_value: Option<f64>,
) -> Option<f64> {
    match mask {
        GridMask::IncludeAll => mean(cells),
        GridMask::SkipMissing => {
            mean(cells.filter(|v| !v.is_nan() && Some(*v) != fill_value))
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::parse_date;
    use crate::source::{InMemorySource, MemoryFile};
    use ndarray::{Array, ArrayD, IxDyn};

    fn baseline() -> NaiveDate {
        parse_date("1900/01/01").unwrap()
    }

    fn scalar_var(field: &str) -> VariableDescriptor {
        VariableDescriptor::new("solar-vars", field, false, baseline())
    }

    fn grid(records: &[f64], cells: usize) -> ArrayD<f64> {
        let data: Vec<f64> = records
            .iter()
            .flat_map(|&v| std::iter::repeat(v).take(cells))
            .collect();
        Array::from_shape_vec(IxDyn(&[records.len(), cells / 2, 2]), data).unwrap()
    }

    fn scalar_source(files: &[(&str, Vec<f64>, Vec<f64>)]) -> InMemorySource {
        let mut source = InMemorySource::new();
        for (name, time, values) in files {
            source.add_file(
                "solar-vars",
                *name,
                MemoryFile::new(time.clone()).with_scalar_field("tsi", values.clone()),
            );
        }
        source
    }

    #[test]
    fn constant_grid_averages_to_the_constant() {
        let mut source = InMemorySource::new();
        source.add_file(
            "atmos",
            "tas_1900.json",
            MemoryFile::new(vec![0.0, 1.0]).with_field("tas", grid(&[287.25, 287.25], 8)),
        );
        let var = VariableDescriptor::new("atmos", "tas", true, baseline());

        let values = Aggregator::new(&source, baseline()).aggregate(&var).unwrap();
        assert_eq!(values, DayValues::from([(0, 287.25), (1, 287.25)]));
    }

    #[test]
    fn gridded_records_average_cells_then_days() {
        let data = vec![
            1.0, 3.0, // day 0, first record: mean 2
            5.0, 7.0, // day 0, second record: mean 6
            10.0, 20.0, // day 1: mean 15
        ];
        let mut source = InMemorySource::new();
        source.add_file(
            "atmos",
            "tas.json",
            MemoryFile::new(vec![0.0, 0.5, 1.0]).with_field(
                "tas",
                Array::from_shape_vec(IxDyn(&[3, 2]), data).unwrap(),
            ),
        );
        let var = VariableDescriptor::new("atmos", "tas", true, baseline());

        let values = Aggregator::new(&source, baseline()).aggregate(&var).unwrap();
        assert_eq!(values, DayValues::from([(0, 4.0), (1, 15.0)]));
    }

    #[test]
    fn records_on_the_same_day_are_averaged() {
        let source = scalar_source(&[("a", vec![3.25, 3.75], vec![2.0, 4.0])]);
        let values = Aggregator::new(&source, baseline())
            .aggregate(&scalar_var("tsi"))
            .unwrap();
        assert_eq!(values, DayValues::from([(3, 3.0)]));
    }

    #[test]
    fn grouping_is_by_contiguous_run() {
        // Day 0 reappears after day 1; the later run replaces the first.
        let source = scalar_source(&[("a", vec![0.0, 0.5, 1.0, 0.2], vec![1.0, 3.0, 5.0, 9.0])]);
        let values = Aggregator::new(&source, baseline())
            .aggregate(&scalar_var("tsi"))
            .unwrap();
        assert_eq!(values, DayValues::from([(0, 9.0), (1, 5.0)]));
    }

    #[test]
    fn days_are_shifted_to_the_global_baseline() {
        let source = scalar_source(&[("a", vec![0.0, 18262.0], vec![1.0, 2.0])]);
        let var = VariableDescriptor::new("solar-vars", "tsi", false, parse_date("1850/01/01").unwrap());
        let values = Aggregator::new(&source, baseline()).aggregate(&var).unwrap();
        assert_eq!(values, DayValues::from([(-18262, 1.0), (0, 2.0)]));
    }

    #[test]
    fn negative_times_truncate_toward_zero() {
        let source = scalar_source(&[("a", vec![-1.5, -0.5, 0.5], vec![1.0, 2.0, 4.0])]);
        let values = Aggregator::new(&source, baseline())
            .aggregate(&scalar_var("tsi"))
            .unwrap();
        assert_eq!(values, DayValues::from([(-1, 1.0), (0, 3.0)]));
    }

    #[test]
    fn end_date_one_day_after_start_keeps_one_day() {
        let source = scalar_source(&[("a", vec![0.0, 0.5, 1.0, 2.0], vec![1.0, 2.0, 3.0, 4.0])]);
        let var = scalar_var("tsi").with_end_date(parse_date("1900/01/02").unwrap());
        let values = Aggregator::new(&source, baseline()).aggregate(&var).unwrap();
        assert_eq!(values, DayValues::from([(0, 1.5)]));
    }

    #[test]
    fn cutoff_skips_without_stopping() {
        // Records past the cutoff are skipped, earlier ones after them are still read.
        let source = scalar_source(&[("a", vec![5.0, 1.0], vec![50.0, 10.0])]);
        let var = scalar_var("tsi").with_end_date(parse_date("1900/01/03").unwrap());
        let values = Aggregator::new(&source, baseline()).aggregate(&var).unwrap();
        assert_eq!(values, DayValues::from([(1, 10.0)]));
    }

    #[test]
    fn max_days_keeps_first_days_in_read_order() {
        let source = scalar_source(&[("a", vec![7.0, 3.0, 5.0], vec![1.0, 2.0, 3.0])]);
        let var = scalar_var("tsi").with_max_days(2);
        let values = Aggregator::new(&source, baseline()).aggregate(&var).unwrap();
        assert_eq!(values, DayValues::from([(7, 1.0), (3, 2.0)]));
    }

    #[test]
    fn max_days_stops_across_files() {
        let source = scalar_source(&[
            ("a", vec![0.0], vec![1.0]),
            ("b", vec![1.0, 2.0], vec![2.0, 3.0]),
            ("c", vec![3.0], vec![4.0]),
        ]);
        let var = scalar_var("tsi").with_max_days(2);
        let values = Aggregator::new(&source, baseline()).aggregate(&var).unwrap();
        assert_eq!(values, DayValues::from([(0, 1.0), (1, 2.0)]));

        let var = scalar_var("tsi").with_max_days(0);
        let values = Aggregator::new(&source, baseline()).aggregate(&var).unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn later_file_wins_for_a_repeated_day() {
        let source = scalar_source(&[
            ("a", vec![0.0, 1.0], vec![1.0, 2.0]),
            ("b", vec![1.0, 1.5], vec![10.0, 20.0]),
        ]);
        let values = Aggregator::new(&source, baseline())
            .aggregate(&scalar_var("tsi"))
            .unwrap();
        assert_eq!(values, DayValues::from([(0, 1.0), (1, 15.0)]));
    }

    #[test]
    fn include_all_propagates_missing_cells() {
        let mut source = InMemorySource::new();
        source.add_file(
            "sea-ice",
            "a",
            MemoryFile::new(vec![0.0]).with_field(
                "siconc",
                Array::from_shape_vec(IxDyn(&[1, 3]), vec![10.0, f64::NAN, 20.0]).unwrap(),
            ),
        );
        let var = VariableDescriptor::new("sea-ice", "siconc", true, baseline());
        let values = Aggregator::new(&source, baseline()).aggregate(&var).unwrap();
        assert!(values[&0].is_nan());
    }

    #[test]
    fn skip_missing_excludes_nan_and_fill_cells() {
        let mut source = InMemorySource::new();
        source.add_file(
            "sea-ice",
            "a",
            MemoryFile::new(vec![0.0, 1.0])
                .with_field(
                    "siconc",
                    Array::from_shape_vec(
                        IxDyn(&[2, 3]),
                        vec![10.0, f64::NAN, 20.0, 1e20, 1e20, 1e20],
                    )
                    .unwrap(),
                )
                .with_fill_value("siconc", 1e20),
        );
        let var = VariableDescriptor::new("sea-ice", "siconc", true, baseline())
            .with_grid_mask(GridMask::SkipMissing);
        let values = Aggregator::new(&source, baseline()).aggregate(&var).unwrap();
        // Day 1 is fully masked and therefore absent.
        assert_eq!(values, DayValues::from([(0, 15.0)]));
    }

    #[test]
    fn malformed_files_fail_the_variable() {
        let source = scalar_source(&[("a", vec![0.0, 1.0, 2.0], vec![1.0, 2.0])]);
        let err = Aggregator::new(&source, baseline())
            .aggregate(&scalar_var("tsi"))
            .unwrap_err();
        assert!(err.is_variable_local());
        assert!(matches!(err, CoreError::SourceRead { ref file, .. } if file == "a"));

        let err = Aggregator::new(&source, baseline())
            .aggregate(&scalar_var("ssn"))
            .unwrap_err();
        assert!(matches!(err, CoreError::SourceRead { .. }));

        let mut source = InMemorySource::new();
        source.add_file(
            "solar-vars",
            "grid",
            MemoryFile::new(vec![0.0]).with_field("iprp", grid(&[1.0], 4)),
        );
        let err = Aggregator::new(&source, baseline())
            .aggregate(&scalar_var("iprp"))
            .unwrap_err();
        assert!(err.to_string().contains("scalar field"));
    }
}
