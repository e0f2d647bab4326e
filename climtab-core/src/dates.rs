//! Calendar arithmetic on day offsets.
//!
//! Every table row is keyed by a day offset: the number of whole days since a
//! baseline date. Source variables carry their own baselines, so converting
//! between the two goes through the functions in this module and nowhere else.
//!
//! Dates are written `%Y/%m/%d` throughout ([`DATE_FORMAT`]).
//!
//! ```rust
//! use climtab_core::dates::{day_delta, offset_to_date, DATE_FORMAT};
//!
//! assert_eq!(day_delta("1850/01/01", "1900/01/01").unwrap(), 18262);
//! assert_eq!(
//!     offset_to_date(-18262.0, "1900/01/01", DATE_FORMAT).unwrap(),
//!     "1850/01/01"
//! );
//! ```

use crate::errors::{CoreError, CoreResult};
use chrono::format::{Item, StrftimeItems};
use chrono::{Days, NaiveDate, NaiveTime, TimeDelta};
use std::fmt::Write;

/// Format used for every date accepted or produced by the crate.
pub const DATE_FORMAT: &str = "%Y/%m/%d";

/// Day zero of the persisted table unless configured otherwise.
pub const DEFAULT_BASELINE: &str = "1900/01/01";

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Parse a `%Y/%m/%d` date.
pub fn parse_date(value: &str) -> CoreResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        CoreError::InvalidDateFormat {
            value: value.to_string(),
            expected: DATE_FORMAT.to_string(),
        }
    })
}

/// Render a date with [`DATE_FORMAT`].
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Number of calendar days from `start` to `end` (negative when `end` is earlier).
pub fn days_between(start: NaiveDate, end: NaiveDate) -> i64 {
    end.signed_duration_since(start).num_days()
}

/// Move `date` by a whole number of days.
pub fn shift_date(date: NaiveDate, days: i64) -> CoreResult<NaiveDate> {
    let shifted = if days >= 0 {
        date.checked_add_days(Days::new(days.unsigned_abs()))
    } else {
        date.checked_sub_days(Days::new(days.unsigned_abs()))
    };
    shifted.ok_or_else(|| CoreError::DateOutOfRange {
        baseline: format_date(date),
        offset: days as f64,
    })
}

/// Exact count of calendar days between two `%Y/%m/%d` dates (`end - start`).
///
/// Antisymmetric: `day_delta(a, b) == -day_delta(b, a)`.
pub fn day_delta(start_date: &str, end_date: &str) -> CoreResult<i64> {
    let start = parse_date(start_date)?;
    let end = parse_date(end_date)?;
    Ok(days_between(start, end))
}

/// Day offset of `date` relative to `baseline`.
pub fn date_to_offset(date: &str, baseline: &str) -> CoreResult<i64> {
    day_delta(baseline, date)
}

/// Render `baseline + day_offset` days using a strftime `format`.
///
/// Fractional offsets are applied as a time of day before the date is rendered,
/// so `-0.5` lands on the day before `baseline`. Truncating an offset to a whole
/// day is left to the caller.
pub fn offset_to_date(day_offset: f64, baseline: &str, format: &str) -> CoreResult<String> {
    let base = parse_date(baseline)?;
    let out_of_range = || CoreError::DateOutOfRange {
        baseline: baseline.to_string(),
        offset: day_offset,
    };

    let millis = (day_offset * MILLIS_PER_DAY).round();
    // Comfortably beyond the chrono calendar range while staying inside i64.
    if !millis.is_finite() || millis.abs() > 1e17 {
        return Err(out_of_range());
    }
    let delta = TimeDelta::try_milliseconds(millis as i64).ok_or_else(out_of_range)?;
    let moment = base
        .and_time(NaiveTime::MIN)
        .checked_add_signed(delta)
        .ok_or_else(out_of_range)?;

    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    let invalid_format = || CoreError::InvalidDateFormat {
        value: format.to_string(),
        expected: "a strftime pattern".to_string(),
    };
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(invalid_format());
    }

    let mut rendered = String::new();
    write!(rendered, "{}", moment.format_with_items(items.iter()))
        .map_err(|_| invalid_format())?;
    Ok(rendered)
}

/// Serde adapter storing a [`NaiveDate`] as a `%Y/%m/%d` string.
///
/// ```rust
/// use chrono::NaiveDate;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Window {
///     #[serde(with = "climtab_core::dates::serde_date")]
///     start: NaiveDate,
/// }
/// ```
pub mod serde_date {
    use super::{format_date, parse_date};
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_date(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_date(&raw).map_err(serde::de::Error::custom)
    }

    /// The same encoding for optional dates. Pair with `#[serde(default)]`.
    pub mod option {
        use super::{format_date, parse_date};
        use chrono::NaiveDate;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            date: &Option<NaiveDate>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match date {
                Some(date) => serializer.serialize_some(&format_date(*date)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveDate>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| parse_date(&raw).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
