//! Date range validation and per-day query expansion
//!
//! A run covers every calendar day of an inclusive date range, each day
//! restricted to one time-of-day window. [`validate`] turns the raw user
//! fields into a [`ValidatedRange`]; [`expand`] walks it into one
//! [`QueryDescriptor`] per day.

use crate::error::{HoraeError, Result};
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Substituted when a window has no from time
pub const DEFAULT_FROM_TIME: &str = "00:00";

/// Substituted when a window has no to time
pub const DEFAULT_TO_TIME: &str = "23:59";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// The date fields as the user edited them (`YYYY-MM-DD`, possibly empty)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRangeInput {
    #[serde(default)]
    pub from_date: String,
    #[serde(default)]
    pub to_date: String,
}

impl DateRangeInput {
    pub fn new(from_date: impl Into<String>, to_date: impl Into<String>) -> Self {
        Self {
            from_date: from_date.into(),
            to_date: to_date.into(),
        }
    }

    /// `lookback_days` before `today` through `today`
    pub fn trailing_days(today: NaiveDate, lookback_days: u32) -> Self {
        let from = today
            .checked_sub_days(Days::new(u64::from(lookback_days)))
            .unwrap_or(NaiveDate::MIN);
        Self::new(
            from.format(DATE_FORMAT).to_string(),
            today.format(DATE_FORMAT).to_string(),
        )
    }
}

/// Input that passed validation; every field is present and ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedRange {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub from_time: NaiveTime,
    pub to_time: NaiveTime,
}

impl ValidatedRange {
    /// Number of calendar days covered
    pub fn day_count(&self) -> usize {
        usize::try_from((self.to_date - self.from_date).num_days() + 1).unwrap_or(0)
    }

    pub fn descriptors(&self) -> Vec<QueryDescriptor> {
        expand(
            self.from_date,
            self.to_date,
            Some(self.from_time),
            Some(self.to_time),
        )
    }
}

/// One day's worth of query parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueryDescriptor {
    pub date: NaiveDate,
    pub from_time: NaiveTime,
    pub to_time: NaiveTime,
}

impl QueryDescriptor {
    /// The day at `from_time`, read as UTC
    pub fn start(&self) -> DateTime<Utc> {
        self.date.and_time(self.from_time).and_utc()
    }

    /// The day at `to_time`, read as UTC
    pub fn end(&self) -> DateTime<Utc> {
        self.date.and_time(self.to_time).and_utc()
    }

    pub fn start_ts_ms(&self) -> i64 {
        self.start().timestamp_millis()
    }

    pub fn end_ts_ms(&self) -> i64 {
        self.end().timestamp_millis()
    }
}

/// Parse `HH:MM` (or `HH:MM:SS`); `None` for empty or malformed input
pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

fn parse_date_field(value: &str) -> Result<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| {
        HoraeError::validation(
            "date_range",
            format!("Invalid date '{}' (expected YYYY-MM-DD)", value),
        )
    })
}

fn parse_time_field(value: &str) -> Result<NaiveTime> {
    parse_time_of_day(value).ok_or_else(|| {
        HoraeError::validation(
            "time_window",
            format!("Invalid time '{}' (expected HH:MM)", value.trim()),
        )
    })
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Check the user's fields before anything is fetched.
///
/// Checks run in a fixed order and the first failure is returned. A missing
/// field is reported before a malformed one.
pub fn validate(range: &DateRangeInput, from_time: &str, to_time: &str) -> Result<ValidatedRange> {
    if is_blank(&range.from_date) || is_blank(&range.to_date) {
        return Err(HoraeError::validation(
            "date_range",
            "Please select both from and to dates",
        ));
    }
    let from_date = parse_date_field(&range.from_date)?;
    let to_date = parse_date_field(&range.to_date)?;

    if is_blank(from_time) || is_blank(to_time) {
        return Err(HoraeError::validation(
            "time_window",
            "Please select both from and to times",
        ));
    }
    let from_time = parse_time_field(from_time)?;
    let to_time = parse_time_field(to_time)?;

    if from_date > to_date {
        return Err(HoraeError::validation(
            "date_range",
            "From date must be before or equal to to date",
        ));
    }

    if from_date == to_date && from_time >= to_time {
        return Err(HoraeError::validation(
            "time_window",
            "From time must be before to time for the same date",
        ));
    }

    Ok(ValidatedRange {
        from_date,
        to_date,
        from_time,
        to_time,
    })
}

/// One descriptor per day from `from_date` through `to_date`, in order.
///
/// Missing times fall back to `00:00` and `23:59`. An inverted range yields
/// nothing.
pub fn expand(
    from_date: NaiveDate,
    to_date: NaiveDate,
    from_time: Option<NaiveTime>,
    to_time: Option<NaiveTime>,
) -> Vec<QueryDescriptor> {
    let from_time = from_time
        .or_else(|| parse_time_of_day(DEFAULT_FROM_TIME))
        .unwrap_or_default();
    let to_time = to_time
        .or_else(|| parse_time_of_day(DEFAULT_TO_TIME))
        .unwrap_or_default();

    from_date
        .iter_days()
        .take_while(|day| *day <= to_date)
        .map(|date| QueryDescriptor {
            date,
            from_time,
            to_time,
        })
        .collect()
}
