//! Dataset selection
//!
//! Training and test frames come from an external datapool through
//! [`DatasetProvider`]. A [`DataSelection`] names what to read: a column
//! query, an inclusive date range, ranges to exclude, and the aggregation
//! window/slide.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::frame::TimeSeriesFrame;
use crate::{Error, Result};

const RANGE_SEPARATOR: &str = "--";

/// Inclusive range of calendar days.
///
/// Parsed from `"YYYY[-MM[-DD]] -- YYYY[-MM[-DD]]"` or a single
/// `"YYYY[-MM[-DD]]"`. A partial date covers its whole month or year: the
/// start takes the first day, the end the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl TimeRange {
    /// Range from explicit bounds.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `end` is before `start`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(Error::InvalidConfig(format!(
                "time range ends ({end}) before it starts ({start})"
            )));
        }
        Ok(Self { start, end })
    }

    /// Range between two dates known to be ordered; used for constants.
    pub(crate) const fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// First day.
    #[must_use]
    pub const fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last day (inclusive).
    #[must_use]
    pub const fn end(&self) -> NaiveDate {
        self.end
    }

    /// Whether `day` falls inside the range.
    #[must_use]
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Parse a comma-separated list of ranges; blank input is an empty list.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for the first malformed entry
    pub fn parse_list(s: &str) -> Result<Vec<Self>> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect()
    }
}

/// Which end of a range a partial date is being resolved for.
#[derive(Clone, Copy)]
enum Bound {
    Start,
    End,
}

fn parse_day(text: &str, bound: Bound) -> Result<NaiveDate> {
    let invalid = || Error::InvalidConfig(format!("invalid date {text:?}, expected YYYY[-MM[-DD]]"));
    let parts: Vec<&str> = text.trim().split('-').collect();
    let number = |s: &str| s.parse::<u32>().map_err(|_| invalid());

    let year = parts
        .first()
        .ok_or_else(invalid)?
        .parse::<i32>()
        .map_err(|_| invalid())?;
    let date = match (parts.len(), bound) {
        (1, Bound::Start) => NaiveDate::from_ymd_opt(year, 1, 1),
        (1, Bound::End) => NaiveDate::from_ymd_opt(year, 12, 31),
        (2, Bound::Start) => NaiveDate::from_ymd_opt(year, number(parts[1])?, 1),
        (2, Bound::End) => {
            let month = number(parts[1])?;
            let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
            if month == 0 || month > 12 {
                None
            } else {
                NaiveDate::from_ymd_opt(next_year, next_month, 1).and_then(|d| d.pred_opt())
            }
        }
        (3, _) => NaiveDate::from_ymd_opt(year, number(parts[1])?, number(parts[2])?),
        _ => None,
    };
    date.ok_or_else(invalid)
}

impl FromStr for TimeRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(RANGE_SEPARATOR) {
            Some((start, end)) => Self::new(parse_day(start, Bound::Start)?, parse_day(end, Bound::End)?),
            None => Self::new(parse_day(s, Bound::Start)?, parse_day(s, Bound::End)?),
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {RANGE_SEPARATOR} {}", self.start, self.end)
    }
}

impl TryFrom<String> for TimeRange {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TimeRange> for String {
    fn from(range: TimeRange) -> Self {
        range.to_string()
    }
}

/// What to read from the datapool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSelection {
    /// Protocol/column query, e.g. `conn|in_sum_orig_bytes;ssh|in#window_start,window_end`
    pub query: String,
    /// Days to read
    pub time_range: TimeRange,
    /// Days to leave out
    pub excluded: Vec<TimeRange>,
    /// Aggregation window and slide, e.g. `w01h-s10m`
    pub window_slide: String,
}

impl DataSelection {
    /// Whether `day` is selected (inside the range, outside every exclusion).
    #[must_use]
    pub fn selects(&self, day: NaiveDate) -> bool {
        self.time_range.contains(day) && !self.excluded.iter().any(|r| r.contains(day))
    }

    /// Days selected, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.time_range
            .start()
            .iter_days()
            .take_while(|day| *day <= self.time_range.end())
            .filter(|day| self.selects(*day))
    }
}

/// Source of time-series frames for a selection.
pub trait DatasetProvider {
    /// Read the selected data, returning the frame and an identifier of the
    /// cached copy it came from.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` (or any other error) if the data cannot be read
    fn read(&self, selection: &DataSelection) -> Result<(TimeSeriesFrame, String)>;
}
