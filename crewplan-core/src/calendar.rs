//! Calendar helpers: business days, date ranges and daily hour spreading

use chrono::{Datelike, Days, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Inclusive range of calendar dates
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a range, rejecting `start > end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(Error::validation(format!(
                "Date range start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Whether two inclusive ranges share at least one day
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Number of calendar days in the range
    pub fn len_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Iterate over every calendar day in the range
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..self.len_days()).map(move |offset| start + Duration::days(offset))
    }

    /// Shift both ends by a number of calendar days
    pub fn shifted(&self, days: i64) -> Result<Self> {
        Ok(Self {
            start: shift_date(self.start, days)?,
            end: shift_date(self.end, days)?,
        })
    }
}

/// Move a date by `days` calendar days, failing outside the representable calendar
pub fn shift_date(date: NaiveDate, days: i64) -> Result<NaiveDate> {
    let offset = Days::new(days.unsigned_abs());
    let shifted = if days >= 0 {
        date.checked_add_days(offset)
    } else {
        date.checked_sub_days(offset)
    };
    shifted.ok_or_else(|| Error::validation(format!("Shifting {} by {} day(s) leaves the calendar", date, days)))
}

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Days over which work in `range` is spread.
///
/// Business days when the range has any; otherwise every calendar day, so
/// explicitly scheduled weekend work is still counted.
pub fn working_days(range: &DateRange) -> Vec<NaiveDate> {
    let business: Vec<NaiveDate> = range.days().filter(|d| is_business_day(*d)).collect();
    if business.is_empty() {
        range.days().collect()
    } else {
        business
    }
}

/// Spread `total_hours` evenly over the working days of `range`
pub fn spread_hours(range: &DateRange, total_hours: f64) -> Vec<(NaiveDate, f64)> {
    let days = working_days(range);
    let per_day = total_hours / days.len() as f64;
    days.into_iter().map(|d| (d, per_day)).collect()
}
