//! FetchWindow — one calendar month of remote retrieval for one instrument.

use chrono::{Datelike, NaiveDate};
use std::fmt;

/// The unit of remote retrieval. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchWindow {
    pub code: String,
    /// Always the first day of a month.
    pub month_start: NaiveDate,
}

impl FetchWindow {
    /// Window for the month containing `day`.
    pub fn containing(code: impl Into<String>, day: NaiveDate) -> Self {
        Self {
            code: code.into(),
            month_start: first_of_month(day),
        }
    }

    /// `YYYYMMDD` form of the month's first day, as the exchange expects it.
    pub fn query_date(&self) -> String {
        self.month_start.format("%Y%m%d").to_string()
    }
}

impl fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.month_start.format("%Y-%m"))
    }
}

/// First day of the month containing `day`.
pub fn first_of_month(day: NaiveDate) -> NaiveDate {
    // day 1 exists in every month
    day.with_day(1).unwrap_or(day)
}

/// First day of the month after the one starting at `month_start`.
fn next_month(month_start: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if month_start.month() == 12 {
        (month_start.year() + 1, 1)
    } else {
        (month_start.year(), month_start.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Every month from `start`'s month through `end`'s month inclusive, ascending,
/// each represented by its first day. Empty when `start` is after `end`.
pub fn month_starts(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut months = Vec::new();
    let mut current = Some(first_of_month(start));
    while let Some(month) = current {
        if month > end {
            break;
        }
        months.push(month);
        current = next_month(month);
    }
    months
}

/// Fetch windows covering `start` through `end` for one instrument.
pub fn windows_for(code: &str, start: NaiveDate, end: NaiveDate) -> Vec<FetchWindow> {
    month_starts(start, end)
        .into_iter()
        .map(|month_start| FetchWindow {
            code: code.to_string(),
            month_start,
        })
        .collect()
}
