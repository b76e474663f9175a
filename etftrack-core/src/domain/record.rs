//! DailyRecord and InstrumentSeries — the persisted market data units.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One trading day for one instrument.
///
/// `close` and `volume` are `None` when the value is missing. The repair
/// engine may fill them in; the date key is never modified after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

impl DailyRecord {
    pub fn new(date: NaiveDate, close: f64, volume: f64) -> Self {
        Self {
            date,
            close: Some(close),
            volume: Some(volume),
        }
    }

    /// Value of a numeric field.
    pub fn get(&self, field: Field) -> Option<f64> {
        match field {
            Field::Close => self.close,
            Field::Volume => self.volume,
        }
    }

    /// Mutable access to a numeric field.
    pub fn get_mut(&mut self, field: Field) -> &mut Option<f64> {
        match field {
            Field::Close => &mut self.close,
            Field::Volume => &mut self.volume,
        }
    }

    /// Checks the value invariants: close strictly positive, volume
    /// non-negative, both finite when present.
    pub fn check_values(&self) -> Result<(), String> {
        if let Some(close) = self.close {
            if !close.is_finite() || close <= 0.0 {
                return Err(format!("{}: close must be positive, got {close}", self.date));
            }
        }
        if let Some(volume) = self.volume {
            if !volume.is_finite() || volume < 0.0 {
                return Err(format!(
                    "{}: volume must be non-negative, got {volume}",
                    self.date
                ));
            }
        }
        Ok(())
    }
}

/// Numeric columns of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Field {
    Close,
    Volume,
}

impl Field {
    pub const ALL: [Field; 2] = [Field::Close, Field::Volume];

    /// Column name in the canonical file header.
    pub fn column(self) -> &'static str {
        match self {
            Field::Close => "Close",
            Field::Volume => "Volume",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Date-ordered records for one instrument code.
///
/// Built through [`InstrumentSeries::from_records`] the records are sorted
/// ascending with no duplicate dates (first occurrence wins).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstrumentSeries {
    pub code: String,
    pub records: Vec<DailyRecord>,
}

impl InstrumentSeries {
    pub fn empty(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            records: Vec::new(),
        }
    }

    /// Sort ascending by date and drop duplicate dates, keeping the first
    /// occurrence in input order.
    pub fn from_records(code: impl Into<String>, records: Vec<DailyRecord>) -> Self {
        Self {
            code: code.into(),
            records: sort_dedup_first(records),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.records.first().map(|r| r.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.records.last().map(|r| r.date)
    }

    /// True when the records are strictly increasing by date.
    pub fn is_canonical(&self) -> bool {
        self.records.windows(2).all(|w| w[0].date < w[1].date)
    }
}

/// Stable sort by date, then keep only the first record of each date.
///
/// The stable sort preserves input order among equal dates, so "first" means
/// first in the caller's sequence.
pub fn sort_dedup_first(mut records: Vec<DailyRecord>) -> Vec<DailyRecord> {
    records.sort_by_key(|r| r.date);
    records.dedup_by(|later, earlier| later.date == earlier.date);
    records
}
