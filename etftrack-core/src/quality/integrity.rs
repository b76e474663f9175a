//! Integrity checker — scans a series for data-quality defects.
//!
//! Pure and non-mutating. Four defect classes are reported:
//! - calendar gaps longer than one day between consecutive records
//! - close prices outside the 3×IQR fence
//! - zero-volume days
//! - missing values per numeric field

use super::stats::{iqr_bounds, Bounds};
use crate::domain::{DailyRecord, Field, InstrumentSeries};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// A run of more than one calendar day between two consecutive records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateGap {
    /// Last record date before the gap.
    pub from: NaiveDate,
    /// First record date after the gap.
    pub to: NaiveDate,
    /// Calendar days between `from` and `to`.
    pub days: i64,
}

/// Result of an integrity scan. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrityReport {
    pub date_gaps: Vec<DateGap>,
    pub outliers: Vec<DailyRecord>,
    pub zero_volume: Vec<DailyRecord>,
    pub missing: BTreeMap<Field, usize>,
    /// Fence used for the outlier scan; `None` when no close price exists.
    pub close_bounds: Option<Bounds>,
}

impl IntegrityReport {
    fn empty() -> Self {
        Self {
            date_gaps: Vec::new(),
            outliers: Vec::new(),
            zero_volume: Vec::new(),
            missing: Field::ALL.iter().map(|&f| (f, 0)).collect(),
            close_bounds: None,
        }
    }

    pub fn missing_count(&self, field: Field) -> usize {
        self.missing.get(&field).copied().unwrap_or(0)
    }

    pub fn total_missing(&self) -> usize {
        self.missing.values().sum()
    }

    /// Whether the storage path should run the repair engine.
    ///
    /// Zero-volume days alone do not trigger a repair.
    pub fn needs_repair(&self) -> bool {
        !self.date_gaps.is_empty() || !self.outliers.is_empty() || self.total_missing() > 0
    }

    pub fn is_clean(&self) -> bool {
        !self.needs_repair() && self.zero_volume.is_empty()
    }
}

/// Scan `series` for defects. An empty series yields an all-zero report.
pub fn check(series: &InstrumentSeries) -> IntegrityReport {
    let mut report = IntegrityReport::empty();
    if series.is_empty() {
        return report;
    }

    // Callers normally pass canonical series; sort a view anyway.
    let mut records: Vec<&DailyRecord> = series.records.iter().collect();
    records.sort_by_key(|r| r.date);

    for pair in records.windows(2) {
        let days = (pair[1].date - pair[0].date).num_days();
        if days > 1 {
            report.date_gaps.push(DateGap {
                from: pair[0].date,
                to: pair[1].date,
                days,
            });
        }
    }

    let closes: Vec<Option<f64>> = records.iter().map(|r| r.close).collect();
    report.close_bounds = iqr_bounds(&closes);
    if let Some(bounds) = report.close_bounds {
        report.outliers = records
            .iter()
            .filter(|r| r.close.is_some_and(|c| !bounds.contains(c)))
            .map(|r| (*r).clone())
            .collect();
    }

    report.zero_volume = records
        .iter()
        .filter(|r| r.volume == Some(0.0))
        .map(|r| (*r).clone())
        .collect();

    for field in Field::ALL {
        let count = records.iter().filter(|r| r.get(field).is_none()).count();
        report.missing.insert(field, count);
    }

    report
}
