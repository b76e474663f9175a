//! Integrity reports over stored series.
//!
//! Reports only read through [`CsvStore::load`] and the integrity checker,
//! so they see exactly what any other consumer sees.
//!
//! Two export formats for comparison reports:
//! - **CSV**: one row per instrument
//! - **Markdown**: side-by-side table for terminals and notes
//!
//! Both report types are `Serialize`; [`ComparisonReport::to_json`] gives
//! the pretty-printed JSON form.

use crate::data::DataError;
use crate::quality;
use crate::store::CsvStore;
use chrono::NaiveDate;
use serde::Serialize;

/// Data-quality summary of one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstrumentReport {
    pub code: String,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub records: usize,
    pub gap_count: usize,
    pub outlier_count: usize,
    pub zero_volume_count: usize,
}

impl InstrumentReport {
    fn empty(code: &str) -> Self {
        Self {
            code: code.to_string(),
            first_date: None,
            last_date: None,
            records: 0,
            gap_count: 0,
            outlier_count: 0,
            zero_volume_count: 0,
        }
    }

    /// `YYYY-MM-DD ~ YYYY-MM-DD`, or `none` without data.
    pub fn period(&self) -> String {
        match (self.first_date, self.last_date) {
            (Some(first), Some(last)) => format!("{first} ~ {last}"),
            _ => "none".to_string(),
        }
    }
}

/// Reports for several instruments, in the requested order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonReport {
    pub rows: Vec<InstrumentReport>,
}

const COLUMNS: [&str; 6] = [
    "code",
    "period",
    "records",
    "gaps",
    "outliers",
    "zero_volume",
];

impl ComparisonReport {
    fn cells(row: &InstrumentReport) -> [String; 6] {
        [
            row.code.clone(),
            row.period(),
            row.records.to_string(),
            row.gap_count.to_string(),
            row.outlier_count.to_string(),
            row.zero_volume_count.to_string(),
        ]
    }

    pub fn to_csv(&self) -> Result<String, DataError> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        wtr.write_record(COLUMNS)?;
        for row in &self.rows {
            wtr.write_record(Self::cells(row))?;
        }
        let data = wtr.into_inner().map_err(|e| DataError::Io(e.into_error()))?;
        String::from_utf8(data)
            .map_err(|e| DataError::Validation(format!("CSV output is not valid UTF-8: {e}")))
    }

    pub fn to_json(&self) -> Result<String, DataError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| DataError::Validation(format!("failed to serialize report: {e}")))
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("| {} |\n", COLUMNS.join(" | ")));
        out.push_str(&format!("|{}\n", "---|".repeat(COLUMNS.len())));
        for row in &self.rows {
            out.push_str(&format!("| {} |\n", Self::cells(row).join(" | ")));
        }
        out
    }
}

/// Builds reports from a store.
pub struct ReportGenerator<'a> {
    store: &'a CsvStore,
}

impl<'a> ReportGenerator<'a> {
    pub fn new(store: &'a CsvStore) -> Self {
        Self { store }
    }

    /// Report for one instrument. No stored data yields a zeroed report.
    pub fn instrument_report(&self, code: &str) -> InstrumentReport {
        let series = self.store.load(code);
        if series.is_empty() {
            return InstrumentReport::empty(code);
        }

        let checks = quality::check(&series);
        InstrumentReport {
            code: code.to_string(),
            first_date: series.first_date(),
            last_date: series.last_date(),
            records: series.len(),
            gap_count: checks.date_gaps.len(),
            outlier_count: checks.outliers.len(),
            zero_volume_count: checks.zero_volume.len(),
        }
    }

    pub fn comparison_report<S: AsRef<str>>(&self, codes: &[S]) -> ComparisonReport {
        ComparisonReport {
            rows: codes
                .iter()
                .map(|c| self.instrument_report(c.as_ref()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DailyRecord, InstrumentSeries};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn seeded_store(dir: &tempfile::TempDir) -> CsvStore {
        let store = CsvStore::new(dir.path(), 3).unwrap();
        let series = InstrumentSeries::from_records(
            "0050",
            vec![
                DailyRecord::new(d(1), 10.0, 5.0),
                DailyRecord::new(d(2), 10.0, 6.0),
                DailyRecord::new(d(5), 10.0, 7.0),
            ],
        );
        store.save(&series.code, &series).unwrap();
        store
    }

    #[test]
    fn instrument_report_counts_defects() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir);

        let report = ReportGenerator::new(&store).instrument_report("0050");

        assert_eq!(report.records, 3);
        assert_eq!(report.gap_count, 1);
        assert_eq!(report.outlier_count, 0);
        assert_eq!(report.period(), "2024-01-01 ~ 2024-01-05");
    }

    #[test]
    fn unknown_instrument_is_zeroed() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path(), 3).unwrap();

        let report = ReportGenerator::new(&store).instrument_report("9999");

        assert_eq!(report, InstrumentReport::empty("9999"));
        assert_eq!(report.period(), "none");
    }

    #[test]
    fn comparison_keeps_order_and_exports() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(&dir);

        let cmp = ReportGenerator::new(&store).comparison_report(["9999", "0050"].as_slice());

        assert_eq!(cmp.rows[0].code, "9999");
        assert_eq!(cmp.rows[1].code, "0050");

        let csv = cmp.to_csv().unwrap();
        assert!(csv.starts_with("code,period,records,gaps,outliers,zero_volume"));
        assert!(csv.contains("0050,2024-01-01 ~ 2024-01-05,3,1,0,0"));

        let md = cmp.to_markdown();
        assert_eq!(md.lines().count(), 4);
        assert!(md.contains("| 9999 | none | 0 | 0 | 0 | 0 |"));

        let json: serde_json::Value = serde_json::from_str(&cmp.to_json().unwrap()).unwrap();
        assert_eq!(json["rows"][1]["records"], 3);
        assert_eq!(json["rows"][0]["first_date"], serde_json::Value::Null);
    }
}
