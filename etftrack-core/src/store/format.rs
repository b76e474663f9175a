//! Canonical file format: `Date,Close,Volume` CSV with ISO dates.
//!
//! Writes are atomic: the bytes go to a `.tmp` sibling which is fsynced and
//! then renamed over the target, so a reader or a crash only ever sees the
//! previous complete file or the new complete file.

use crate::data::DataError;
use crate::domain::{DailyRecord, Field};
use chrono::NaiveDate;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

pub const DATE_COLUMN: &str = "Date";

/// Header of every canonical and snapshot file.
pub const HEADER: [&str; 3] = [DATE_COLUMN, "Close", "Volume"];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Serialize records into canonical CSV bytes, in the given order.
pub fn encode(records: &[DailyRecord]) -> Result<Vec<u8>, DataError> {
    let mut wtr = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(vec![]);
    wtr.write_record(HEADER)?;
    for rec in records {
        wtr.write_record([
            rec.date.format(DATE_FORMAT).to_string(),
            format_value(rec.close),
            format_value(rec.volume),
        ])?;
    }
    wtr.into_inner().map_err(|e| DataError::Io(e.into_error()))
}

fn format_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Parse canonical CSV into records in file order.
///
/// Columns are located by header name, so extra columns and any column
/// order are accepted. A missing required column is a validation error.
/// Empty or non-numeric values become missing values; a bad date fails the
/// whole read.
pub fn decode<R: Read>(reader: R) -> Result<Vec<DailyRecord>, DataError> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let position = |name: &str| headers.iter().position(|h| h == name);
    let (date_idx, close_idx, volume_idx) = match (
        position(DATE_COLUMN),
        position(Field::Close.column()),
        position(Field::Volume.column()),
    ) {
        (Some(d), Some(c), Some(v)) => (d, c, v),
        _ => {
            let missing: Vec<&str> = HEADER
                .iter()
                .copied()
                .filter(|name| position(name).is_none())
                .collect();
            return Err(DataError::Validation(format!(
                "missing required columns: {}",
                missing.join(", ")
            )));
        }
    };

    let mut records = Vec::new();
    for (line, row) in rdr.records().enumerate() {
        let row = row?;
        let date_token = row.get(date_idx).unwrap_or("");
        let date = NaiveDate::parse_from_str(date_token, DATE_FORMAT).map_err(|_| {
            DataError::Validation(format!("row {}: bad date '{date_token}'", line + 1))
        })?;
        records.push(DailyRecord {
            date,
            close: coerce_number(row.get(close_idx)),
            volume: coerce_number(row.get(volume_idx)),
        });
    }
    Ok(records)
}

/// Lenient numeric coercion: thousands separators are stripped, anything
/// that is not a finite number is a missing value.
fn coerce_number(field: Option<&str>) -> Option<f64> {
    let cleaned = field?.replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            tracing::debug!(value = %cleaned, "non-numeric value coerced to missing");
            None
        }
    }
}

/// Read a canonical file.
pub fn read_file(path: &Path) -> Result<Vec<DailyRecord>, DataError> {
    let file = fs::File::open(path)?;
    decode(std::io::BufReader::new(file))
}

/// Encode and atomically write `records` to `path`.
pub fn write_file(path: &Path, records: &[DailyRecord]) -> Result<(), DataError> {
    let bytes = encode(records)?;
    write_atomic(path, &bytes)
}

/// Write `bytes` to `path` through an fsynced temp file and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DataError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("csv.tmp");

    let result = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();

    if let Err(e) = result {
        // Clean up temp file on failure
        let _ = fs::remove_file(&tmp_path);
        return Err(DataError::Io(e));
    }
    Ok(())
}
