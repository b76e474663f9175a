//! Minguo (ROC) era dates used by the exchange's reports.
//!
//! The era year is the Gregorian year minus 1911, so `112/01/05` is
//! 2023-01-05.

use super::provider::DataError;
use chrono::NaiveDate;

/// Offset between the ROC era year and the Gregorian year.
pub const ERA_OFFSET: i32 = 1911;

/// Convert an `era_year/month/day` token into a calendar date.
///
/// Fails with [`DataError::MalformedDate`] unless the token has exactly three
/// numeric parts that name a real date.
pub fn parse_roc_date(token: &str) -> Result<NaiveDate, DataError> {
    let malformed = || DataError::MalformedDate(token.to_string());

    let parts: Vec<&str> = token.trim().split('/').collect();
    if parts.len() != 3 {
        return Err(malformed());
    }

    let mut numbers = [0u32; 3];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        *slot = part.parse().map_err(|_| malformed())?;
    }

    let year = i32::try_from(numbers[0])
        .ok()
        .and_then(|y| y.checked_add(ERA_OFFSET))
        .ok_or_else(malformed)?;
    NaiveDate::from_ymd_opt(year, numbers[1], numbers[2]).ok_or_else(malformed)
}

/// Format a calendar date as an ROC era token (`YYY/MM/DD`).
pub fn format_roc_date(date: NaiveDate) -> String {
    use chrono::Datelike;
    format!(
        "{}/{:02}/{:02}",
        date.year() - ERA_OFFSET,
        date.month(),
        date.day()
    )
}
