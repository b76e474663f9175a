//! TWSE monthly report fetcher.
//!
//! The exchange's `STOCK_DAY` report returns one calendar month of daily
//! trading data per request as a quoted CSV table wrapped in title and
//! footnote lines. This module builds the request, retries transient failures
//! with a fixed delay, and parses the table into [`DailyRecord`]s.

use super::calendar::parse_roc_date;
use super::provider::{DataError, MonthFetch, MonthlySource};
use super::transport::{PageTransport, ReqwestTransport};
use crate::domain::{DailyRecord, FetchWindow};
use std::time::Duration;

/// Endpoint of the monthly per-instrument report.
pub const REPORT_URL: &str = "https://www.twse.com.tw/exchangeReport/STOCK_DAY";

/// Lines with fewer fields are titles, footnotes or blanks.
pub const MIN_FIELDS: usize = 9;

pub const DATE_COLUMN: &str = "日期";
pub const CLOSE_COLUMN: &str = "收盤價";
pub const VOLUME_COLUMN: &str = "成交股數";

/// Placeholder the exchange prints when an instrument did not trade.
pub const NO_TRADE_MARKER: &str = "--";

/// Timing and retry settings for remote retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchPolicy {
    /// Total attempts per month, including the first.
    pub max_attempts: u32,
    /// Fixed wait between attempts.
    pub retry_delay: Duration,
    /// Wait between consecutive month requests of one instrument.
    pub politeness_delay: Duration,
    /// Timeout of a single HTTP request.
    pub request_timeout: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            politeness_delay: Duration::from_millis(500),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl FetchPolicy {
    /// Same attempt budget with every delay removed.
    pub fn without_delays(self) -> Self {
        Self {
            retry_delay: Duration::ZERO,
            politeness_delay: Duration::ZERO,
            ..self
        }
    }
}

/// Fetcher for the TWSE monthly report.
pub struct TwseProvider {
    transport: Box<dyn PageTransport>,
    policy: FetchPolicy,
}

impl TwseProvider {
    /// Provider backed by a Big5-decoding reqwest client.
    pub fn new(policy: FetchPolicy) -> Result<Self, DataError> {
        Ok(Self::with_transport(ReqwestTransport::new()?, policy))
    }

    pub fn with_transport(transport: impl PageTransport + 'static, policy: FetchPolicy) -> Self {
        Self {
            transport: Box::new(transport),
            policy,
        }
    }

    /// Report URL for one window.
    pub fn report_url(&self, window: &FetchWindow) -> String {
        format!(
            "{REPORT_URL}?response=csv&date={}&stockNo={}",
            window.query_date(),
            window.code
        )
    }

    /// One request plus parse, no retry.
    fn fetch_once(&self, window: &FetchWindow) -> Result<Vec<DailyRecord>, DataError> {
        let url = self.report_url(window);
        let resp = self.transport.get(&url, self.policy.request_timeout)?;
        if !resp.is_success() {
            return Err(DataError::Remote(format!("HTTP {} for {window}", resp.status)));
        }
        parse_report(&resp.body, window)
    }

    /// Fetch one month, retrying transient failures.
    ///
    /// After the attempt budget is spent the month degrades to an empty,
    /// non-queryable result; the failure is logged, never propagated.
    pub fn fetch_with_retry(&self, window: &FetchWindow) -> MonthFetch {
        let attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=attempts {
            match self.fetch_once(window) {
                Ok(records) => return MonthFetch::answered(records),
                Err(e) if e.is_transient() => {
                    tracing::warn!(window = %window, attempt, error = %e, "fetch attempt failed");
                }
                Err(e) => {
                    tracing::error!(window = %window, error = %e, "unusable report, not retrying");
                    return MonthFetch::unavailable();
                }
            }

            if attempt < attempts {
                tracing::info!(
                    window = %window,
                    "retrying in {:?} ({attempt}/{attempts})",
                    self.policy.retry_delay
                );
                std::thread::sleep(self.policy.retry_delay);
            }
        }

        tracing::error!(window = %window, attempts, "retries exhausted, treating month as empty");
        MonthFetch::unavailable()
    }
}

impl MonthlySource for TwseProvider {
    fn name(&self) -> &str {
        "twse"
    }

    fn fetch_month(&self, window: &FetchWindow) -> MonthFetch {
        self.fetch_with_retry(window)
    }
}

/// Parse a monthly report body.
///
/// Lines below [`MIN_FIELDS`] fields are discarded; the first remaining line
/// is the header and the rest are data rows. A body with no remaining lines
/// is an empty month. Rows with a malformed date or number are dropped and
/// logged. A header without the date, close or volume column fails with
/// [`DataError::Validation`].
pub fn parse_report(body: &str, window: &FetchWindow) -> Result<Vec<DailyRecord>, DataError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut lines = Vec::new();
    for result in reader.records() {
        match result {
            Ok(record) if record.len() >= MIN_FIELDS => lines.push(record),
            Ok(_) => {}
            Err(e) => tracing::debug!(window = %window, error = %e, "skipping unreadable line"),
        }
    }

    let Some((header, rows)) = lines.split_first() else {
        tracing::warn!(window = %window, "no data for month");
        return Ok(Vec::new());
    };

    let column = |name: &str| {
        header
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| DataError::Validation(format!("{window}: report has no '{name}' column")))
    };
    let date_idx = column(DATE_COLUMN)?;
    let close_idx = column(CLOSE_COLUMN)?;
    let volume_idx = column(VOLUME_COLUMN)?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let field = |idx: usize| row.get(idx).unwrap_or("").trim();
        let parsed = parse_roc_date(field(date_idx)).and_then(|date| {
            Ok(DailyRecord {
                date,
                close: parse_number(field(close_idx))?,
                volume: parse_number(field(volume_idx))?,
            })
        });
        match parsed {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(window = %window, error = %e, "dropping row"),
        }
    }

    Ok(records)
}

/// Parse a numeric cell: thousands separators are stripped, the no-trade
/// marker and empty cells are missing values.
fn parse_number(raw: &str) -> Result<Option<f64>, DataError> {
    let cleaned = raw.trim().replace(',', "");
    if cleaned.is_empty() || cleaned == NO_TRADE_MARKER {
        return Ok(None);
    }
    cleaned
        .parse::<f64>()
        .map(Some)
        .map_err(|_| DataError::Validation(format!("'{raw}' is not a number")))
}
