//! Monthly source trait, batch progress trait, and structured error types.
//!
//! The MonthlySource trait abstracts over the remote exchange so the ingestion
//! pipeline can be driven by the real fetcher or by a scripted fake in tests.

use crate::domain::{DailyRecord, FetchWindow};
use chrono::NaiveDate;
use thiserror::Error;

/// Structured error types for ingestion and storage.
///
/// Network- and parse-level variants are absorbed close to where they occur;
/// storage-level variants abort only the save of one instrument.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("malformed date token '{0}'")]
    MalformedDate(String),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("no data available for {code} since {start}")]
    NoDataAvailable { code: String, start: NaiveDate },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl DataError {
    /// Whether the failure is worth another attempt against the remote source.
    pub fn is_transient(&self) -> bool {
        matches!(self, DataError::Remote(_))
    }
}

/// Outcome of fetching one month.
///
/// A month that exhausted its retries is not an error for the caller: it
/// degrades to an empty record set, flagged as not queryable.
#[derive(Debug, Clone, Default)]
pub struct MonthFetch {
    pub records: Vec<DailyRecord>,
    pub queryable: bool,
}

impl MonthFetch {
    pub fn answered(records: Vec<DailyRecord>) -> Self {
        Self {
            records,
            queryable: true,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            records: Vec::new(),
            queryable: false,
        }
    }
}

/// A source that serves one calendar month of daily records per request.
pub trait MonthlySource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch the records of one window. Never fails: persistent failures are
    /// logged and reported through [`MonthFetch::queryable`].
    fn fetch_month(&self, window: &FetchWindow) -> MonthFetch;
}

/// Progress callback for multi-instrument batches.
///
/// Called from worker threads, so implementations must be thread-safe.
pub trait BatchProgress: Send + Sync {
    /// Called when a worker picks up an instrument.
    fn on_start(&self, code: &str, index: usize, total: usize);

    /// Called when an instrument's fetch-and-save sequence is over.
    fn on_complete(&self, code: &str, index: usize, total: usize, outcome: &InstrumentOutcome);

    /// Called once every instrument has been attempted.
    fn on_batch_complete(&self, saved: usize, failed: usize, total: usize);
}

/// Final state of one instrument within a batch.
#[derive(Debug)]
pub enum InstrumentOutcome {
    /// Merged and written; carries the canonical record count.
    Saved { records: usize, repaired: bool },
    /// The fetch answered but produced nothing new to store.
    NoUpdate,
    Failed(DataError),
}

/// Progress reporter that emits tracing events.
pub struct LogProgress;

impl BatchProgress for LogProgress {
    fn on_start(&self, code: &str, index: usize, total: usize) {
        tracing::info!(code, "[{}/{}] fetching", index + 1, total);
    }

    fn on_complete(&self, code: &str, _index: usize, _total: usize, outcome: &InstrumentOutcome) {
        match outcome {
            InstrumentOutcome::Saved { records, repaired } => {
                tracing::info!(code, records, repaired, "saved");
            }
            InstrumentOutcome::NoUpdate => tracing::info!(code, "no new records"),
            InstrumentOutcome::Failed(e) => tracing::warn!(code, error = %e, "failed"),
        }
    }

    fn on_batch_complete(&self, saved: usize, failed: usize, total: usize) {
        tracing::info!(saved, failed, total, "batch complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_remote_errors_are_transient() {
        assert!(DataError::Remote("HTTP 503".into()).is_transient());
        assert!(!DataError::Validation("no header".into()).is_transient());
        assert!(!DataError::MalformedDate("x".into()).is_transient());
    }

    #[test]
    fn no_data_message_names_instrument() {
        let err = DataError::NoDataAvailable {
            code: "0056".into(),
            start: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        };
        assert_eq!(err.to_string(), "no data available for 0056 since 2024-03-01");
    }
}
