//! Range ingestion — turns a start date into an unmerged instrument series.
//!
//! The remote source only serves one calendar month per request, so a range
//! is split into month windows that are fetched one after another with a
//! politeness delay in between. Months that fail after retries contribute
//! nothing; the range only fails when no month could be queried at all.

use super::memo::FetchMemo;
use super::provider::{DataError, MonthlySource};
use crate::domain::{windows_for, InstrumentSeries};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;

/// Sequential month-by-month fetcher for one instrument at a time.
///
/// Shared by reference between batch workers; the only mutable state is the
/// memo, which is internally synchronized.
pub struct Ingestor {
    source: Arc<dyn MonthlySource>,
    politeness_delay: Duration,
    memo: FetchMemo,
}

impl Ingestor {
    pub fn new(source: Arc<dyn MonthlySource>, politeness_delay: Duration) -> Self {
        Self {
            source,
            politeness_delay,
            memo: FetchMemo::default(),
        }
    }

    pub fn with_memo(mut self, memo: FetchMemo) -> Self {
        self.memo = memo;
        self
    }

    /// Fetch everything from `start` through the current month.
    pub fn fetch_range(&self, code: &str, start: NaiveDate) -> Result<InstrumentSeries, DataError> {
        self.fetch_range_until(code, start, chrono::Local::now().date_naive())
    }

    /// Fetch everything from `start` through the month containing `today`.
    ///
    /// Repeated calls with the same `(code, start)` are served from the memo.
    pub fn fetch_range_until(
        &self,
        code: &str,
        start: NaiveDate,
        today: NaiveDate,
    ) -> Result<InstrumentSeries, DataError> {
        if let Some(cached) = self.memo.get(code, start) {
            tracing::debug!(code, %start, "range served from memo");
            return Ok(cached.as_ref().clone());
        }

        let series = self.fetch_uncached(code, start, today)?;
        self.memo.put(code, start, Arc::new(series.clone()));
        Ok(series)
    }

    fn fetch_uncached(
        &self,
        code: &str,
        start: NaiveDate,
        today: NaiveDate,
    ) -> Result<InstrumentSeries, DataError> {
        let windows = windows_for(code, start, today);
        let mut collected = Vec::new();
        let mut queryable = 0usize;

        for (i, window) in windows.iter().enumerate() {
            if i > 0 && !self.politeness_delay.is_zero() {
                std::thread::sleep(self.politeness_delay);
            }
            tracing::info!(window = %window, source = self.source.name(), "fetching month");

            let fetched = self.source.fetch_month(window);
            if fetched.queryable {
                queryable += 1;
            } else {
                tracing::warn!(window = %window, "month unavailable, continuing");
            }
            collected.extend(fetched.records);
        }

        if queryable == 0 && collected.is_empty() {
            return Err(DataError::NoDataAvailable {
                code: code.to_string(),
                start,
            });
        }

        collected.retain(|r| r.date >= start);
        let series = InstrumentSeries::from_records(code, collected);
        tracing::info!(
            code,
            months = windows.len(),
            queryable,
            records = series.len(),
            "range fetched"
        );
        Ok(series)
    }
}
