//! Batch orchestrator — fetches and saves many instruments on a bounded pool.
//!
//! Each worker runs the whole fetch → save sequence for one instrument. The
//! call blocks until every instrument has been attempted; one instrument's
//! failure never cancels another.

use super::ingest::Ingestor;
use super::provider::{BatchProgress, DataError, InstrumentOutcome};
use crate::store::CsvStore;
use chrono::NaiveDate;
use rayon::prelude::*;

/// One instrument to fetch from `start` onwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub code: String,
    pub start: NaiveDate,
}

impl FetchRequest {
    pub fn new(code: impl Into<String>, start: NaiveDate) -> Self {
        Self {
            code: code.into(),
            start,
        }
    }
}

/// Fetch and save every request, with at most `max_concurrency` instruments
/// in flight.
pub fn fetch_all(
    ingestor: &Ingestor,
    store: &CsvStore,
    requests: &[FetchRequest],
    max_concurrency: usize,
    progress: &dyn BatchProgress,
) -> Result<BatchSummary, DataError> {
    let today = chrono::Local::now().date_naive();
    fetch_all_until(ingestor, store, requests, max_concurrency, today, progress)
}

/// [`fetch_all`] with an explicit end-of-range date.
pub fn fetch_all_until(
    ingestor: &Ingestor,
    store: &CsvStore,
    requests: &[FetchRequest],
    max_concurrency: usize,
    today: NaiveDate,
    progress: &dyn BatchProgress,
) -> Result<BatchSummary, DataError> {
    if max_concurrency == 0 {
        return Err(DataError::Config("max_concurrency must be at least 1".into()));
    }
    let total = requests.len();
    if total == 0 {
        progress.on_batch_complete(0, 0, 0);
        return Ok(BatchSummary::default());
    }

    let workers = max_concurrency.min(total);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| DataError::Config(format!("failed to build worker pool: {e}")))?;
    tracing::info!(instruments = total, workers, "starting batch");

    let outcomes: Vec<(String, InstrumentOutcome)> = pool.install(|| {
        requests
            .par_iter()
            .enumerate()
            .map(|(i, req)| {
                progress.on_start(&req.code, i, total);
                let outcome = fetch_and_save(ingestor, store, req, today);
                progress.on_complete(&req.code, i, total, &outcome);
                (req.code.clone(), outcome)
            })
            .collect()
    });

    let summary = BatchSummary::from_outcomes(outcomes);
    progress.on_batch_complete(summary.saved, summary.failed, summary.total);
    Ok(summary)
}

/// Fetch one instrument and hand the result to the store.
fn fetch_and_save(
    ingestor: &Ingestor,
    store: &CsvStore,
    req: &FetchRequest,
    today: NaiveDate,
) -> InstrumentOutcome {
    let series = match ingestor.fetch_range_until(&req.code, req.start, today) {
        Ok(series) => series,
        Err(e @ DataError::NoDataAvailable { .. }) => {
            tracing::warn!(code = %req.code, error = %e, "no data, skipping save");
            return InstrumentOutcome::NoUpdate;
        }
        Err(e) => return InstrumentOutcome::Failed(e),
    };

    if series.is_empty() {
        tracing::info!(code = %req.code, start = %req.start, "no records since start, skipping save");
        return InstrumentOutcome::NoUpdate;
    }

    match store.save(&req.code, &series) {
        Ok(report) => InstrumentOutcome::Saved {
            records: report.records,
            repaired: report.repaired,
        },
        Err(e) => InstrumentOutcome::Failed(e),
    }
}

/// Summary of a batch.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub saved: usize,
    pub no_update: usize,
    pub failed: usize,
    /// Per-instrument outcomes in request order.
    pub outcomes: Vec<(String, InstrumentOutcome)>,
}

impl BatchSummary {
    fn from_outcomes(outcomes: Vec<(String, InstrumentOutcome)>) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Self::default()
        };
        for (_, outcome) in &outcomes {
            match outcome {
                InstrumentOutcome::Saved { .. } => summary.saved += 1,
                InstrumentOutcome::NoUpdate => summary.no_update += 1,
                InstrumentOutcome::Failed(_) => summary.failed += 1,
            }
        }
        summary.outcomes = outcomes;
        summary
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Failed instruments with their errors.
    pub fn errors(&self) -> impl Iterator<Item = (&str, &DataError)> {
        self.outcomes.iter().filter_map(|(code, outcome)| match outcome {
            InstrumentOutcome::Failed(e) => Some((code.as_str(), e)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::{MonthFetch, MonthlySource};
    use crate::domain::{DailyRecord, FetchWindow};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Answers every month with two trading days, except for codes in
    /// `broken`, whose months all fail.
    struct FakeSource {
        broken: Vec<&'static str>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeSource {
        fn new(broken: Vec<&'static str>) -> Self {
            Self {
                broken,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    impl MonthlySource for FakeSource {
        fn name(&self) -> &str {
            "fake"
        }

        fn fetch_month(&self, window: &FetchWindow) -> MonthFetch {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.broken.contains(&window.code.as_str()) {
                return MonthFetch::unavailable();
            }
            let first = window.month_start;
            MonthFetch::answered(vec![
                DailyRecord::new(first, 10.0, 100.0),
                DailyRecord::new(first.succ_opt().unwrap(), 10.5, 120.0),
            ])
        }
    }

    #[derive(Default)]
    struct Recorder {
        started: Mutex<Vec<String>>,
        finished: Mutex<Option<(usize, usize, usize)>>,
    }

    impl BatchProgress for Recorder {
        fn on_start(&self, code: &str, _index: usize, _total: usize) {
            self.started.lock().unwrap().push(code.to_string());
        }
        fn on_complete(&self, _: &str, _: usize, _: usize, _: &InstrumentOutcome) {}
        fn on_batch_complete(&self, saved: usize, failed: usize, total: usize) {
            *self.finished.lock().unwrap() = Some((saved, failed, total));
        }
    }

    fn requests(codes: &[&str]) -> Vec<FetchRequest> {
        codes
            .iter()
            .map(|c| FetchRequest::new(*c, ymd(2024, 1, 1)))
            .collect()
    }

    #[test]
    fn failures_do_not_stop_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path(), 5).unwrap();
        let ingestor = Ingestor::new(Arc::new(FakeSource::new(vec!["BAD"])), Duration::ZERO);
        let progress = Recorder::default();

        let summary = fetch_all_until(
            &ingestor,
            &store,
            &requests(&["0050", "BAD", "0056"]),
            2,
            ymd(2024, 2, 15),
            &progress,
        )
        .unwrap();

        assert_eq!(summary.total, 3);
        assert_eq!(summary.saved, 2);
        assert_eq!(summary.no_update, 1);
        assert_eq!(summary.outcomes[1].0, "BAD");
        assert_eq!(store.load("0050").len(), 4);
        assert!(store.load("BAD").is_empty());
        assert_eq!(progress.started.lock().unwrap().len(), 3);
        assert_eq!(*progress.finished.lock().unwrap(), Some((2, 0, 3)));
    }

    #[test]
    fn concurrency_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path(), 5).unwrap();
        let source = Arc::new(FakeSource::new(vec![]));
        let ingestor = Ingestor::new(source.clone(), Duration::ZERO);
        let codes: Vec<String> = (0..8).map(|i| format!("00{i}")).collect();
        let reqs: Vec<FetchRequest> = codes
            .iter()
            .map(|c| FetchRequest::new(c.as_str(), ymd(2024, 1, 1)))
            .collect();

        let summary = fetch_all_until(
            &ingestor,
            &store,
            &reqs,
            3,
            ymd(2024, 1, 20),
            &Recorder::default(),
        )
        .unwrap();

        assert_eq!(summary.saved, 8);
        assert!(source.peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn empty_request_list_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path(), 5).unwrap();
        let ingestor = Ingestor::new(Arc::new(FakeSource::new(vec![])), Duration::ZERO);

        let summary = fetch_all_until(
            &ingestor,
            &store,
            &[],
            4,
            ymd(2024, 1, 20),
            &Recorder::default(),
        )
        .unwrap();

        assert_eq!(summary.total, 0);
        assert!(summary.all_succeeded());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path(), 5).unwrap();
        let ingestor = Ingestor::new(Arc::new(FakeSource::new(vec![])), Duration::ZERO);

        let result = fetch_all_until(
            &ingestor,
            &store,
            &requests(&["0050"]),
            0,
            ymd(2024, 1, 20),
            &Recorder::default(),
        );

        assert!(matches!(result, Err(DataError::Config(_))));
    }
}
