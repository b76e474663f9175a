//! Storage manager — the only sanctioned read and write path for series.
//!
//! Layout: `{data_dir}/{CODE}.csv` for the canonical series and
//! `{data_dir}/backups/` for snapshots.
//!
//! Save sequence: validate → normalize → merge (stored values win) →
//! integrity check → optional repair → prune snapshots → write snapshot →
//! atomically replace the canonical file. The canonical write is last, so a
//! failure at any earlier step leaves the stored series untouched.

use super::format;
use super::snapshot::{self, Snapshot};
use crate::data::DataError;
use crate::domain::{sort_dedup_first, DailyRecord, Field, InstrumentSeries};
use crate::quality::{self, IntegrityReport, RepairSummary};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const BACKUP_DIR: &str = "backups";

/// Outcome of a successful save.
#[derive(Debug, Clone)]
pub struct SaveReport {
    pub code: String,
    /// Records in the canonical file after the save.
    pub records: usize,
    /// Dates that were not stored before.
    pub added: usize,
    /// Incoming rows dropped for violating value invariants.
    pub rejected: usize,
    /// Integrity of the merged series before any repair.
    pub integrity: IntegrityReport,
    pub repaired: bool,
    pub repair: RepairSummary,
    pub snapshot: PathBuf,
    pub pruned: usize,
}

/// Stored state of one instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStatus {
    pub code: String,
    pub records: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub snapshots: usize,
}

/// CSV-backed per-instrument store.
#[derive(Debug, Clone)]
pub struct CsvStore {
    data_dir: PathBuf,
    backup_dir: PathBuf,
    max_backups: usize,
}

impl CsvStore {
    /// Store rooted at `data_dir`, retaining at most `max_backups` snapshots
    /// per instrument.
    pub fn new(data_dir: impl Into<PathBuf>, max_backups: usize) -> Result<Self, DataError> {
        if max_backups == 0 {
            return Err(DataError::Config("max_backups must be at least 1".into()));
        }
        let data_dir = data_dir.into();
        let backup_dir = data_dir.join(BACKUP_DIR);
        Ok(Self {
            data_dir,
            backup_dir,
            max_backups,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the canonical file: `{data_dir}/{CODE}.csv`.
    pub fn canonical_path(&self, code: &str) -> PathBuf {
        self.data_dir.join(format!("{code}.csv"))
    }

    /// Merge `incoming` into the stored series for `code`.
    pub fn save(&self, code: &str, incoming: &InstrumentSeries) -> Result<SaveReport, DataError> {
        self.save_at(code, incoming, chrono::Local::now().naive_local())
    }

    /// [`save`](Self::save) with an explicit snapshot timestamp.
    pub fn save_at(
        &self,
        code: &str,
        incoming: &InstrumentSeries,
        now: NaiveDateTime,
    ) -> Result<SaveReport, DataError> {
        self.save_records(code, incoming.records.clone(), now)
            .map_err(|e| log_save_failure(code, e))
    }

    fn save_records(
        &self,
        code: &str,
        incoming: Vec<DailyRecord>,
        now: NaiveDateTime,
    ) -> Result<SaveReport, DataError> {
        validate_batch(&incoming)?;
        let (incoming, rejected) = normalize(code, incoming)?;

        let existing = self.read_existing(code)?;
        let existing_len = existing.len();
        let mut combined = existing;
        combined.extend(incoming);
        let merged = InstrumentSeries::from_records(code, combined);
        let added = merged.len() - existing_len;

        let integrity = quality::check(&merged);
        let (series, repair) = if integrity.needs_repair() {
            tracing::info!(
                code,
                gaps = integrity.date_gaps.len(),
                outliers = integrity.outliers.len(),
                missing = integrity.total_missing(),
                "integrity issues found, repairing"
            );
            quality::repair_with_summary(&merged)
        } else {
            (merged, RepairSummary::default())
        };

        let pruned = snapshot::prune(&self.backup_dir, code, self.max_backups - 1)?;
        let snap: Snapshot = snapshot::write(&self.backup_dir, code, &series.records, now)?;
        format::write_file(&self.canonical_path(code), &series.records)?;

        tracing::info!(code, records = series.len(), added, "canonical series written");
        Ok(SaveReport {
            code: code.to_string(),
            records: series.len(),
            added,
            rejected,
            repaired: integrity.needs_repair(),
            integrity,
            repair,
            snapshot: snap.path,
            pruned: pruned.len(),
        })
    }

    /// Stored records for the merge step. Absence is an empty series; an
    /// unreadable file fails the save rather than being overwritten.
    fn read_existing(&self, code: &str) -> Result<Vec<DailyRecord>, DataError> {
        let path = self.canonical_path(code);
        if !path.exists() {
            return Ok(Vec::new());
        }
        Ok(sort_dedup_first(format::read_file(&path)?))
    }

    /// Stored series for readers.
    ///
    /// Never fails: a missing or unreadable file yields an empty series and a
    /// log event. Remaining gaps are forward- then back-filled.
    pub fn load(&self, code: &str) -> InstrumentSeries {
        let path = self.canonical_path(code);
        if !path.exists() {
            tracing::warn!(code, path = %path.display(), "no stored series, returning empty");
            return InstrumentSeries::empty(code);
        }

        match format::read_file(&path) {
            Ok(records) => {
                let mut series = InstrumentSeries::from_records(code, records);
                fill_for_readers(&mut series.records);
                series
            }
            Err(e) => {
                tracing::error!(code, path = %path.display(), error = %e, "failed to load series");
                InstrumentSeries::empty(code)
            }
        }
    }

    /// Feed a `Date,Close,Volume` file through the save path.
    pub fn import_csv(&self, code: &str, path: &Path) -> Result<SaveReport, DataError> {
        let records = format::read_file(path).map_err(|e| {
            tracing::error!(code, path = %path.display(), error = %e, "import failed");
            e
        })?;
        self.save_records(code, records, chrono::Local::now().naive_local())
            .map_err(|e| log_save_failure(code, e))
    }

    /// Snapshots of `code`, oldest first.
    pub fn snapshots(&self, code: &str) -> Result<Vec<Snapshot>, DataError> {
        snapshot::list(&self.backup_dir, code)
    }

    pub fn status(&self, code: &str) -> StoreStatus {
        let series = self.load(code);
        let snapshots = match self.snapshots(code) {
            Ok(s) => s.len(),
            Err(e) => {
                tracing::warn!(code, error = %e, "could not list snapshots");
                0
            }
        };
        StoreStatus {
            code: code.to_string(),
            records: series.len(),
            first_date: series.first_date(),
            last_date: series.last_date(),
            snapshots,
        }
    }
}

fn log_save_failure(code: &str, e: DataError) -> DataError {
    tracing::error!(code, error = %e, "save failed, stored series untouched");
    e
}

/// Batch-level rejection: empty batches and batches with repeated dates.
fn validate_batch(records: &[DailyRecord]) -> Result<(), DataError> {
    if records.is_empty() {
        return Err(DataError::Validation("incoming batch is empty".into()));
    }
    let mut seen = HashSet::with_capacity(records.len());
    if let Some(dup) = records.iter().find(|r| !seen.insert(r.date)) {
        return Err(DataError::Validation(format!(
            "incoming batch repeats date {}",
            dup.date
        )));
    }
    Ok(())
}

/// Drop rows that break value invariants, then sort. Fails when nothing
/// survives.
fn normalize(code: &str, records: Vec<DailyRecord>) -> Result<(Vec<DailyRecord>, usize), DataError> {
    let total = records.len();
    let kept: Vec<DailyRecord> = records
        .into_iter()
        .filter(|r| match r.check_values() {
            Ok(()) => true,
            Err(reason) => {
                tracing::warn!(code, %reason, "dropping invalid record");
                false
            }
        })
        .collect();

    if kept.is_empty() {
        return Err(DataError::Validation(format!(
            "all {total} incoming records are invalid"
        )));
    }
    let rejected = total - kept.len();
    Ok((sort_dedup_first(kept), rejected))
}

/// Forward fill, then back fill, every numeric field.
fn fill_for_readers(records: &mut [DailyRecord]) {
    for field in Field::ALL {
        let mut last = None;
        for rec in records.iter_mut() {
            match rec.get(field) {
                Some(v) => last = Some(v),
                None => *rec.get_mut(field) = last,
            }
        }
        let mut next = None;
        for rec in records.iter_mut().rev() {
            match rec.get(field) {
                Some(v) => next = Some(v),
                None => *rec.get_mut(field) = next,
            }
        }
    }
}
