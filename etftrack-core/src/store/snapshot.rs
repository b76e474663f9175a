//! Timestamped snapshots of a series, one file per save.
//!
//! Layout: `{backup_dir}/{CODE}_{YYYYMMDD_HHMMSS}.csv`, same schema as the
//! canonical file. The fixed-width timestamp makes name order equal to age
//! order, but ordering here always goes through the parsed timestamp.

use super::format;
use crate::data::DataError;
use crate::domain::DailyRecord;
use chrono::{Duration, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const EXTENSION: &str = ".csv";

/// One snapshot file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub code: String,
    pub taken_at: NaiveDateTime,
    pub path: PathBuf,
}

/// File name of the snapshot of `code` taken at `taken_at`.
pub fn file_name(code: &str, taken_at: NaiveDateTime) -> String {
    format!("{code}_{}{EXTENSION}", taken_at.format(TIMESTAMP_FORMAT))
}

/// Timestamp of a snapshot file name belonging to `code`, or `None` when the
/// name belongs to another instrument or is not a snapshot at all.
pub fn parse_file_name(code: &str, name: &str) -> Option<NaiveDateTime> {
    let stamp = name
        .strip_prefix(code)?
        .strip_prefix('_')?
        .strip_suffix(EXTENSION)?;
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()
}

/// Snapshots of `code`, oldest first. A missing directory has none.
pub fn list(dir: &Path, code: &str) -> Result<Vec<Snapshot>, DataError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut snapshots = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(taken_at) = parse_file_name(code, name) {
            snapshots.push(Snapshot {
                code: code.to_string(),
                taken_at,
                path: entry.path(),
            });
        }
    }
    snapshots.sort_by(|a, b| a.taken_at.cmp(&b.taken_at).then_with(|| a.path.cmp(&b.path)));
    Ok(snapshots)
}

/// Delete the oldest snapshots of `code` until at most `keep` remain.
/// Returns the removed paths.
pub fn prune(dir: &Path, code: &str, keep: usize) -> Result<Vec<PathBuf>, DataError> {
    let snapshots = list(dir, code)?;
    let excess = snapshots.len().saturating_sub(keep);

    let mut removed = Vec::with_capacity(excess);
    for snap in snapshots.into_iter().take(excess) {
        fs::remove_file(&snap.path)?;
        tracing::info!(code, snapshot = %snap.path.display(), "pruned snapshot");
        removed.push(snap.path);
    }
    Ok(removed)
}

/// Write a snapshot of `records` taken at `taken_at`.
///
/// Snapshots are never overwritten: when a file for that second already
/// exists, the timestamp moves forward to the next free second.
pub fn write(
    dir: &Path,
    code: &str,
    records: &[DailyRecord],
    taken_at: NaiveDateTime,
) -> Result<Snapshot, DataError> {
    let mut taken_at = taken_at;
    let mut path = dir.join(file_name(code, taken_at));
    while path.exists() {
        tracing::debug!(code, snapshot = %path.display(), "snapshot name taken, moving to next second");
        taken_at += Duration::seconds(1);
        path = dir.join(file_name(code, taken_at));
    }
    format::write_file(&path, records)?;
    tracing::info!(code, snapshot = %path.display(), records = records.len(), "snapshot written");
    Ok(Snapshot {
        code: code.to_string(),
        taken_at,
        path,
    })
}
