//! Store-level behaviour across repeated saves: merge precedence, snapshot
//! retention, failure isolation and CSV import.

use chrono::{NaiveDate, NaiveDateTime};
use etftrack_core::data::DataError;
use etftrack_core::domain::{DailyRecord, InstrumentSeries};
use etftrack_core::store::{CsvStore, BACKUP_DIR};
use std::fs;

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

fn at(minute: u32) -> NaiveDateTime {
    d(31).and_hms_opt(15, minute, 0).unwrap()
}

/// Consecutive days with a gentle trend: no gaps and no outliers.
fn clean_series(code: &str, days: std::ops::RangeInclusive<u32>) -> InstrumentSeries {
    let records = days
        .map(|day| DailyRecord::new(d(day), 100.0 + day as f64 * 0.5, 1_000.0 * day as f64))
        .collect();
    InstrumentSeries::from_records(code, records)
}

#[test]
fn saving_the_same_batch_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path(), 5).unwrap();
    let batch = clean_series("0050", 1..=10);

    let first = store.save_at("0050", &batch, at(0)).unwrap();
    let after_first = fs::read(store.canonical_path("0050")).unwrap();
    let second = store.save_at("0050", &batch, at(1)).unwrap();
    let after_second = fs::read(store.canonical_path("0050")).unwrap();

    assert!(!first.repaired);
    assert_eq!(first.added, 10);
    assert_eq!(second.added, 0);
    assert_eq!(after_first, after_second);
}

#[test]
fn stored_values_win_over_incoming_on_shared_dates() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path(), 5).unwrap();
    store
        .save_at("0056", &clean_series("0056", 1..=5), at(0))
        .unwrap();

    let revised = InstrumentSeries::from_records(
        "0056",
        vec![
            DailyRecord::new(d(5), 999.0, 1.0),
            DailyRecord::new(d(6), 103.0, 6_000.0),
        ],
    );
    let report = store.save_at("0056", &revised, at(1)).unwrap();

    let stored = store.load("0056");
    assert_eq!(report.added, 1);
    assert_eq!(stored.len(), 6);
    assert_eq!(stored.records[4].close, Some(102.5));
    assert_eq!(stored.records[5].close, Some(103.0));
}

#[test]
fn snapshots_never_exceed_the_retention_limit() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path(), 3).unwrap();

    for (i, day) in (1..=6).enumerate() {
        let batch = clean_series("0050", 1..=day);
        store.save_at("0050", &batch, at(i as u32)).unwrap();
        assert!(store.snapshots("0050").unwrap().len() <= 3);
    }

    let snaps = store.snapshots("0050").unwrap();
    let times: Vec<NaiveDateTime> = snaps.iter().map(|s| s.taken_at).collect();
    assert_eq!(times, vec![at(3), at(4), at(5)]);
    assert_eq!(store.status("0050").snapshots, 3);
}

#[test]
fn snapshot_holds_the_series_that_was_written() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path(), 3).unwrap();

    let report = store
        .save_at("0050", &clean_series("0050", 1..=4), at(0))
        .unwrap();

    assert_eq!(
        fs::read(&report.snapshot).unwrap(),
        fs::read(store.canonical_path("0050")).unwrap()
    );
}

#[test]
fn rejected_batch_leaves_canonical_file_and_snapshots_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path(), 3).unwrap();
    store
        .save_at("0050", &clean_series("0050", 1..=5), at(0))
        .unwrap();
    let before = fs::read(store.canonical_path("0050")).unwrap();

    let bad = InstrumentSeries {
        code: "0050".into(),
        records: vec![
            DailyRecord::new(d(6), -1.0, 10.0),
            DailyRecord::new(d(7), 100.0, -5.0),
        ],
    };
    let err = store.save_at("0050", &bad, at(1)).unwrap_err();

    assert!(matches!(err, DataError::Validation(_)));
    assert_eq!(fs::read(store.canonical_path("0050")).unwrap(), before);
    assert_eq!(store.snapshots("0050").unwrap().len(), 1);
}

#[test]
fn snapshot_failure_leaves_canonical_file_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path(), 3).unwrap();
    store
        .save_at("0050", &clean_series("0050", 1..=5), at(0))
        .unwrap();
    let before = fs::read(store.canonical_path("0050")).unwrap();

    // a plain file where the backup directory should be
    let backups = dir.path().join(BACKUP_DIR);
    fs::remove_dir_all(&backups).unwrap();
    fs::write(&backups, "not a directory").unwrap();

    let err = store
        .save_at("0050", &clean_series("0050", 1..=8), at(1))
        .unwrap_err();

    assert!(matches!(err, DataError::Io(_)));
    assert_eq!(fs::read(store.canonical_path("0050")).unwrap(), before);
}

#[test]
fn saves_within_one_second_keep_every_retained_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path(), 2).unwrap();

    store
        .save_at("0050", &clean_series("0050", 1..=2), at(0))
        .unwrap();
    let second = store
        .save_at("0050", &clean_series("0050", 1..=3), at(1))
        .unwrap();
    let second_bytes = fs::read(&second.snapshot).unwrap();
    let third = store
        .save_at("0050", &clean_series("0050", 1..=4), at(1))
        .unwrap();

    let snaps = store.snapshots("0050").unwrap();
    assert_eq!(snaps.len(), 2);
    assert_eq!(snaps[0].path, second.snapshot);
    assert_eq!(snaps[1].path, third.snapshot);
    assert_eq!(fs::read(&second.snapshot).unwrap(), second_bytes);
}

#[test]
fn partially_invalid_batch_keeps_the_valid_rows() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path(), 3).unwrap();

    let batch = InstrumentSeries {
        code: "0050".into(),
        records: vec![
            DailyRecord::new(d(1), 100.0, 10.0),
            DailyRecord::new(d(2), 0.0, 10.0),
            DailyRecord::new(d(3), 101.0, 12.0),
        ],
    };
    let report = store.save_at("0050", &batch, at(0)).unwrap();

    assert_eq!(report.rejected, 1);
    let dates: Vec<NaiveDate> = store.load("0050").records.iter().map(|r| r.date).collect();
    assert_eq!(dates, vec![d(1), d(3)]);
}

#[test]
fn instruments_are_stored_independently() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path(), 3).unwrap();

    store
        .save_at("0050", &clean_series("0050", 1..=3), at(0))
        .unwrap();
    store
        .save_at("00878", &clean_series("00878", 1..=7), at(0))
        .unwrap();

    assert_eq!(store.load("0050").len(), 3);
    assert_eq!(store.load("00878").len(), 7);
    assert!(dir.path().join("0050.csv").exists());
    assert!(dir.path().join("00878.csv").exists());
}

#[test]
fn import_merges_a_plain_csv_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path().join("data"), 3).unwrap();
    store
        .save_at("0050", &clean_series("0050", 1..=2), at(0))
        .unwrap();

    let source = dir.path().join("legacy.csv");
    fs::write(
        &source,
        "Date,Close,Volume\n2024-03-02,555,1\n2024-03-03,101.5,3000\n2024-03-04,102,4000\n",
    )
    .unwrap();

    let report = store.import_csv("0050", &source).unwrap();

    assert_eq!(report.added, 2);
    let stored = store.load("0050");
    assert_eq!(stored.len(), 4);
    assert_eq!(stored.records[1].close, Some(101.0));
    assert_eq!(stored.records[3].volume, Some(4_000.0));
}

#[test]
fn import_of_a_file_without_required_columns_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsvStore::new(dir.path().join("data"), 3).unwrap();
    let source = dir.path().join("bad.csv");
    fs::write(&source, "Day,Price\n2024-03-01,100\n").unwrap();

    let err = store.import_csv("0050", &source).unwrap_err();

    assert!(matches!(err, DataError::Validation(_)));
    assert!(!store.canonical_path("0050").exists());
}
