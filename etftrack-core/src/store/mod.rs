//! Persistent per-instrument storage with versioned snapshots.

pub mod csv_store;
pub mod format;
pub mod snapshot;

pub use csv_store::{CsvStore, SaveReport, StoreStatus, BACKUP_DIR};
pub use snapshot::Snapshot;
