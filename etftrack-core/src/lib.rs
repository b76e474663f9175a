//! etftrack core: a local daily time-series store for exchange-traded funds.
//!
//! - Domain types (daily records, instrument series, fetch windows)
//! - Ingestion from the exchange's monthly report endpoint, with retries,
//!   politeness delays, and a bounded batch pool
//! - Integrity checks and automatic repair
//! - CSV storage with merge, versioned snapshots, and atomic writes
//! - Integrity reports over stored series

pub mod config;
pub mod data;
pub mod domain;
pub mod quality;
pub mod report;
pub mod store;

pub use config::TrackerConfig;
