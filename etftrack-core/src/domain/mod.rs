//! Domain types: daily records, instrument series, fetch windows.

pub mod record;
pub mod window;

pub use record::{sort_dedup_first, DailyRecord, Field, InstrumentSeries};
pub use window::{first_of_month, month_starts, windows_for, FetchWindow};
