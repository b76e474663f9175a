//! Remote ingestion: calendar conversion, page fetching, range and batch fetches.

pub mod calendar;
pub mod download;
pub mod ingest;
pub mod memo;
pub mod provider;
pub mod transport;
pub mod twse;

pub use calendar::{format_roc_date, parse_roc_date};
pub use download::{fetch_all, fetch_all_until, BatchSummary, FetchRequest};
pub use ingest::Ingestor;
pub use memo::FetchMemo;
pub use provider::{
    BatchProgress, DataError, InstrumentOutcome, LogProgress, MonthFetch, MonthlySource,
};
pub use transport::{PageResponse, PageTransport, ReqwestTransport};
pub use twse::{FetchPolicy, TwseProvider};
