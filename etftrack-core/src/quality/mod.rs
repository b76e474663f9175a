//! Data quality: integrity scanning and automatic repair.

pub mod integrity;
pub mod repair;
pub mod stats;

pub use integrity::{check, DateGap, IntegrityReport};
pub use repair::{repair, repair_with_summary, RepairSummary};
pub use stats::{iqr_bounds, quantile, Bounds, IQR_MULTIPLIER};
