//! Order statistics shared by the integrity checker and the repair engine.

use serde::Serialize;

/// Width of the outlier fence in interquartile ranges.
///
/// Three IQRs rather than the textbook 1.5 so that only extreme prints are
/// flagged.
pub const IQR_MULTIPLIER: f64 = 3.0;

/// Quantile of an ascending slice with linear interpolation between the
/// closest ranks. Returns `None` for an empty slice.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Closed acceptance interval for a value series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

impl Bounds {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// `[Q1 - 3*IQR, Q3 + 3*IQR]` over the present values. Missing and
/// non-finite entries are ignored; `None` when nothing is left.
pub fn iqr_bounds(values: &[Option<f64>]) -> Option<Bounds> {
    let mut present: Vec<f64> = values
        .iter()
        .flatten()
        .copied()
        .filter(|v| v.is_finite())
        .collect();
    present.sort_by(f64::total_cmp);

    let q1 = quantile(&present, 0.25)?;
    let q3 = quantile(&present, 0.75)?;
    let iqr = q3 - q1;
    Some(Bounds {
        lower: q1 - IQR_MULTIPLIER * iqr,
        upper: q3 + IQR_MULTIPLIER * iqr,
    })
}
