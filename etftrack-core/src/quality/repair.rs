//! Repair engine — value-only fixes for a defective series.
//!
//! Three passes, in order:
//! 1. time-weighted interpolation of missing values
//! 2. rolling-mean replacement of close prices outside the IQR fence
//! 3. forward fill of zero volumes
//!
//! Dates and row count are never changed.

use super::stats::iqr_bounds;
use crate::domain::{DailyRecord, Field, InstrumentSeries};
use serde::Serialize;

/// Trailing window for outlier replacement, current record included.
pub const ROLLING_WINDOW: usize = 5;

/// What a repair pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepairSummary {
    pub interpolated: usize,
    pub outliers_replaced: usize,
    pub volumes_filled: usize,
}

impl RepairSummary {
    pub fn changed(&self) -> bool {
        self.interpolated + self.outliers_replaced + self.volumes_filled > 0
    }
}

/// Repair a copy of `series`.
pub fn repair(series: &InstrumentSeries) -> InstrumentSeries {
    repair_with_summary(series).0
}

/// Repair a copy of `series` and report what changed.
pub fn repair_with_summary(series: &InstrumentSeries) -> (InstrumentSeries, RepairSummary) {
    let mut repaired = series.clone();
    repaired.records.sort_by_key(|r| r.date);
    let mut summary = RepairSummary::default();

    if repaired.is_empty() {
        return (repaired, summary);
    }

    for field in Field::ALL {
        summary.interpolated += interpolate_time(&mut repaired.records, field);
    }
    summary.outliers_replaced = replace_outliers(&mut repaired.records);
    summary.volumes_filled = fill_zero_volume(&mut repaired.records);

    (repaired, summary)
}

/// Fill missing values of `field` linearly in elapsed days between the
/// neighbouring known values. Trailing gaps take the last known value;
/// leading gaps stay missing. Returns the number of values filled.
fn interpolate_time(records: &mut [DailyRecord], field: Field) -> usize {
    let mut filled = 0;
    let mut prev: Option<usize> = None;
    let mut i = 0;

    while i < records.len() {
        if records[i].get(field).is_some() {
            prev = Some(i);
            i += 1;
            continue;
        }

        let run_end = (i..records.len())
            .find(|&j| records[j].get(field).is_some())
            .unwrap_or(records.len());

        if let Some(p) = prev {
            let left_date = records[p].date;
            let left = records[p].get(field).unwrap_or_default();
            let right = records
                .get(run_end)
                .and_then(|r| r.get(field).map(|v| (r.date, v)));

            for rec in &mut records[i..run_end] {
                let value = match right {
                    Some((right_date, right_val)) => {
                        let span = (right_date - left_date).num_days() as f64;
                        let elapsed = (rec.date - left_date).num_days() as f64;
                        left + (right_val - left) * elapsed / span
                    }
                    None => left,
                };
                *rec.get_mut(field) = Some(value);
                filled += 1;
            }
        }

        i = run_end;
    }

    filled
}

/// Mean of the present closes in the window ending at each index.
fn rolling_close_means(records: &[DailyRecord]) -> Vec<Option<f64>> {
    (0..records.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(ROLLING_WINDOW);
            let present: Vec<f64> = records[start..=i].iter().filter_map(|r| r.close).collect();
            if present.is_empty() {
                None
            } else {
                Some(present.iter().sum::<f64>() / present.len() as f64)
            }
        })
        .collect()
}

/// Replace closes above the fence, then closes below it, each with the
/// trailing rolling mean computed just before that pass.
fn replace_outliers(records: &mut [DailyRecord]) -> usize {
    let closes: Vec<Option<f64>> = records.iter().map(|r| r.close).collect();
    let Some(bounds) = iqr_bounds(&closes) else {
        return 0;
    };

    replace_where(records, |c| c > bounds.upper) + replace_where(records, |c| c < bounds.lower)
}

fn replace_where(records: &mut [DailyRecord], out_of_bounds: impl Fn(f64) -> bool) -> usize {
    let means = rolling_close_means(records);
    let mut replaced = 0;
    for (rec, mean) in records.iter_mut().zip(means) {
        if let (Some(close), Some(mean)) = (rec.close, mean) {
            if out_of_bounds(close) {
                rec.close = Some(mean);
                replaced += 1;
            }
        }
    }
    replaced
}

/// Carry the latest non-zero volume over zero-volume days. A zero with no
/// earlier non-zero volume is left as is.
fn fill_zero_volume(records: &mut [DailyRecord]) -> usize {
    let mut last_nonzero: Option<f64> = None;
    let mut filled = 0;
    for rec in records.iter_mut() {
        match rec.volume {
            Some(v) if v == 0.0 => {
                if let Some(prev) = last_nonzero {
                    rec.volume = Some(prev);
                    filled += 1;
                }
            }
            Some(v) => last_nonzero = Some(v),
            None => {}
        }
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn rec(day: u32, close: Option<f64>, volume: Option<f64>) -> DailyRecord {
        DailyRecord {
            date: d(day),
            close,
            volume,
        }
    }

    fn series(records: Vec<DailyRecord>) -> InstrumentSeries {
        InstrumentSeries::from_records("0050", records)
    }

    #[test]
    fn interpolation_is_weighted_by_elapsed_days() {
        // 10 on day 1, missing on day 2, 40 on day 4: one third of the way
        let out = repair(&series(vec![
            rec(1, Some(10.0), Some(1.0)),
            rec(2, None, Some(1.0)),
            rec(4, Some(40.0), Some(1.0)),
        ]));
        assert!((out.records[1].close.unwrap() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn trailing_gap_carries_last_value_and_leading_gap_stays() {
        let out = repair(&series(vec![
            rec(1, None, Some(1.0)),
            rec(2, Some(10.0), Some(1.0)),
            rec(3, Some(11.0), Some(1.0)),
            rec(4, None, Some(1.0)),
        ]));
        assert_eq!(out.records[0].close, None);
        assert_eq!(out.records[3].close, Some(11.0));
    }

    #[test]
    fn zero_volume_is_forward_filled() {
        let out = repair(&series(vec![
            rec(1, Some(10.0), Some(5.0)),
            rec(2, Some(10.0), Some(0.0)),
            rec(3, Some(10.0), Some(7.0)),
        ]));
        let volumes: Vec<_> = out.records.iter().map(|r| r.volume).collect();
        assert_eq!(volumes, vec![Some(5.0), Some(5.0), Some(7.0)]);
    }

    #[test]
    fn leading_zero_volume_is_left_alone() {
        let out = repair(&series(vec![
            rec(1, Some(10.0), Some(0.0)),
            rec(2, Some(10.0), Some(3.0)),
        ]));
        assert_eq!(out.records[0].volume, Some(0.0));
    }

    #[test]
    fn outlier_is_replaced_by_trailing_mean() {
        let out = repair(&series(vec![
            rec(1, Some(10.0), Some(1.0)),
            rec(2, Some(10.0), Some(1.0)),
            rec(3, Some(10.0), Some(1.0)),
            rec(4, Some(10.0), Some(1.0)),
            rec(5, Some(100.0), Some(1.0)),
        ]));
        // mean of the five-record window including the outlier itself
        assert!((out.records[4].close.unwrap() - 28.0).abs() < 1e-9);
        assert_eq!(out.records[0].close, Some(10.0));
    }

    #[test]
    fn short_window_at_series_start_uses_what_exists() {
        let records = vec![rec(1, Some(4.0), None), rec(2, Some(8.0), None)];
        let means = rolling_close_means(&records);
        assert_eq!(means, vec![Some(4.0), Some(6.0)]);
    }

    #[test]
    fn dates_and_length_are_preserved() {
        let input = series(vec![
            rec(1, Some(10.0), Some(0.0)),
            rec(3, None, None),
            rec(8, Some(500.0), Some(2.0)),
            rec(9, Some(11.0), Some(0.0)),
        ]);
        let (out, summary) = repair_with_summary(&input);

        let before: Vec<_> = input.records.iter().map(|r| r.date).collect();
        let after: Vec<_> = out.records.iter().map(|r| r.date).collect();
        assert_eq!(before, after);
        assert!(summary.changed());
    }

    #[test]
    fn empty_series_is_untouched() {
        let (out, summary) = repair_with_summary(&InstrumentSeries::empty("0050"));
        assert!(out.is_empty());
        assert!(!summary.changed());
    }
}
