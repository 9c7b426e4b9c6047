//! Shared constants and small helpers for the detectors

use chrono::{DateTime, Utc};

/// Candles dropped from the end of a sequence by default (the forming period)
pub const DEFAULT_IGNORE_CANDLES: usize = 1;

/// Gap tolerated between consecutive daily candles inside a merge group
pub const DAILY_MAX_GAP_DAYS: i64 = 1;

/// Tolerance used when checking whether a range high/low was tested (0.001%)
pub const DEFAULT_RANGE_TOLERANCE_PERCENT: f64 = 0.001;

/// Whole calendar days between two timestamps, by UTC date.
#[inline]
pub fn calendar_day_gap(earlier: DateTime<Utc>, later: DateTime<Utc>) -> i64 {
    later
        .date_naive()
        .signed_duration_since(earlier.date_naive())
        .num_days()
}
