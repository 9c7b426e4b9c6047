//! Candle merging
//!
//! Turns an ordered candle sequence into two adjacent merged periods:
//!
//! ```text
//!   [ ... | MC1 group (n) | MC2 group (n) | ignored (k) ]
//! ```
//!
//! A group whose consecutive candles are more than `max_gap_days` calendar days
//! apart is not aggregated; its merged candle is the group's last raw candle.

use tracing::debug;

use super::helpers::{calendar_day_gap, DAILY_MAX_GAP_DAYS};
use crate::{MergedCandle, PatternError, PriceBar, Result};

/// Merge daily candles into (MC1, MC2).
///
/// Drops the last `ignore_count` candles, then merges the latest `merge_size`
/// of the rest into MC2 and the `merge_size` before them into MC1.
pub fn merge<T: PriceBar>(
    candles: &[T],
    ignore_count: usize,
    merge_size: usize,
) -> Result<(MergedCandle, MergedCandle)> {
    merge_with_gap(candles, ignore_count, merge_size, DAILY_MAX_GAP_DAYS)
}

/// Like [`merge`] with an explicit gap tolerance (7 for weekly candles).
pub fn merge_with_gap<T: PriceBar>(
    candles: &[T],
    ignore_count: usize,
    merge_size: usize,
    max_gap_days: i64,
) -> Result<(MergedCandle, MergedCandle)> {
    if merge_size == 0 {
        return Err(PatternError::InvalidValue("merge size must be > 0"));
    }
    // Saturates: no slice is that long, so an overflowing need is just unmet
    let need = merge_size.saturating_mul(2).saturating_add(ignore_count);
    let got = candles.len();
    if got < need {
        return Err(PatternError::InsufficientData { need, got });
    }

    let usable = &candles[..got - ignore_count];
    let split = usable.len() - merge_size;
    let mc1_group = &usable[split - merge_size..split];
    let mc2_group = &usable[split..];

    let mc1 = merge_group(mc1_group, max_gap_days).ok_or(PatternError::InsufficientData { need, got })?;
    let mc2 = merge_group(mc2_group, max_gap_days).ok_or(PatternError::InsufficientData { need, got })?;
    Ok((mc1, mc2))
}

/// Merge one group. Returns `None` for an empty group.
pub fn merge_group<T: PriceBar>(group: &[T], max_gap_days: i64) -> Option<MergedCandle> {
    let first = group.first()?;
    let last = group.last()?;

    if let Some((index, gap_days)) = find_gap(group, max_gap_days) {
        debug!(
            index,
            gap_days,
            group_len = group.len(),
            "Gap inside merge group, using last candle"
        );
        return Some(MergedCandle::from_bar(last));
    }

    let mut high = first.high();
    let mut low = first.low();
    for c in group {
        high = high.max(c.high());
        low = low.min(c.low());
    }

    Some(MergedCandle {
        start_time: first.time(),
        end_time: last.time(),
        open: first.open(),
        high,
        low,
        close: last.close(),
        source_count: group.len(),
    })
}

/// First consecutive pair more than `max_gap_days` apart, as
/// (index of the later candle, gap in days).
pub fn find_gap<T: PriceBar>(group: &[T], max_gap_days: i64) -> Option<(usize, i64)> {
    group.windows(2).enumerate().find_map(|(i, pair)| {
        let gap = calendar_day_gap(pair[0].time(), pair[1].time());
        (gap > max_gap_days).then_some((i + 1, gap))
    })
}
