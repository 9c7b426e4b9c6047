//! Timeframe parsing
//!
//! A timeframe is a candle granularity plus the number of candles merged into
//! one period: `"2D"` merges two daily candles, `"W"` is a single weekly candle.
//! Accepted forms (case-insensitive): `D`, `1D`..`7D`, `W`, `1W`..`4W`.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{detectors::helpers::DAILY_MAX_GAP_DAYS, PatternError, Result};

/// Granularity of the raw candles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    #[serde(rename = "D")]
    Daily,
    #[serde(rename = "W")]
    Weekly,
}

impl Granularity {
    #[inline]
    pub fn code(self) -> &'static str {
        match self {
            Granularity::Daily => "D",
            Granularity::Weekly => "W",
        }
    }

    /// Largest calendar-day step between consecutive candles that still counts
    /// as contiguous.
    #[inline]
    pub fn max_gap_days(self) -> i64 {
        match self {
            Granularity::Daily => DAILY_MAX_GAP_DAYS,
            Granularity::Weekly => 7,
        }
    }

    #[inline]
    pub fn max_merge_size(self) -> usize {
        match self {
            Granularity::Daily => 7,
            Granularity::Weekly => 4,
        }
    }
}

/// Granularity and merge size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe {
    granularity: Granularity,
    merge_size: usize,
}

impl Timeframe {
    pub fn new(granularity: Granularity, merge_size: usize) -> Result<Self> {
        let max = granularity.max_merge_size();
        if merge_size == 0 || merge_size > max {
            return Err(PatternError::InvalidTimeframe(format!(
                "merge size must be between 1 and {max} for {} candles, got {merge_size}",
                granularity.code()
            )));
        }
        Ok(Self {
            granularity,
            merge_size,
        })
    }

    pub fn daily(merge_size: usize) -> Result<Self> {
        Self::new(Granularity::Daily, merge_size)
    }

    pub fn weekly(merge_size: usize) -> Result<Self> {
        Self::new(Granularity::Weekly, merge_size)
    }

    #[inline]
    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    #[inline]
    pub fn merge_size(&self) -> usize {
        self.merge_size
    }
}

impl Default for Timeframe {
    fn default() -> Self {
        Self {
            granularity: Granularity::Daily,
            merge_size: 1,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.merge_size, self.granularity.code())
    }
}

impl FromStr for Timeframe {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self> {
        let tf = s.trim().to_ascii_uppercase();
        if tf.is_empty() {
            return Err(PatternError::InvalidTimeframe("timeframe cannot be empty".into()));
        }
        if !tf.is_ascii() {
            return Err(PatternError::InvalidTimeframe(format!(
                "unsupported timeframe format: {s}"
            )));
        }

        let (prefix, granularity) = match tf.split_at(tf.len() - 1) {
            (prefix, "D") => (prefix, Granularity::Daily),
            (prefix, "W") => (prefix, Granularity::Weekly),
            _ => {
                return Err(PatternError::InvalidTimeframe(format!(
                    "unsupported timeframe format: {s}"
                )))
            }
        };

        if prefix.is_empty() {
            return Self::new(granularity, 1);
        }
        if !prefix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PatternError::InvalidTimeframe(format!(
                "invalid timeframe format: {s}"
            )));
        }
        let merge_size = prefix
            .parse::<usize>()
            .map_err(|_| PatternError::InvalidTimeframe(format!("invalid timeframe format: {s}")))?;
        Self::new(granularity, merge_size)
    }
}

impl TryFrom<String> for Timeframe {
    type Error = PatternError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.to_string()
    }
}
