//! Pattern classification of an (MC1, MC2) pair
//!
//! Raw signals are read off the pair and matched against [`RULES`], an
//! ordered table where the first matching rule wins. Anything unmatched is
//! [`PatternType::Neutral`], so every pair gets exactly one label.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::engulfing::EngulfingFlags;
use crate::{strength::TestStatus, PatternError, PatternResult, PriceBar, PriceBarExt};

// ============================================================
// PATTERN TYPES
// ============================================================

/// The nine pattern labels. The serialized names are a stable contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PatternType {
    #[serde(rename = "bullish engulfing + upclose")]
    BullishEngulfingUpclose,
    #[serde(rename = "bearish engulfing + downclose")]
    BearishEngulfingDownclose,
    #[serde(rename = "bullish engulfing")]
    BullishEngulfing,
    #[serde(rename = "bearish engulfing")]
    BearishEngulfing,
    #[serde(rename = "bullish + upclose")]
    BullishUpclose,
    #[serde(rename = "bearish + downclose")]
    BearishDownclose,
    #[serde(rename = "upclose")]
    Upclose,
    #[serde(rename = "downclose")]
    Downclose,
    #[serde(rename = "neutral")]
    Neutral,
}

impl PatternType {
    /// All labels in rule priority order, `Neutral` last
    pub const ALL: [PatternType; 9] = [
        PatternType::BullishEngulfingUpclose,
        PatternType::BearishEngulfingDownclose,
        PatternType::BullishEngulfing,
        PatternType::BearishEngulfing,
        PatternType::BullishUpclose,
        PatternType::BearishDownclose,
        PatternType::Upclose,
        PatternType::Downclose,
        PatternType::Neutral,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PatternType::BullishEngulfingUpclose => "bullish engulfing + upclose",
            PatternType::BearishEngulfingDownclose => "bearish engulfing + downclose",
            PatternType::BullishEngulfing => "bullish engulfing",
            PatternType::BearishEngulfing => "bearish engulfing",
            PatternType::BullishUpclose => "bullish + upclose",
            PatternType::BearishDownclose => "bearish + downclose",
            PatternType::Upclose => "upclose",
            PatternType::Downclose => "downclose",
            PatternType::Neutral => "neutral",
        }
    }

    #[inline]
    pub fn is_engulfing(self) -> bool {
        matches!(
            self,
            PatternType::BullishEngulfingUpclose
                | PatternType::BearishEngulfingDownclose
                | PatternType::BullishEngulfing
                | PatternType::BearishEngulfing
        )
    }

    /// Range evidence carried by the label.
    ///
    /// Labels with an upclose broke MC1's high, labels with a downclose broke
    /// its low. Engulfing-only and neutral labels carry none.
    pub fn tested_status(self) -> Option<TestStatus> {
        match self {
            PatternType::BullishEngulfingUpclose
            | PatternType::BullishUpclose
            | PatternType::Upclose => Some(TestStatus::TestedHigh),
            PatternType::BearishEngulfingDownclose
            | PatternType::BearishDownclose
            | PatternType::Downclose => Some(TestStatus::TestedLow),
            PatternType::BullishEngulfing | PatternType::BearishEngulfing | PatternType::Neutral => {
                None
            }
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatternType {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        PatternType::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| PatternError::UnknownPattern(s.to_string()))
    }
}

// ============================================================
// SIGNALS AND RULES
// ============================================================

/// Raw signals of an (MC1, MC2) pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signals {
    pub bullish_engulfing: bool,
    pub bearish_engulfing: bool,
    /// MC2 closed above MC1's high
    pub upclose: bool,
    /// MC2 closed below MC1's low
    pub downclose: bool,
    pub bullish: bool,
    pub bearish: bool,
}

impl Signals {
    pub fn compute<A: PriceBar, B: PriceBar>(mc1: &A, mc2: &B, flags: EngulfingFlags) -> Self {
        Self {
            bullish_engulfing: flags.bullish_engulfing,
            bearish_engulfing: flags.bearish_engulfing,
            upclose: mc2.close() > mc1.high(),
            downclose: mc2.close() < mc1.low(),
            bullish: mc2.is_bullish(),
            bearish: mc2.is_bearish(),
        }
    }

    #[inline]
    pub fn engulfing(&self) -> bool {
        self.bullish_engulfing || self.bearish_engulfing
    }
}

/// One row of the classification table
#[derive(Clone, Copy)]
pub struct Rule {
    pub pattern: PatternType,
    pub matches: fn(&Signals) -> bool,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule").field("pattern", &self.pattern).finish()
    }
}

/// Classification rules in priority order
pub const RULES: &[Rule] = &[
    Rule {
        pattern: PatternType::BullishEngulfingUpclose,
        matches: |s: &Signals| s.bullish_engulfing && s.upclose && s.bullish,
    },
    Rule {
        pattern: PatternType::BearishEngulfingDownclose,
        matches: |s: &Signals| s.bearish_engulfing && s.downclose && s.bearish,
    },
    Rule {
        pattern: PatternType::BullishEngulfing,
        matches: |s: &Signals| s.bullish_engulfing && s.bullish,
    },
    Rule {
        pattern: PatternType::BearishEngulfing,
        matches: |s: &Signals| s.bearish_engulfing && s.bearish,
    },
    Rule {
        pattern: PatternType::BullishUpclose,
        matches: |s: &Signals| s.upclose && !s.engulfing() && s.bullish,
    },
    Rule {
        pattern: PatternType::BearishDownclose,
        matches: |s: &Signals| s.downclose && !s.engulfing() && s.bearish,
    },
    Rule {
        pattern: PatternType::Upclose,
        matches: |s: &Signals| s.upclose && !s.engulfing() && !s.bullish,
    },
    Rule {
        pattern: PatternType::Downclose,
        matches: |s: &Signals| s.downclose && !s.engulfing() && !s.bearish,
    },
];

/// First matching rule, or `Neutral`
pub fn classify_signals(signals: &Signals) -> PatternType {
    RULES
        .iter()
        .find(|rule| (rule.matches)(signals))
        .map_or(PatternType::Neutral, |rule| rule.pattern)
}

/// Classify an (MC1, MC2) pair given its engulfing flags.
pub fn classify<A: PriceBar, B: PriceBar>(mc1: &A, mc2: &B, flags: EngulfingFlags) -> PatternType {
    classify_signals(&Signals::compute(mc1, mc2, flags))
}

/// Human-readable list of the raw signals present.
///
/// ```rust
/// use mcsw::prelude::*;
/// use chrono::Utc;
///
/// let t = Utc::now();
/// let mc1 = RawCandle::new(t, 1.10, 1.12, 1.09, 1.11);
/// let mc2 = RawCandle::new(t, 1.11, 1.14, 1.10, 1.13);
/// assert_eq!(relation(&mc1, &mc2, EngulfingFlags::default()), "upclose ⬆️");
/// ```
pub fn relation<A: PriceBar, B: PriceBar>(mc1: &A, mc2: &B, flags: EngulfingFlags) -> String {
    let signals = Signals::compute(mc1, mc2, flags);
    let mut parts: Vec<&str> = Vec::new();
    if signals.downclose {
        parts.push("downclose ⬇️");
    }
    if signals.upclose {
        parts.push("upclose ⬆️");
    }
    if signals.bullish_engulfing {
        parts.push("bullish engulfing");
    }
    if signals.bearish_engulfing {
        parts.push("bearish engulfing");
    }
    if parts.is_empty() {
        "neutral".to_string()
    } else {
        parts.join(" + ")
    }
}

/// Label -> sorted instrument names, neutral results omitted
pub fn group_by_pattern<'a, I>(results: I) -> BTreeMap<PatternType, Vec<String>>
where
    I: IntoIterator<Item = &'a PatternResult>,
{
    let mut groups: BTreeMap<PatternType, Vec<String>> = BTreeMap::new();
    for result in results {
        if result.pattern_type == PatternType::Neutral {
            continue;
        }
        groups
            .entry(result.pattern_type)
            .or_default()
            .push(result.instrument.clone());
    }
    for names in groups.values_mut() {
        names.sort();
        names.dedup();
    }
    groups
}
