//! Currency strength/weakness aggregation
//!
//! Instrument-level evidence ("tested high" / "tested low") fans out to the
//! two currencies of each pair:
//!
//! ```text
//!   BASE_QUOTE tested high  ->  tested_high[BASE] += BASE_QUOTE
//!                               tested_low[QUOTE] += QUOTE_BASE
//!   BASE_QUOTE tested low   ->  tested_low[BASE]  += BASE_QUOTE
//!                               tested_high[QUOTE] += QUOTE_BASE
//! ```
//!
//! `strength = |tested_high| / (|tested_high| + |tested_low|)` per currency.
//! Which currencies count, and which instruments each ignores, is carried by
//! an explicit [`CurrencyUniverse`].
//!
//! [`accumulate`] folds dated observations into cumulative reports, resetting
//! at window boundaries.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    detectors::helpers::DEFAULT_RANGE_TOLERANCE_PERCENT, PatternError, PatternResult, PriceBar,
    Result, ThresholdPercent,
};

// ============================================================
// INSTRUMENTS
// ============================================================

/// A currency pair, `BASE_QUOTE`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instrument {
    pub base: String,
    pub quote: String,
}

impl Instrument {
    pub fn new(base: &str, quote: &str) -> Result<Self> {
        let valid = |code: &str| !code.is_empty() && code.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid(base) || !valid(quote) || base.eq_ignore_ascii_case(quote) {
            return Err(PatternError::InvalidInstrument(format!("{base}_{quote}")));
        }
        Ok(Self {
            base: base.to_ascii_uppercase(),
            quote: quote.to_ascii_uppercase(),
        })
    }

    /// `QUOTE_BASE`
    pub fn reversed(&self) -> Self {
        Self {
            base: self.quote.clone(),
            quote: self.base.clone(),
        }
    }

    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.base, self.quote)
    }
}

impl FromStr for Instrument {
    type Err = PatternError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (base, quote) = s
            .trim()
            .split_once('_')
            .ok_or_else(|| PatternError::InvalidInstrument(s.to_string()))?;
        Instrument::new(base, quote).map_err(|_| PatternError::InvalidInstrument(s.to_string()))
    }
}

impl Serialize for Instrument {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Instrument {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(d)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================
// TEST STATUS
// ============================================================

/// Whether an instrument reached the prior period's high or low
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    TestedHigh,
    TestedLow,
}

impl TestStatus {
    /// The status seen from the reversed instrument
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            TestStatus::TestedHigh => TestStatus::TestedLow,
            TestStatus::TestedLow => TestStatus::TestedHigh,
        }
    }

    /// Statuses implied by current vs previous range (see [`RangeTest`]).
    pub fn from_ranges(
        prev_high: f64,
        prev_low: f64,
        current_high: f64,
        current_low: f64,
        tolerance: ThresholdPercent,
    ) -> Vec<TestStatus> {
        RangeTest::from_ranges(prev_high, prev_low, current_high, current_low, tolerance).statuses()
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::TestedHigh => write!(f, "tested high"),
            TestStatus::TestedLow => write!(f, "tested low"),
        }
    }
}

/// Range check of a current period against the previous one.
///
/// `tested_high` when the current high comes within `tolerance` percent of
/// the previous high (or above it); `tested_low` likewise for the low. Both
/// can hold for an outside period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeTest {
    pub tested_high: bool,
    pub tested_low: bool,
}

impl RangeTest {
    /// 0.001%
    pub const DEFAULT_TOLERANCE: ThresholdPercent = ThresholdPercent(DEFAULT_RANGE_TOLERANCE_PERCENT);

    pub fn from_ranges(
        prev_high: f64,
        prev_low: f64,
        current_high: f64,
        current_low: f64,
        tolerance: ThresholdPercent,
    ) -> Self {
        Self {
            tested_high: current_high >= prev_high - tolerance.of(prev_high),
            tested_low: current_low <= prev_low + tolerance.of(prev_low),
        }
    }

    pub fn evaluate<P: PriceBar, C: PriceBar>(
        previous: &P,
        current: &C,
        tolerance: ThresholdPercent,
    ) -> Self {
        Self::from_ranges(
            previous.high(),
            previous.low(),
            current.high(),
            current.low(),
            tolerance,
        )
    }

    /// Position of `price` in the previous range: 0 at the low, 100 at the
    /// high, outside 0..=100 beyond either end. `None` for a zero range.
    pub fn pullback_percent(price: f64, prev_high: f64, prev_low: f64) -> Option<f64> {
        range_percent(price - prev_low, prev_high, prev_low)
    }

    /// How far `price` reaches past the previous high, as a percentage of the
    /// previous range. Negative below the high; `None` for a zero range.
    pub fn extension_percent(price: f64, prev_high: f64, prev_low: f64) -> Option<f64> {
        range_percent(price - prev_high, prev_high, prev_low)
    }

    pub fn statuses(&self) -> Vec<TestStatus> {
        let mut statuses = Vec::with_capacity(2);
        if self.tested_high {
            statuses.push(TestStatus::TestedHigh);
        }
        if self.tested_low {
            statuses.push(TestStatus::TestedLow);
        }
        statuses
    }
}

/// `distance` over the range, in percent rounded to two decimals
fn range_percent(distance: f64, high: f64, low: f64) -> Option<f64> {
    let range = high - low;
    if range == 0.0 {
        return None;
    }
    Some((distance / range * 100.0 * 100.0).round() / 100.0)
}

// ============================================================
// OBSERVATIONS
// ============================================================

/// Instrument-level evidence fed to the aggregator
pub trait Observation {
    fn instrument(&self) -> &str;
    fn statuses(&self) -> Vec<TestStatus>;
}

impl<T: Observation + ?Sized> Observation for &T {
    fn instrument(&self) -> &str {
        (**self).instrument()
    }

    fn statuses(&self) -> Vec<TestStatus> {
        (**self).statuses()
    }
}

impl Observation for PatternResult {
    fn instrument(&self) -> &str {
        &self.instrument
    }

    fn statuses(&self) -> Vec<TestStatus> {
        self.pattern_type.tested_status().into_iter().collect()
    }
}

/// An explicit status for one instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTag {
    pub instrument: String,
    pub status: TestStatus,
}

impl StatusTag {
    pub fn new(instrument: impl Into<String>, status: TestStatus) -> Self {
        Self {
            instrument: instrument.into(),
            status,
        }
    }

    /// One tag per status set in `test`
    pub fn from_range_test(instrument: &str, test: RangeTest) -> Vec<StatusTag> {
        test.statuses()
            .into_iter()
            .map(|status| StatusTag::new(instrument, status))
            .collect()
    }
}

impl Observation for StatusTag {
    fn instrument(&self) -> &str {
        &self.instrument
    }

    fn statuses(&self) -> Vec<TestStatus> {
        vec![self.status]
    }
}

// ============================================================
// CURRENCY UNIVERSE
// ============================================================

/// Currencies that receive evidence, with per-currency excluded instruments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyUniverse {
    currencies: BTreeSet<String>,
    #[serde(default)]
    exclusions: BTreeMap<String, BTreeSet<String>>,
}

impl CurrencyUniverse {
    pub const MAJORS: [&'static str; 8] = ["USD", "EUR", "GBP", "JPY", "CHF", "CAD", "AUD", "NZD"];

    pub fn new<I, S>(currencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            currencies: currencies
                .into_iter()
                .map(|c| c.as_ref().trim().to_ascii_uppercase())
                .collect(),
            exclusions: BTreeMap::new(),
        }
    }

    /// The eight majors; USD ignores the metals pairs.
    pub fn majors() -> Self {
        Self::new(Self::MAJORS)
            .with_exclusion("USD", "XAU_USD")
            .with_exclusion("USD", "XAG_USD")
    }

    /// Ignore `instrument` (in either direction) when computing `currency`.
    pub fn with_exclusion(mut self, currency: &str, instrument: &str) -> Self {
        self.exclusions
            .entry(currency.trim().to_ascii_uppercase())
            .or_default()
            .insert(instrument.trim().to_ascii_uppercase());
        self
    }

    #[inline]
    pub fn contains(&self, currency: &str) -> bool {
        self.currencies.contains(currency)
    }

    pub fn currencies(&self) -> impl Iterator<Item = &str> {
        self.currencies.iter().map(String::as_str)
    }

    pub fn is_excluded(&self, currency: &str, instrument: &Instrument) -> bool {
        self.exclusions.get(currency).is_some_and(|excluded| {
            excluded.contains(&instrument.name()) || excluded.contains(&instrument.reversed().name())
        })
    }

    /// `currency` is in the universe and `instrument` counts for it
    #[inline]
    fn counts(&self, currency: &str, instrument: &Instrument) -> bool {
        self.contains(currency) && !self.is_excluded(currency, instrument)
    }
}

impl Default for CurrencyUniverse {
    fn default() -> Self {
        Self::majors()
    }
}

// ============================================================
// EVIDENCE
// ============================================================

/// Evidence sets per currency. Combining two ledgers yields a new one.
#[derive(Debug, Clone, Default, PartialEq)]
struct Ledger {
    tested_high: BTreeMap<String, BTreeSet<String>>,
    tested_low: BTreeMap<String, BTreeSet<String>>,
}

impl Ledger {
    fn from_observations<O, I>(universe: &CurrencyUniverse, observations: I) -> Self
    where
        O: Observation,
        I: IntoIterator<Item = O>,
    {
        let mut ledger = Ledger::default();
        for observation in observations {
            let name = observation.instrument();
            let instrument = match name.parse::<Instrument>() {
                Ok(instrument) => instrument,
                Err(error) => {
                    warn!(instrument = %name, %error, "Skipping observation");
                    continue;
                }
            };
            for status in observation.statuses() {
                ledger.record(universe, &instrument, status);
            }
        }
        ledger
    }

    fn record(&mut self, universe: &CurrencyUniverse, instrument: &Instrument, status: TestStatus) {
        if universe.counts(&instrument.base, instrument) {
            self.side(status)
                .entry(instrument.base.clone())
                .or_default()
                .insert(instrument.name());
        }
        if universe.counts(&instrument.quote, instrument) {
            self.side(status.opposite())
                .entry(instrument.quote.clone())
                .or_default()
                .insert(instrument.reversed().name());
        }
    }

    fn side(&mut self, status: TestStatus) -> &mut BTreeMap<String, BTreeSet<String>> {
        match status {
            TestStatus::TestedHigh => &mut self.tested_high,
            TestStatus::TestedLow => &mut self.tested_low,
        }
    }

    /// Union of both ledgers, leaving the inputs untouched
    fn union(&self, other: &Ledger) -> Ledger {
        fn merge(
            a: &BTreeMap<String, BTreeSet<String>>,
            b: &BTreeMap<String, BTreeSet<String>>,
        ) -> BTreeMap<String, BTreeSet<String>> {
            let mut out = a.clone();
            for (currency, names) in b {
                out.entry(currency.clone()).or_default().extend(names.iter().cloned());
            }
            out
        }
        Ledger {
            tested_high: merge(&self.tested_high, &other.tested_high),
            tested_low: merge(&self.tested_low, &other.tested_low),
        }
    }

    fn report(&self, universe: &CurrencyUniverse) -> StrengthReport {
        let currencies: BTreeMap<String, CurrencyEvidence> = universe
            .currencies()
            .map(|currency| {
                let high = self.tested_high.get(currency).cloned().unwrap_or_default();
                let low = self.tested_low.get(currency).cloned().unwrap_or_default();
                (currency.to_string(), CurrencyEvidence::new(currency, high, low))
            })
            .collect();
        let summary = StrengthSummary::rank(&currencies);
        StrengthReport {
            currencies,
            summary,
        }
    }
}

/// Tested-high / tested-low instruments of one currency, named with the
/// currency first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyEvidence {
    pub currency: String,
    pub tested_high: BTreeSet<String>,
    pub tested_low: BTreeSet<String>,
    /// `None` without any evidence
    pub strength: Option<f64>,
    pub weakness: Option<f64>,
}

impl CurrencyEvidence {
    pub fn new(currency: &str, tested_high: BTreeSet<String>, tested_low: BTreeSet<String>) -> Self {
        let total = tested_high.len() + tested_low.len();
        let strength = (total > 0).then(|| tested_high.len() as f64 / total as f64);
        Self {
            currency: currency.to_string(),
            strength,
            weakness: strength.map(|s| 1.0 - s),
            tested_high,
            tested_low,
        }
    }

    #[inline]
    pub fn total(&self) -> usize {
        self.tested_high.len() + self.tested_low.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCurrency {
    pub currency: String,
    pub value: f64,
}

/// Currencies with evidence, sorted descending (ties by currency code)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrengthSummary {
    pub by_strength: Vec<RankedCurrency>,
    pub by_weakness: Vec<RankedCurrency>,
}

impl StrengthSummary {
    fn rank(currencies: &BTreeMap<String, CurrencyEvidence>) -> Self {
        let ranked = |pick: fn(&CurrencyEvidence) -> Option<f64>| {
            let mut ranked: Vec<RankedCurrency> = currencies
                .values()
                .filter_map(|e| {
                    pick(e).map(|value| RankedCurrency {
                        currency: e.currency.clone(),
                        value,
                    })
                })
                .collect();
            ranked.sort_by(|a, b| {
                b.value
                    .total_cmp(&a.value)
                    .then_with(|| a.currency.cmp(&b.currency))
            });
            ranked
        };
        Self {
            by_strength: ranked(|e| e.strength),
            by_weakness: ranked(|e| e.weakness),
        }
    }
}

/// Per-currency evidence for every currency in the universe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrengthReport {
    pub currencies: BTreeMap<String, CurrencyEvidence>,
    pub summary: StrengthSummary,
}

impl StrengthReport {
    pub fn get(&self, currency: &str) -> Option<&CurrencyEvidence> {
        self.currencies.get(currency)
    }
}

/// Aggregate observations into per-currency evidence.
///
/// Observations with malformed instrument names are logged and skipped.
pub fn aggregate<O, I>(universe: &CurrencyUniverse, observations: I) -> StrengthReport
where
    O: Observation,
    I: IntoIterator<Item = O>,
{
    let report = Ledger::from_observations(universe, observations).report(universe);
    debug!(
        ranked = report.summary.by_strength.len(),
        "Aggregated currency evidence"
    );
    report
}

// ============================================================
// CUMULATIVE ACCUMULATION
// ============================================================

/// Span over which cumulative evidence is carried before resetting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccumulationWindow {
    /// ISO week (Monday to Sunday)
    #[default]
    Week,
    /// Never reset
    Unbounded,
}

impl AccumulationWindow {
    #[inline]
    pub fn same_window(self, a: NaiveDate, b: NaiveDate) -> bool {
        use chrono::Datelike;
        match self {
            AccumulationWindow::Week => a.iso_week() == b.iso_week(),
            AccumulationWindow::Unbounded => true,
        }
    }
}

/// Cumulative report as of one date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatedReport {
    pub date: NaiveDate,
    pub report: StrengthReport,
}

/// Cumulative reports, one per distinct date, in ascending date order.
///
/// Each date's evidence is its own observations plus everything carried from
/// earlier dates in the same window. Observations sharing a date are combined.
pub fn accumulate<O, V, I>(
    universe: &CurrencyUniverse,
    window: AccumulationWindow,
    days: I,
) -> Vec<DatedReport>
where
    O: Observation,
    V: IntoIterator<Item = O>,
    I: IntoIterator<Item = (NaiveDate, V)>,
{
    let mut by_date: BTreeMap<NaiveDate, Ledger> = BTreeMap::new();
    for (date, observations) in days {
        let delta = Ledger::from_observations(universe, observations);
        let combined = match by_date.get(&date) {
            Some(existing) => existing.union(&delta),
            None => delta,
        };
        by_date.insert(date, combined);
    }

    let mut reports = Vec::with_capacity(by_date.len());
    let mut carried: Option<(NaiveDate, Ledger)> = None;
    for (date, delta) in by_date {
        let ledger = match &carried {
            Some((prev, prev_ledger)) if window.same_window(*prev, date) => prev_ledger.union(&delta),
            Some((prev, _)) => {
                debug!(from = %prev, to = %date, "Accumulation window reset");
                delta
            }
            None => delta,
        };
        reports.push(DatedReport {
            date,
            report: ledger.report(universe),
        });
        carried = Some((date, ledger));
    }
    reports
}

// ============================================================
// TESTS
// ============================================================
