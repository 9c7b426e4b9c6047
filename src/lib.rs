//! # MCSW - Merged Candle Strength/Weakness
//!
//! Pattern classification over merged FX candles and per-currency strength/weakness
//! aggregation.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use mcsw::prelude::*;
//!
//! let day = |d: u32| Utc.with_ymd_and_hms(2025, 1, d, 0, 0, 0).unwrap();
//! let candles = vec![
//!     RawCandle::new(day(6), 1.0300, 1.0350, 1.0250, 1.0280),
//!     RawCandle::new(day(7), 1.0280, 1.0400, 1.0270, 1.0390),
//!     // Current period, still forming: dropped by `ignore_candles = 1`
//!     RawCandle::new(day(8), 1.0390, 1.0420, 1.0380, 1.0400),
//! ];
//!
//! let analyzer = AnalyzerBuilder::new().build().unwrap();
//! let result = analyzer.analyze("EUR_USD", &candles).unwrap();
//! assert_eq!(result.pattern_type, PatternType::BullishEngulfingUpclose);
//!
//! // Fan in to per-currency evidence
//! let report = aggregate(&CurrencyUniverse::default(), [&result]);
//! assert_eq!(report.currencies["EUR"].strength, Some(1.0));
//! assert_eq!(report.currencies["USD"].weakness, Some(1.0));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub mod detectors;
pub mod params;
pub mod strength;
pub mod timeframe;

pub mod prelude {
    pub use crate::{
        // Detectors
        detectors::*,
        // Parameters
        params::{get_count, get_percent, AnalysisConfig, ParamMeta, ParamType, ParameterizedDetector},
        // Parallel
        analyze_parallel,
        // Strength / weakness
        strength::{
            accumulate, aggregate, AccumulationWindow, CurrencyEvidence, CurrencyUniverse,
            DatedReport, Instrument, Observation, RangeTest, RankedCurrency, StatusTag,
            StrengthReport, StrengthSummary, TestStatus,
        },
        // Timeframes
        timeframe::{Granularity, Timeframe},
        // Engine
        AnalysisError,
        AnalysisReport,
        Analyzer,
        AnalyzerBuilder,
        // Types
        Color,
        InstrumentOutcome,
        MergedCandle,
        PatternError,
        PatternResult,
        // Core traits
        PriceBar,
        PriceBarExt,
        RawCandle,
        Result,
        ThresholdPercent,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors that can occur during merging, classification and configuration
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Insufficient data: need {need} candles, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Malformed candle at index {index}: {reason}")]
    MalformedCandle { index: usize, reason: &'static str },

    #[error("Invalid timeframe: {0}")]
    InvalidTimeframe(String),

    #[error("Invalid instrument: {0}")]
    InvalidInstrument(String),

    #[error("Unknown pattern type: {0}")]
    UnknownPattern(String),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Percentage in range 0.0..=100.0 (0.10 means 0.10%)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct ThresholdPercent(f64);

impl ThresholdPercent {
    /// Default engulfing tolerance: 0.10%
    pub const DEFAULT: Self = Self(0.10);

    /// Create a new ThresholdPercent, validating the value is in [0.0, 100.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(PatternError::InvalidValue(
                "ThresholdPercent cannot be NaN or infinite",
            ));
        }
        if !(0.0..=100.0).contains(&value) {
            return Err(PatternError::OutOfRange {
                field: "ThresholdPercent",
                value,
                min: 0.0,
                max: 100.0,
            });
        }
        Ok(Self(value))
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }

    /// `value * percent / 100`
    #[inline]
    pub fn of(self, value: f64) -> f64 {
        value * (self.0 / 100.0)
    }
}

impl Default for ThresholdPercent {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Serialize for ThresholdPercent {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for ThresholdPercent {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        ThresholdPercent::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// PRICE BAR TRAITS
// ============================================================

/// Core OHLC data trait
pub trait PriceBar {
    fn time(&self) -> DateTime<Utc>;
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
}

impl<T: PriceBar + ?Sized> PriceBar for &T {
    fn time(&self) -> DateTime<Utc> {
        (**self).time()
    }

    fn open(&self) -> f64 {
        (**self).open()
    }

    fn high(&self) -> f64 {
        (**self).high()
    }

    fn low(&self) -> f64 {
        (**self).low()
    }

    fn close(&self) -> f64 {
        (**self).close()
    }
}

/// Candle color, decided by close vs open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Color {
    Green,
    Red,
    Neutral,
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Color::Green => write!(f, "GREEN"),
            Color::Red => write!(f, "RED"),
            Color::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Extension trait with the body view of a bar
pub trait PriceBarExt: PriceBar {
    #[inline]
    fn body_top(&self) -> f64 {
        self.open().max(self.close())
    }

    #[inline]
    fn body_bottom(&self) -> f64 {
        self.open().min(self.close())
    }

    #[inline]
    fn body_size(&self) -> f64 {
        self.body_top() - self.body_bottom()
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    #[inline]
    fn color(&self) -> Color {
        if self.is_bullish() {
            Color::Green
        } else if self.is_bearish() {
            Color::Red
        } else {
            Color::Neutral
        }
    }

    /// Validate OHLC consistency. The reported index is 0; callers remap it.
    fn validate(&self) -> Result<()> {
        let values = [self.open(), self.high(), self.low(), self.close()];
        if values.iter().any(|v| v.is_nan()) {
            return Err(PatternError::MalformedCandle {
                index: 0,
                reason: "NaN in OHLC",
            });
        }
        if values.iter().any(|v| v.is_infinite()) {
            return Err(PatternError::MalformedCandle {
                index: 0,
                reason: "Infinite value in OHLC",
            });
        }
        if self.high() < self.low() {
            return Err(PatternError::MalformedCandle {
                index: 0,
                reason: "high < low",
            });
        }
        if self.body_top() > self.high() || self.body_bottom() < self.low() {
            return Err(PatternError::MalformedCandle {
                index: 0,
                reason: "open/close outside high/low range",
            });
        }
        Ok(())
    }
}

impl<T: PriceBar + ?Sized> PriceBarExt for T {}

// ============================================================
// CANDLES
// ============================================================

/// One completed trading period as delivered by the data source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawCandle {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl RawCandle {
    pub fn new(time: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
        }
    }
}

impl PriceBar for RawCandle {
    fn time(&self) -> DateTime<Utc> {
        self.time
    }

    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }
}

/// Aggregate of consecutive raw candles
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MergedCandle {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Raw candles that contributed; 1 when the group fell back on a gap
    pub source_count: usize,
}

impl MergedCandle {
    /// A merged candle made of a single bar
    pub fn from_bar<T: PriceBar>(bar: &T) -> Self {
        Self {
            start_time: bar.time(),
            end_time: bar.time(),
            open: bar.open(),
            high: bar.high(),
            low: bar.low(),
            close: bar.close(),
            source_count: 1,
        }
    }
}

impl PriceBar for MergedCandle {
    fn time(&self) -> DateTime<Utc> {
        self.end_time
    }

    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }
}

// ============================================================
// PATTERN RESULT
// ============================================================

use detectors::{classify, relation, EngulfingDetector, EngulfingMetrics, PatternType};

/// Outcome of one classification run for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternResult {
    pub instrument: String,
    pub mc1: MergedCandle,
    pub mc2: MergedCandle,
    pub pattern_type: PatternType,
    pub relation: String,
    /// Color of MC2
    pub color: Color,
    /// Pair shape, present for engulfing labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<EngulfingMetrics>,
}

// ============================================================
// ANALYZER
// ============================================================

use params::AnalysisConfig;
use timeframe::Timeframe;

/// Runs merge -> engulfing -> classification for one instrument at a time
#[derive(Debug, Clone)]
pub struct Analyzer {
    config: AnalysisConfig,
    engulfing: EngulfingDetector,
    validate_data: bool,
}

impl Analyzer {
    #[inline]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Merge a candle sequence into (MC1, MC2) with this analyzer's settings.
    pub fn merge<T: PriceBar>(&self, candles: &[T]) -> Result<(MergedCandle, MergedCandle)> {
        detectors::merge_with_gap(
            candles,
            self.config.ignore_candles,
            self.config.timeframe.merge_size(),
            self.config.effective_max_gap_days(),
        )
    }

    /// Classify one instrument.
    pub fn analyze<T: PriceBar>(&self, instrument: &str, candles: &[T]) -> Result<PatternResult> {
        if self.validate_data {
            validate_bars(candles)?;
        }

        let (mc1, mc2) = self.merge(candles)?;
        let flags = self.engulfing.detect(&mc1, &mc2);
        let pattern_type = classify(&mc1, &mc2, flags);

        debug!(
            instrument = %instrument,
            pattern = %pattern_type,
            mc1_sources = mc1.source_count,
            mc2_sources = mc2.source_count,
            "Classified instrument"
        );

        Ok(PatternResult {
            instrument: instrument.to_string(),
            relation: relation(&mc1, &mc2, flags),
            color: mc2.color(),
            metrics: pattern_type
                .is_engulfing()
                .then(|| EngulfingMetrics::measure(&mc1, &mc2)),
            mc1,
            mc2,
            pattern_type,
        })
    }

    /// Classify every instrument in order. A failing instrument is recorded
    /// in the report and does not stop the others.
    pub fn run<'a, T, I>(&self, instruments: I) -> AnalysisReport
    where
        T: PriceBar + 'a,
        I: IntoIterator<Item = (&'a str, &'a [T])>,
    {
        let outcomes: Vec<InstrumentOutcome> = instruments
            .into_iter()
            .map(|(instrument, candles)| match self.analyze(instrument, candles) {
                Ok(result) => InstrumentOutcome::Classified(result),
                Err(error) => {
                    warn!(instrument = %instrument, %error, "Instrument skipped");
                    InstrumentOutcome::Failed {
                        instrument: instrument.to_string(),
                        error: error.to_string(),
                    }
                }
            })
            .collect();

        let report = AnalysisReport {
            timeframe: self.config.timeframe,
            ignore_candles: self.config.ignore_candles,
            patterns: detectors::group_by_pattern(outcomes.iter().filter_map(InstrumentOutcome::result)),
            instruments: outcomes,
        };

        info!(
            timeframe = %report.timeframe,
            classified = report.results().count(),
            failed = report.failures().count(),
            "Analysis run complete"
        );

        report
    }
}

fn validate_bars<T: PriceBar>(bars: &[T]) -> Result<()> {
    for (i, bar) in bars.iter().enumerate() {
        bar.validate().map_err(|e| match e {
            PatternError::MalformedCandle { reason, .. } => {
                PatternError::MalformedCandle { index: i, reason }
            }
            other => other,
        })?;
        if i > 0 && bar.time() <= bars[i - 1].time() {
            return Err(PatternError::MalformedCandle {
                index: i,
                reason: "timestamp not after previous candle",
            });
        }
    }
    Ok(())
}

// ============================================================
// RUN REPORT
// ============================================================

/// Per-instrument entry of a run report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InstrumentOutcome {
    Classified(PatternResult),
    Failed { instrument: String, error: String },
}

impl InstrumentOutcome {
    pub fn instrument(&self) -> &str {
        match self {
            InstrumentOutcome::Classified(r) => &r.instrument,
            InstrumentOutcome::Failed { instrument, .. } => instrument,
        }
    }

    pub fn result(&self) -> Option<&PatternResult> {
        match self {
            InstrumentOutcome::Classified(r) => Some(r),
            InstrumentOutcome::Failed { .. } => None,
        }
    }
}

/// Everything one classification run produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub timeframe: Timeframe,
    pub ignore_candles: usize,
    /// Pattern label -> sorted instruments (neutral omitted)
    pub patterns: std::collections::BTreeMap<PatternType, Vec<String>>,
    pub instruments: Vec<InstrumentOutcome>,
}

impl AnalysisReport {
    pub fn results(&self) -> impl Iterator<Item = &PatternResult> {
        self.instruments.iter().filter_map(InstrumentOutcome::result)
    }

    pub fn failures(&self) -> impl Iterator<Item = &InstrumentOutcome> {
        self.instruments
            .iter()
            .filter(|o| matches!(o, InstrumentOutcome::Failed { .. }))
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating Analyzer instances
#[derive(Debug, Clone)]
pub struct AnalyzerBuilder {
    config: AnalysisConfig,
    validate_data: bool,
}

impl Default for AnalyzerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyzerBuilder {
    pub fn new() -> Self {
        Self {
            config: AnalysisConfig::default(),
            validate_data: true,
        }
    }

    /// Start from a loaded configuration
    pub fn from_config(config: AnalysisConfig) -> Self {
        Self {
            config,
            validate_data: true,
        }
    }

    pub fn timeframe(mut self, timeframe: Timeframe) -> Self {
        self.config.timeframe = timeframe;
        self
    }

    pub fn ignore_candles(mut self, count: usize) -> Self {
        self.config.ignore_candles = count;
        self
    }

    /// Engulfing tolerance in percent (0.10 means 0.10%)
    pub fn engulfing_threshold(mut self, percent: ThresholdPercent) -> Self {
        self.config.engulfing_threshold_percent = percent;
        self
    }

    /// Override the gap (in calendar days) tolerated inside a merge group
    pub fn max_gap_days(mut self, days: i64) -> Self {
        self.config.max_gap_days = Some(days);
        self
    }

    /// Enable/disable candle validation before merging
    pub fn validate_data(mut self, enable: bool) -> Self {
        self.validate_data = enable;
        self
    }

    /// Build the analyzer
    pub fn build(self) -> Result<Analyzer> {
        self.config.validate()?;
        Ok(Analyzer {
            engulfing: EngulfingDetector {
                threshold_percent: self.config.engulfing_threshold_percent,
            },
            config: self.config,
            validate_data: self.validate_data,
        })
    }
}

// ============================================================
// PARALLEL ANALYSIS
// ============================================================

use rayon::prelude::*;

/// Error from analyzing a single instrument
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisError {
    pub instrument: String,
    pub error: PatternError,
}

/// Parallel classification of multiple instruments
pub fn analyze_parallel<'a, T, I>(
    analyzer: &Analyzer,
    instruments: I,
) -> (Vec<PatternResult>, Vec<AnalysisError>)
where
    T: PriceBar + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(instrument, candles)| {
            analyzer
                .analyze(instrument, candles)
                .map_err(|error| AnalysisError {
                    instrument: instrument.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => {
                warn!(instrument = %e.instrument, error = %e.error, "Instrument skipped");
                errors.push(e)
            }
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================
