//! Engulfing detection between two merged candles
//!
//! MC2's body engulfs MC1's body when both of its ends reach past MC1's,
//! with a tolerance of `threshold_percent` of MC1's body top (or body size,
//! whichever is larger). Geometry alone is not enough: bullish engulfing needs
//! a red MC1 and a green MC2, bearish engulfing the opposite.
//!
//! [`EngulfingMetrics`] describes the shape of a pair (body ratio, overlaps,
//! positions and wicks) for reporting.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    params::{get_percent, ParamMeta, ParameterizedDetector},
    Color, PriceBar, PriceBarExt, Result, ThresholdPercent,
};

impl_with_defaults!(EngulfingDetector);

/// Intermediate body-containment measurements
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngulfingGeometry {
    pub threshold_absolute: f64,
    pub bottom_engulfs: bool,
    pub top_engulfs: bool,
}

impl EngulfingGeometry {
    pub fn measure<A: PriceBar, B: PriceBar>(mc1: &A, mc2: &B, threshold: ThresholdPercent) -> Self {
        let threshold_absolute = threshold.of(mc1.body_size()).max(threshold.of(mc1.body_top()));
        Self {
            threshold_absolute,
            bottom_engulfs: mc2.body_bottom() <= mc1.body_bottom() + threshold_absolute,
            top_engulfs: mc2.body_top() >= mc1.body_top() - threshold_absolute,
        }
    }

    /// Both ends must hold
    #[inline]
    pub fn engulfs(&self) -> bool {
        self.bottom_engulfs && self.top_engulfs
    }
}

/// Color-gated engulfing outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngulfingFlags {
    pub bullish_engulfing: bool,
    pub bearish_engulfing: bool,
}

impl EngulfingFlags {
    #[inline]
    pub fn any(self) -> bool {
        self.bullish_engulfing || self.bearish_engulfing
    }
}

/// Detect engulfing of MC1 by MC2.
pub fn detect_engulfing<A: PriceBar, B: PriceBar>(
    mc1: &A,
    mc2: &B,
    threshold: ThresholdPercent,
) -> EngulfingFlags {
    let geometry = EngulfingGeometry::measure(mc1, mc2, threshold);
    if !geometry.engulfs() {
        return EngulfingFlags::default();
    }
    EngulfingFlags {
        bullish_engulfing: mc1.color() == Color::Red && mc2.color() == Color::Green,
        bearish_engulfing: mc1.color() == Color::Green && mc2.color() == Color::Red,
    }
}

// ============================================================
// METRICS
// ============================================================

/// Quartile of a price within a reference range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangePosition {
    #[serde(rename = "top_25%")]
    Top25,
    UpperMiddle,
    LowerMiddle,
    #[serde(rename = "bottom_25%")]
    Bottom25,
    Outside,
}

impl RangePosition {
    /// Bucket a position given as a percentage from the bottom of the range.
    /// Only a negative position is `Outside`.
    pub fn from_percent(percent: f64) -> Self {
        match percent {
            p if p >= 75.0 => RangePosition::Top25,
            p if p >= 50.0 => RangePosition::UpperMiddle,
            p if p >= 25.0 => RangePosition::LowerMiddle,
            p if p >= 0.0 => RangePosition::Bottom25,
            _ => RangePosition::Outside,
        }
    }

    /// `price` within `low..=high`; above `high` is `Outside` too.
    /// A zero-width range reads as `LowerMiddle`.
    fn within(price: f64, low: f64, high: f64) -> Self {
        if high == low {
            return RangePosition::LowerMiddle;
        }
        let percent = (price - low) / (high - low) * 100.0;
        if percent > 100.0 {
            RangePosition::Outside
        } else {
            Self::from_percent(percent)
        }
    }
}

/// Wicks relative to the body; both zero for a candle without a body
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WickRatios {
    pub upper_wick_ratio: f64,
    pub lower_wick_ratio: f64,
}

impl WickRatios {
    pub fn of<T: PriceBar>(bar: &T) -> Self {
        let body = bar.body_size();
        if body == 0.0 {
            return Self::default();
        }
        Self {
            upper_wick_ratio: (bar.high() - bar.body_top()) / body,
            lower_wick_ratio: (bar.body_bottom() - bar.low()) / body,
        }
    }
}

/// Shape of an MC1/MC2 pair, attached to engulfing results.
///
/// - `body_size_ratio`: MC1 body over MC2 body (0 when MC2 has no body)
/// - `body_position`: MC1's open within MC2's body
/// - `body_overlap_percent`: shared body span over the combined body span
/// - `whole_body_position`: MC1's close within MC2's high/low range
/// - `whole_body_overlap_percent`: shared high/low span over MC1's range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngulfingMetrics {
    pub mc1_body_size: f64,
    pub mc2_body_size: f64,
    pub body_size_ratio: f64,
    pub body_position: RangePosition,
    pub body_overlap_percent: f64,
    pub whole_body_position: RangePosition,
    pub whole_body_overlap_percent: f64,
    pub mc1_wicks: WickRatios,
    pub mc2_wicks: WickRatios,
}

impl EngulfingMetrics {
    pub fn measure<A: PriceBar, B: PriceBar>(mc1: &A, mc2: &B) -> Self {
        let (mc1_body_size, mc2_body_size) = (mc1.body_size(), mc2.body_size());
        let body_size_ratio = if mc2_body_size == 0.0 {
            0.0
        } else {
            mc1_body_size / mc2_body_size
        };

        let body_position = if mc2_body_size == 0.0 {
            RangePosition::LowerMiddle
        } else {
            RangePosition::from_percent((mc1.open() - mc2.body_bottom()) / mc2_body_size * 100.0)
        };

        let combined = mc1.body_top().max(mc2.body_top()) - mc1.body_bottom().min(mc2.body_bottom());
        let body_overlap_percent = overlap_percent(
            (mc1.body_bottom(), mc1.body_top()),
            (mc2.body_bottom(), mc2.body_top()),
            combined,
        );
        let whole_body_overlap_percent =
            overlap_percent((mc1.low(), mc1.high()), (mc2.low(), mc2.high()), mc1.range());

        Self {
            mc1_body_size,
            mc2_body_size,
            body_size_ratio,
            body_position,
            body_overlap_percent,
            whole_body_position: RangePosition::within(mc1.close(), mc2.low(), mc2.high()),
            whole_body_overlap_percent,
            mc1_wicks: WickRatios::of(mc1),
            mc2_wicks: WickRatios::of(mc2),
        }
    }
}

/// Length shared by two spans as a percentage of `basis`; 0 when they do not
/// overlap or `basis` is zero.
fn overlap_percent(a: (f64, f64), b: (f64, f64), basis: f64) -> f64 {
    let shared = a.1.min(b.1) - a.0.max(b.0);
    if shared <= 0.0 || basis == 0.0 {
        return 0.0;
    }
    shared / basis * 100.0
}

/// Engulfing detector with a configured tolerance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngulfingDetector {
    pub threshold_percent: ThresholdPercent,
}

impl EngulfingDetector {
    pub fn new(threshold_percent: f64) -> Result<Self> {
        Ok(Self {
            threshold_percent: ThresholdPercent::new(threshold_percent)?,
        })
    }

    #[inline]
    pub fn detect<A: PriceBar, B: PriceBar>(&self, mc1: &A, mc2: &B) -> EngulfingFlags {
        detect_engulfing(mc1, mc2, self.threshold_percent)
    }

    #[inline]
    pub fn geometry<A: PriceBar, B: PriceBar>(&self, mc1: &A, mc2: &B) -> EngulfingGeometry {
        EngulfingGeometry::measure(mc1, mc2, self.threshold_percent)
    }
}

const ENGULFING_PARAMS: &[ParamMeta] = &[ParamMeta::percent(
    "threshold_percent",
    0.10,
    (0.0, 0.5, 0.05),
    "Body tolerance as a percentage of MC1's body",
)];

impl ParameterizedDetector for EngulfingDetector {
    fn param_meta() -> &'static [ParamMeta] {
        ENGULFING_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            threshold_percent: get_percent(params, "threshold_percent", ThresholdPercent::DEFAULT)?,
        })
    }
}
