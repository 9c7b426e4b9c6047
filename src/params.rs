//! Analysis configuration and parameter metadata
//!
//! This module provides:
//! - [`AnalysisConfig`], the run configuration (loadable from TOML)
//! - metadata about tunable parameters for sweeps and documentation
//!
//! # Example
//!
//! ```rust
//! use mcsw::params::AnalysisConfig;
//!
//! let config = AnalysisConfig::from_toml_str(
//!     r#"
//!     ignore_candles = 1
//!     timeframe = "2D"
//!     engulfing_threshold_percent = 0.05
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(config.timeframe.merge_size(), 2);
//!
//! for param in AnalysisConfig::param_meta() {
//!   println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
  detectors::helpers::DEFAULT_IGNORE_CANDLES,
  timeframe::{Granularity, Timeframe},
  PatternError, Result, ThresholdPercent,
};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Percentage value (0.10 means 0.10%)
  Percent,
  /// Non-negative integer count
  Count,
}

/// Metadata for a single tunable parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "engulfing_threshold_percent")
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Range for sweeps: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn percent(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Percent, default, range, description }
  }

  pub const fn count(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Count, default, range, description }
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    let mut values = Vec::new();
    let mut i = 0u32;
    loop {
      let v = min + step * i as f64;
      if v > max + f64::EPSILON {
        break;
      }
      values.push(v);
      i += 1;
    }
    values
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value.is_nan() || value < min || value > max {
      return Err(PatternError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Percent => Ok(()),
      ParamType::Count => {
        if value.fract() != 0.0 {
          return Err(PatternError::InvalidValue("Count must be a whole number"));
        }
        Ok(())
      },
    }
  }
}

// ============================================================
// PARAMETERIZED DETECTOR TRAIT
// ============================================================

/// Trait for components whose parameters can be swept
pub trait ParameterizedDetector: Sized {
  /// Returns metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Creates an instance from a parameter map.
  ///
  /// Missing parameters use their default values.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Helper to get a percentage from params with default fallback
pub fn get_percent(
  params: &HashMap<&str, f64>,
  key: &str,
  default: ThresholdPercent,
) -> Result<ThresholdPercent> {
  match params.get(key) {
    Some(&value) => ThresholdPercent::new(value),
    None => Ok(default),
  }
}

/// Helper to get a non-negative whole count from params with default fallback
pub fn get_count(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<usize> {
  match params.get(key) {
    Some(&value) => {
      if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
        return Err(PatternError::InvalidValue("Count must be a non-negative whole number"));
      }
      Ok(value as usize)
    },
    None => Ok(default),
  }
}

// ============================================================
// ANALYSIS CONFIG
// ============================================================

const ANALYSIS_PARAMS: &[ParamMeta] = &[
  ParamMeta::count(
    "ignore_candles",
    1.0,
    (0.0, 3.0, 1.0),
    "Most recent candles dropped as incomplete before merging",
  ),
  ParamMeta::count("merge_size", 1.0, (1.0, 7.0, 1.0), "Raw candles merged into each period"),
  ParamMeta::percent(
    "engulfing_threshold_percent",
    0.10,
    (0.0, 0.5, 0.05),
    "Engulfing body tolerance as a percentage of MC1's body",
  ),
];

/// Configuration consumed by the analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
  /// Most recent candles to drop as incomplete (0 is legal)
  pub ignore_candles: usize,
  pub timeframe: Timeframe,
  pub engulfing_threshold_percent: ThresholdPercent,
  /// Gap tolerated inside a merge group; `None` uses the granularity's default
  pub max_gap_days: Option<i64>,
}

impl Default for AnalysisConfig {
  fn default() -> Self {
    Self {
      ignore_candles: DEFAULT_IGNORE_CANDLES,
      timeframe: Timeframe::default(),
      engulfing_threshold_percent: ThresholdPercent::DEFAULT,
      max_gap_days: None,
    }
  }
}

impl AnalysisConfig {
  /// Parse and validate a TOML document
  pub fn from_toml_str(content: &str) -> Result<Self> {
    let config: Self =
      toml::from_str(content).map_err(|e| PatternError::InvalidConfig(e.to_string()))?;
    config.validate()?;
    Ok(config)
  }

  /// Read, parse and validate a TOML file
  pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
      PatternError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
    })?;
    Self::from_toml_str(&content)
  }

  pub fn validate(&self) -> Result<()> {
    if let Some(days) = self.max_gap_days {
      if days < 1 {
        return Err(PatternError::InvalidConfig(format!(
          "max_gap_days must be at least 1, got {days}"
        )));
      }
    }
    Ok(())
  }

  #[inline]
  pub fn effective_max_gap_days(&self) -> i64 {
    self.max_gap_days.unwrap_or_else(|| self.timeframe.granularity().max_gap_days())
  }

  /// Candles needed for one classification: `ignore + 2 * merge_size`
  #[inline]
  pub fn min_candles(&self) -> usize {
    self.ignore_candles.saturating_add(2 * self.timeframe.merge_size())
  }

  pub fn param_meta() -> &'static [ParamMeta] {
    ANALYSIS_PARAMS
  }

  /// Daily configuration from a parameter map; missing keys use defaults.
  ///
  /// Values are checked against their types (`Timeframe`, `ThresholdPercent`),
  /// not against the sweep ranges in [`param_meta`](Self::param_meta).
  pub fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    let defaults = Self::default();
    let merge_size = get_count(params, "merge_size", defaults.timeframe.merge_size())?;
    Ok(Self {
      ignore_candles: get_count(params, "ignore_candles", defaults.ignore_candles)?,
      timeframe: Timeframe::new(Granularity::Daily, merge_size)?,
      engulfing_threshold_percent: get_percent(
        params,
        "engulfing_threshold_percent",
        defaults.engulfing_threshold_percent,
      )?,
      max_gap_days: None,
    })
  }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_param_meta_percent() {
    let meta = ParamMeta::percent("test_pct", 0.1, (0.0, 0.5, 0.05), "Test percent parameter");

    assert_eq!(meta.name, "test_pct");
    assert_eq!(meta.param_type, ParamType::Percent);
    assert_eq!(meta.default, 0.1);
  }

  #[test]
  fn test_param_meta_count() {
    let meta = ParamMeta::count("test_count", 2.0, (1.0, 7.0, 1.0), "Test count parameter");

    assert_eq!(meta.param_type, ParamType::Count);
    assert_eq!(meta.default, 2.0);
  }

  #[test]
  fn test_generate_grid() {
    let meta = ParamMeta::percent("test", 0.1, (0.0, 0.2, 0.1), "Test");

    let grid = meta.generate_grid();
    assert_eq!(grid.len(), 3);
    assert!((grid[0] - 0.0).abs() < 1e-12);
    assert!((grid[1] - 0.1).abs() < 1e-12);
    assert!((grid[2] - 0.2).abs() < 1e-12);
  }

  #[test]
  fn test_validate_count() {
    let meta = ParamMeta::count("test", 1.0, (1.0, 7.0, 1.0), "Test");

    assert!(meta.validate(1.0).is_ok());
    assert!(meta.validate(7.0).is_ok());
    assert!(meta.validate(0.0).is_err());
    assert!(meta.validate(8.0).is_err());
    assert!(meta.validate(2.5).is_err());
  }

  #[test]
  fn test_get_percent_helper() {
    let mut params = HashMap::new();
    params.insert("key1", 0.25);

    let default = ThresholdPercent::DEFAULT;
    assert_eq!(get_percent(&params, "key1", default).unwrap().get(), 0.25);
    assert_eq!(get_percent(&params, "key2", default).unwrap(), default);
  }

  #[test]
  fn test_get_count_helper() {
    let mut params = HashMap::new();
    params.insert("key1", 3.0);
    params.insert("bad", -1.0);

    assert_eq!(get_count(&params, "key1", 1).unwrap(), 3);
    assert_eq!(get_count(&params, "key2", 1).unwrap(), 1);
    assert!(get_count(&params, "bad", 1).is_err());
  }

  #[test]
  fn test_default_config() {
    let config = AnalysisConfig::default();
    assert_eq!(config.ignore_candles, 1);
    assert_eq!(config.timeframe.to_string(), "1D");
    assert_eq!(config.engulfing_threshold_percent.get(), 0.10);
    assert_eq!(config.effective_max_gap_days(), 1);
    assert_eq!(config.min_candles(), 3);
  }

  #[test]
  fn test_from_toml() {
    let config = AnalysisConfig::from_toml_str(
      r#"
      ignore_candles = 0
      timeframe = "2w"
      engulfing_threshold_percent = 0.05
      "#,
    )
    .unwrap();

    assert_eq!(config.ignore_candles, 0);
    assert_eq!(config.timeframe, Timeframe::weekly(2).unwrap());
    assert_eq!(config.engulfing_threshold_percent.get(), 0.05);
    assert_eq!(config.effective_max_gap_days(), 7);
  }

  #[test]
  fn test_from_toml_uses_defaults() {
    let config = AnalysisConfig::from_toml_str("").unwrap();
    assert_eq!(config, AnalysisConfig::default());
  }

  #[test]
  fn test_from_toml_rejects_bad_values() {
    assert!(AnalysisConfig::from_toml_str("timeframe = \"9D\"").is_err());
    assert!(AnalysisConfig::from_toml_str("engulfing_threshold_percent = -1.0").is_err());
    assert!(AnalysisConfig::from_toml_str("max_gap_days = 0").is_err());
    assert!(AnalysisConfig::from_toml_str("unknown = 1").is_err());
  }

  #[test]
  fn test_with_params() {
    let mut params = HashMap::new();
    params.insert("merge_size", 3.0);
    params.insert("engulfing_threshold_percent", 0.2);

    let config = AnalysisConfig::with_params(&params).unwrap();
    assert_eq!(config.timeframe.merge_size(), 3);
    assert_eq!(config.ignore_candles, 1);
    assert_eq!(config.engulfing_threshold_percent.get(), 0.2);
  }

  #[test]
  fn test_with_params_rejects_out_of_range() {
    let mut params = HashMap::new();
    params.insert("merge_size", 9.0);
    assert!(AnalysisConfig::with_params(&params).is_err());
  }

  #[test]
  fn test_with_params_accepts_values_outside_sweep_range() {
    let mut params = HashMap::new();
    params.insert("engulfing_threshold_percent", 5.0);
    params.insert("ignore_candles", 4.0);

    let config = AnalysisConfig::with_params(&params).unwrap();
    assert_eq!(config.engulfing_threshold_percent.get(), 5.0);
    assert_eq!(config.ignore_candles, 4);

    params.insert("engulfing_threshold_percent", 150.0);
    assert!(AnalysisConfig::with_params(&params).is_err());
  }

  #[test]
  fn test_param_meta_listing() {
    let names: Vec<_> = AnalysisConfig::param_meta().iter().map(|p| p.name).collect();
    assert_eq!(names, ["ignore_candles", "merge_size", "engulfing_threshold_percent"]);
  }
}
