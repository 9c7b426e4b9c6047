//! Integration tests for the MCSW merged-candle pipeline.
//!
//! These tests drive the public API end to end: candles in, pattern labels
//! and per-currency strength/weakness out.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use mcsw::prelude::*;
use serde_json::{json, Value};

/// Simple test bar structure
#[derive(Debug, Clone, Copy)]
struct TestBar {
    t: DateTime<Utc>,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
}

impl PriceBar for TestBar {
    fn time(&self) -> DateTime<Utc> {
        self.t
    }

    fn open(&self) -> f64 {
        self.o
    }

    fn high(&self) -> f64 {
        self.h
    }

    fn low(&self) -> f64 {
        self.l
    }

    fn close(&self) -> f64 {
        self.c
    }
}

/// Monday 2025-01-06 plus `n` days
fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap() + Duration::days(n)
}

fn bar(n: i64, o: f64, h: f64, l: f64, c: f64) -> TestBar {
    TestBar {
        t: day(n),
        o,
        h,
        l,
        c,
    }
}

/// A forming candle appended after the given days
fn forming(n: i64) -> TestBar {
    bar(n, 1.0, 1.0, 1.0, 1.0)
}

/// EUR_CHF: MC2 clears MC1's top and high, not its bottom
fn eurchf() -> Vec<TestBar> {
    vec![
        bar(0, 0.9281, 0.93028, 0.9270, 0.9300),
        bar(1, 0.92964, 0.9320, 0.9290, 0.93162),
        forming(2),
    ]
}

/// USD_CAD: red MC2 closing under MC1's low, opening inside MC1's body
fn usdcad() -> Vec<TestBar> {
    vec![
        bar(0, 1.4300, 1.4350, 1.4250, 1.4320),
        bar(1, 1.4290, 1.4300, 1.4180, 1.4200),
        forming(2),
    ]
}

/// EUR_USD: red MC1 engulfed by a green MC2 that breaks MC1's high
fn eurusd() -> Vec<TestBar> {
    vec![
        bar(0, 1.0300, 1.0350, 1.0250, 1.0280),
        bar(1, 1.0280, 1.0400, 1.0270, 1.0390),
        forming(2),
    ]
}

/// Inside period
fn usdjpy() -> Vec<TestBar> {
    vec![
        bar(0, 150.00, 151.00, 149.00, 150.50),
        bar(1, 150.40, 150.90, 149.50, 150.60),
        forming(2),
    ]
}

// ============================================================
// CLASSIFICATION SCENARIOS
// ============================================================

#[test]
fn test_eurchf_is_bullish_upclose_not_engulfing() {
    let analyzer = AnalyzerBuilder::new().build().unwrap();
    let result = analyzer.analyze("EUR_CHF", &eurchf()).unwrap();

    assert_eq!(result.pattern_type, PatternType::BullishUpclose);
    assert_eq!(result.relation, "upclose ⬆️");
    assert_eq!(result.color, Color::Green);

    let detector = EngulfingDetector::with_defaults();
    let geometry = detector.geometry(&result.mc1, &result.mc2);
    assert!(!geometry.bottom_engulfs);
    assert!(geometry.top_engulfs);
}

#[test]
fn test_bearish_downclose() {
    let analyzer = AnalyzerBuilder::new().build().unwrap();
    let result = analyzer.analyze("USD_CAD", &usdcad()).unwrap();

    assert_eq!(result.pattern_type, PatternType::BearishDownclose);
    assert_eq!(result.relation, "downclose ⬇️");
    assert_eq!(result.color, Color::Red);
}

#[test]
fn test_bullish_engulfing_upclose() {
    let analyzer = AnalyzerBuilder::new().build().unwrap();
    let result = analyzer.analyze("EUR_USD", &eurusd()).unwrap();

    assert_eq!(result.pattern_type, PatternType::BullishEngulfingUpclose);
    assert_eq!(result.relation, "upclose ⬆️ + bullish engulfing");
}

#[test]
fn test_engulfing_result_carries_metrics() {
    let analyzer = AnalyzerBuilder::new().build().unwrap();
    let result = analyzer.analyze("EUR_USD", &eurusd()).unwrap();
    let metrics = result.metrics.unwrap();

    // MC1 body 1.0280..1.0300 within MC2 body 1.0280..1.0390
    assert!((metrics.body_size_ratio - 0.0020 / 0.0110).abs() < 1e-9);
    assert_eq!(metrics.body_position, RangePosition::Bottom25);
    assert_eq!(metrics.whole_body_position, RangePosition::Bottom25);

    let plain = analyzer.analyze("EUR_CHF", &eurchf()).unwrap();
    assert_eq!(plain.metrics, None);
}

#[test]
fn test_same_color_containment_is_not_engulfing() {
    let analyzer = AnalyzerBuilder::new().build().unwrap();

    // Green MC1 inside a green MC2
    let bars = vec![
        bar(0, 1.0920, 1.1000, 1.0900, 1.0950),
        bar(1, 1.0880, 1.1100, 1.0850, 1.1050),
        forming(2),
    ];
    let result = analyzer.analyze("EUR_USD", &bars).unwrap();
    assert!(EngulfingDetector::with_defaults().geometry(&result.mc1, &result.mc2).engulfs());
    assert_eq!(result.pattern_type, PatternType::BullishUpclose);
    assert_eq!(result.relation, "upclose ⬆️");
    assert_eq!(result.metrics, None);

    // Red MC1 inside a red MC2
    let bars = vec![
        bar(0, 1.0950, 1.1000, 1.0900, 1.0920),
        bar(1, 1.1050, 1.1050, 1.0850, 1.0880),
        forming(2),
    ];
    let result = analyzer.analyze("EUR_USD", &bars).unwrap();
    assert!(EngulfingDetector::with_defaults().geometry(&result.mc1, &result.mc2).engulfs());
    assert_eq!(result.pattern_type, PatternType::BearishDownclose);
    assert_eq!(result.relation, "downclose ⬇️");
}

#[test]
fn test_inside_period_is_neutral() {
    let analyzer = AnalyzerBuilder::new().build().unwrap();
    let result = analyzer.analyze("USD_JPY", &usdjpy()).unwrap();

    assert_eq!(result.pattern_type, PatternType::Neutral);
    assert_eq!(result.relation, "neutral");
}

#[test]
fn test_ignore_zero_classifies_latest_candle() {
    let bars = eurusd();
    let analyzer = AnalyzerBuilder::new().ignore_candles(0).build().unwrap();
    let result = analyzer.analyze("EUR_USD", &bars).unwrap();

    // The flat forming candle becomes MC2 and reads as a downclose
    assert_eq!(result.mc2.end_time, day(2));
    assert_eq!(result.mc1.close, 1.0390);
    assert_eq!(result.color, Color::Neutral);
    assert_eq!(result.pattern_type, PatternType::Downclose);
}

#[test]
fn test_two_day_merge() {
    let bars = vec![
        bar(0, 1.1000, 1.1020, 1.0950, 1.0980),
        bar(1, 1.0980, 1.0990, 1.0900, 1.0920),
        bar(2, 1.0910, 1.0980, 1.0905, 1.0970),
        bar(3, 1.0970, 1.1060, 1.0960, 1.1050),
        forming(4),
    ];
    let analyzer = AnalyzerBuilder::new()
        .timeframe("2D".parse().unwrap())
        .build()
        .unwrap();
    let result = analyzer.analyze("EUR_USD", &bars).unwrap();

    assert_eq!(result.mc1.open, 1.1000);
    assert_eq!(result.mc1.close, 1.0920);
    assert_eq!(result.mc1.high, 1.1020);
    assert_eq!(result.mc1.low, 1.0900);
    assert_eq!(result.mc2.open, 1.0910);
    assert_eq!(result.mc2.close, 1.1050);
    assert_eq!(result.mc2.source_count, 2);
    assert_eq!(result.pattern_type, PatternType::BullishEngulfingUpclose);
}

#[test]
fn test_weekend_gap_falls_back_to_last_candle() {
    // Thursday, Friday | Monday, Tuesday
    let bars = vec![
        bar(3, 1.1000, 1.1020, 1.0950, 1.0980),
        bar(4, 1.0980, 1.0990, 1.0900, 1.0920),
        bar(7, 1.0910, 1.0980, 1.0905, 1.0970),
        bar(8, 1.0970, 1.1060, 1.0960, 1.1050),
        forming(9),
    ];
    let analyzer = AnalyzerBuilder::new()
        .timeframe(Timeframe::daily(2).unwrap())
        .build()
        .unwrap();
    let result = analyzer.analyze("EUR_USD", &bars).unwrap();
    assert_eq!(result.mc1.source_count, 2);
    assert_eq!(result.mc2.source_count, 2);

    // Friday -> Monday inside one group
    let bars = vec![
        bar(2, 1.1000, 1.1020, 1.0950, 1.0980),
        bar(3, 1.0980, 1.0990, 1.0900, 1.0920),
        bar(4, 1.0910, 1.0980, 1.0905, 1.0970),
        bar(7, 1.0970, 1.1060, 1.0960, 1.1050),
        forming(8),
    ];
    let result = analyzer.analyze("EUR_USD", &bars).unwrap();
    assert_eq!(result.mc1.source_count, 2);
    assert_eq!(result.mc2.source_count, 1);
    assert_eq!(result.mc2.open, 1.0970);
    assert_eq!(result.mc2.start_time, day(7));
}

#[test]
fn test_weekly_candles_merge_without_gap_fallback() {
    let bars: Vec<TestBar> = [
        (1.10, 1.12, 1.08, 1.11),
        (1.11, 1.13, 1.10, 1.12),
        (1.12, 1.15, 1.11, 1.14),
        (1.14, 1.16, 1.13, 1.15),
        (1.15, 1.15, 1.15, 1.15),
    ]
    .iter()
    .enumerate()
    .map(|(w, &(o, h, l, c))| bar(w as i64 * 7, o, h, l, c))
    .collect();

    let analyzer = AnalyzerBuilder::new()
        .timeframe("2W".parse().unwrap())
        .build()
        .unwrap();
    let result = analyzer.analyze("EUR_USD", &bars).unwrap();
    assert_eq!(result.mc1.source_count, 2);
    assert_eq!(result.mc2.source_count, 2);
    assert_eq!(result.pattern_type, PatternType::BullishUpclose);
}

#[test]
fn test_insufficient_data_reports_need_and_got() {
    let analyzer = AnalyzerBuilder::new()
        .timeframe(Timeframe::daily(3).unwrap())
        .build()
        .unwrap();
    let err = analyzer.analyze("EUR_USD", &eurusd()).unwrap_err();
    assert_eq!(err, PatternError::InsufficientData { need: 7, got: 3 });
    assert_eq!(err.to_string(), "Insufficient data: need 7 candles, got 3");
}

#[test]
fn test_malformed_candle_fails_fast() {
    let mut bars = eurusd();
    bars[0].c = 1.0500;
    let analyzer = AnalyzerBuilder::new().build().unwrap();
    assert!(matches!(
        analyzer.analyze("EUR_USD", &bars),
        Err(PatternError::MalformedCandle { index: 0, .. })
    ));
}

#[test]
fn test_stricter_threshold_drops_engulfing() {
    // MC2 opens 0.0005 above MC1's close
    let bars = vec![
        bar(0, 1.1000, 1.1010, 1.0890, 1.0900),
        bar(1, 1.0905, 1.1050, 1.0900, 1.1040),
        forming(2),
    ];
    let tolerant = AnalyzerBuilder::new().build().unwrap();
    assert_eq!(
        tolerant.analyze("EUR_USD", &bars).unwrap().pattern_type,
        PatternType::BullishEngulfingUpclose
    );

    let strict = AnalyzerBuilder::new()
        .engulfing_threshold(ThresholdPercent::new(0.0).unwrap())
        .build()
        .unwrap();
    assert_eq!(
        strict.analyze("EUR_USD", &bars).unwrap().pattern_type,
        PatternType::BullishUpclose
    );
}

// ============================================================
// RUNS AND AGGREGATION
// ============================================================

#[test]
fn test_run_and_aggregate() {
    let (chf, cad, usd, jpy) = (eurchf(), usdcad(), eurusd(), usdjpy());
    let short = vec![forming(0)];
    let analyzer = AnalyzerBuilder::new().build().unwrap();

    let report = analyzer.run([
        ("EUR_CHF", chf.as_slice()),
        ("USD_CAD", cad.as_slice()),
        ("EUR_USD", usd.as_slice()),
        ("USD_JPY", jpy.as_slice()),
        ("GBP_USD", short.as_slice()),
    ]);

    assert_eq!(report.results().count(), 4);
    assert_eq!(report.failures().count(), 1);
    assert!(!report.patterns.contains_key(&PatternType::Neutral));
    assert_eq!(report.patterns[&PatternType::BullishUpclose], ["EUR_CHF"]);

    let strength = aggregate(&CurrencyUniverse::default(), report.results());

    let eur = &strength.currencies["EUR"];
    assert_eq!(eur.tested_high.len(), 2);
    assert_eq!(eur.strength, Some(1.0));

    let usd = &strength.currencies["USD"];
    assert!(usd.tested_low.contains("USD_CAD"));
    assert!(usd.tested_low.contains("USD_EUR"));
    assert_eq!(usd.weakness, Some(1.0));

    assert_eq!(strength.currencies["JPY"].strength, None);
    assert_eq!(strength.summary.by_strength[0].currency, "CAD");
    assert_eq!(strength.summary.by_weakness[0].currency, "CHF");
}

#[test]
fn test_parallel_matches_sequential() {
    let (chf, cad, usd) = (eurchf(), usdcad(), eurusd());
    let analyzer = AnalyzerBuilder::new().build().unwrap();
    let instruments: Vec<(&str, &[TestBar])> = vec![
        ("EUR_CHF", chf.as_slice()),
        ("USD_CAD", cad.as_slice()),
        ("EUR_USD", usd.as_slice()),
    ];

    let (mut parallel, errors) = analyze_parallel(&analyzer, instruments.clone());
    assert!(errors.is_empty());
    parallel.sort_by(|a, b| a.instrument.cmp(&b.instrument));

    let mut sequential: Vec<PatternResult> = analyzer.run(instruments).results().cloned().collect();
    sequential.sort_by(|a, b| a.instrument.cmp(&b.instrument));

    assert_eq!(parallel, sequential);
}

#[test]
fn test_cumulative_week() {
    let universe = CurrencyUniverse::default();
    let d1 = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
    let d2 = NaiveDate::from_ymd_opt(2025, 1, 7).unwrap();

    let reports = accumulate(
        &universe,
        AccumulationWindow::Week,
        [
            (d1, vec![StatusTag::new("USD_CAD", TestStatus::TestedLow)]),
            (d2, vec![StatusTag::new("EUR_USD", TestStatus::TestedHigh)]),
        ],
    );

    let day2 = &reports[1].report;
    assert_eq!(day2.currencies["EUR"].tested_high.len(), 1);
    assert!(day2.currencies["EUR"].tested_high.contains("EUR_USD"));
    assert!(day2.currencies["USD"].tested_low.contains("USD_CAD"));
    assert!(day2.currencies["CAD"].tested_high.contains("CAD_USD"));
}

#[test]
fn test_config_file_drives_analyzer() {
    let config = AnalysisConfig::from_toml_str(
        r#"
        ignore_candles = 1
        timeframe = "1D"
        engulfing_threshold_percent = 0.0
        "#,
    )
    .unwrap();
    let analyzer = AnalyzerBuilder::from_config(config).build().unwrap();

    let bars = vec![
        bar(0, 1.1000, 1.1010, 1.0890, 1.0900),
        bar(1, 1.0905, 1.1050, 1.0900, 1.1040),
        forming(2),
    ];
    assert_eq!(
        analyzer.analyze("EUR_USD", &bars).unwrap().pattern_type,
        PatternType::BullishUpclose
    );
}

// ============================================================
// JSON CONTRACT
// ============================================================

#[test]
fn test_pattern_result_json_shape() {
    let analyzer = AnalyzerBuilder::new().build().unwrap();
    let result = analyzer.analyze("EUR_CHF", &eurchf()).unwrap();
    let value = serde_json::to_value(&result).unwrap();

    assert_eq!(value["instrument"], "EUR_CHF");
    assert_eq!(value["pattern_type"], "bullish + upclose");
    assert_eq!(value["relation"], "upclose ⬆️");
    assert_eq!(value["color"], "GREEN");
    assert_eq!(value["mc1"]["open"], 0.9281);
    assert_eq!(value["mc1"]["start_time"], "2025-01-06T00:00:00Z");
    assert_eq!(value["mc2"]["source_count"], 1);
    assert!(value.get("metrics").is_none());

    let back: PatternResult = serde_json::from_value(value).unwrap();
    assert_eq!(back.instrument, result.instrument);
    assert_eq!(back.pattern_type, result.pattern_type);
    assert_eq!(back.mc2.end_time, result.mc2.end_time);
}

#[test]
fn test_report_json_shape() {
    let (usd, short) = (eurusd(), vec![forming(0)]);
    let analyzer = AnalyzerBuilder::new().build().unwrap();
    let report = analyzer.run([("EUR_USD", usd.as_slice()), ("GBP_USD", short.as_slice())]);
    let value = serde_json::to_value(&report).unwrap();

    assert_eq!(value["timeframe"], "1D");
    assert_eq!(value["ignore_candles"], 1);
    assert_eq!(value["patterns"], json!({ "bullish engulfing + upclose": ["EUR_USD"] }));
    assert_eq!(value["instruments"][0]["pattern_type"], "bullish engulfing + upclose");
    assert_eq!(value["instruments"][0]["metrics"]["body_position"], "bottom_25%");
    assert_eq!(
        value["instruments"][1],
        json!({
            "instrument": "GBP_USD",
            "error": "Insufficient data: need 3 candles, got 1"
        })
    );

    let back: AnalysisReport = serde_json::from_value(value).unwrap();
    assert_eq!(back.results().count(), 1);
    assert_eq!(back.failures().count(), 1);
    assert_eq!(back.patterns, report.patterns);
}

#[test]
fn test_strength_report_json_shape() {
    let report = aggregate(
        &CurrencyUniverse::default(),
        [StatusTag::new("GBP_JPY", TestStatus::TestedHigh)],
    );
    let value = serde_json::to_value(&report).unwrap();

    assert_eq!(
        value["currencies"]["GBP"],
        json!({
            "currency": "GBP",
            "tested_high": ["GBP_JPY"],
            "tested_low": [],
            "strength": 1.0,
            "weakness": 0.0
        })
    );
    assert_eq!(value["currencies"]["EUR"]["strength"], Value::Null);
    assert_eq!(
        value["summary"]["by_weakness"],
        json!([
            { "currency": "JPY", "value": 1.0 },
            { "currency": "GBP", "value": 0.0 }
        ])
    );
}

#[test]
fn test_pattern_type_strings_round_trip() {
    let names: Vec<String> = PatternType::ALL.iter().map(|p| p.to_string()).collect();
    assert_eq!(
        names,
        [
            "bullish engulfing + upclose",
            "bearish engulfing + downclose",
            "bullish engulfing",
            "bearish engulfing",
            "bullish + upclose",
            "bearish + downclose",
            "upclose",
            "downclose",
            "neutral",
        ]
    );
    let parsed: PatternType = serde_json::from_str("\"bearish + downclose\"").unwrap();
    assert_eq!(parsed, PatternType::BearishDownclose);
}
