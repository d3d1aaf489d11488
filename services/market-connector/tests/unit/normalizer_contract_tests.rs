//! Cross-source checks of the normalizer contract

use chainflow_common::Tick;
use market_connector::normalizers::{
    AccuweatherNormalizer, BinanceNormalizer, BloombergNormalizer, Normalizer, PolygonNormalizer,
};
use rstest::rstest;
use serde_json::{json, Value};

fn normalizers() -> Vec<Box<dyn Normalizer>> {
    vec![
        Box::new(BinanceNormalizer),
        Box::new(PolygonNormalizer),
        Box::new(AccuweatherNormalizer::new("178087")),
        Box::new(BloombergNormalizer),
    ]
}

fn sample_for(source: &str) -> Value {
    match source {
        "binance" => json!({
            "e": "trade",
            "s": "BTCUSDT",
            "p": "96000.5",
            "q": "0.25",
            "T": 1735725600000i64
        }),
        "polygon" => json!({
            "ev": "T",
            "sym": "AAPL",
            "p": 189.0,
            "s": 10,
            "t": 1735725600000i64
        }),
        "accuweather" => json!([{
            "EpochTime": 1735725600i64,
            "Temperature": {"Metric": {"Value": -2.5}},
            "RelativeHumidity": 80
        }]),
        "bloomberg" => json!({
            "security": "IBM US Equity",
            "timestamp": 1735725600000i64,
            "LAST_TRADE": 230.0,
            "VOLUME": 500
        }),
        other => panic!("no sample for source '{other}'"),
    }
}

#[test]
fn every_source_stamps_its_name() {
    for normalizer in normalizers() {
        let tick = normalizer
            .normalize(&sample_for(normalizer.source()))
            .unwrap_or_else(|| panic!("sample for {} did not normalize", normalizer.source()));
        assert_eq!(tick.source, normalizer.source());
        assert_eq!(tick.ts.timestamp(), 1735725600);
    }
}

#[test]
fn normalization_is_deterministic() {
    for normalizer in normalizers() {
        let raw = sample_for(normalizer.source());
        let first: Option<Tick> = normalizer.normalize(&raw);
        let second: Option<Tick> = normalizer.normalize(&raw);
        assert_eq!(first, second);
    }
}

#[rstest]
#[case(json!({}))]
#[case(json!([]))]
#[case(json!(null))]
#[case(json!("not an object"))]
fn junk_messages_yield_none(#[case] junk: Value) {
    for normalizer in normalizers() {
        assert!(
            normalizer.normalize(&junk).is_none(),
            "{} accepted junk",
            normalizer.source()
        );
    }
}

#[test]
fn sizes_are_non_negative_where_present() {
    for normalizer in normalizers() {
        if let Some(tick) = normalizer.normalize(&sample_for(normalizer.source())) {
            if let Some(size) = tick.size {
                assert!(size >= 0.0);
            }
        }
    }
}
