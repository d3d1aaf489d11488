//! Test runner for data-aggregator comprehensive tests

// Import all test modules
mod unit {
    mod candle_aggregation_tests;
    mod rolling_window_tests;
    mod univariate_aggregation_tests;
}

use chainflow_common::{Tick, TimeframeNetwork};
use chrono::{TimeZone, Utc};
use data_aggregator::OhlcAggregator;

#[test]
fn basic_pipeline_integration() {
    // Quick end-to-end check: ticks in, aligned candles out
    let network = TimeframeNetwork::intraday();
    let mut aggregator = OhlcAggregator::new("BTCUSDT", network);
    let base = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();

    for i in 0..120 {
        let tick = Tick::new(
            base + chrono::Duration::seconds(i),
            100.0 + (i % 10) as f64,
            "BTCUSDT",
            "binance",
        )
        .with_size(1.0);
        aggregator.add_tick(&tick);
    }
    aggregator.force_finalize_all();

    let minute_buffer = aggregator.buffer("1m").unwrap();
    let window = minute_buffer.lock();
    assert_eq!(window.len(), 2);
    for candle in window.get_last(2) {
        assert!(candle.is_well_formed());
        assert_eq!(candle.datetime.timestamp() % 60, 0);
    }
}
