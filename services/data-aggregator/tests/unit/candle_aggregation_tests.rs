//! Comprehensive tests for OHLC candle aggregation

use chainflow_common::{Tick, Timeframe, TimeframeNetwork};
use chrono::{DateTime, TimeZone, Utc};
use data_aggregator::OhlcAggregator;
use rstest::*;

/// Test fixture for the base window instant
#[fixture]
fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap()
}

/// Test fixture for a two-timeframe aggregator
#[fixture]
fn aggregator() -> OhlcAggregator {
    let network = TimeframeNetwork::from_labels(&["1s", "5s"]).unwrap();
    OhlcAggregator::new("BTCUSDT", network)
}

fn tick(base: DateTime<Utc>, offset_ms: i64, price: f64, size: f64) -> Tick {
    Tick::new(
        base + chrono::Duration::milliseconds(offset_ms),
        price,
        "BTCUSDT",
        "binance",
    )
    .with_size(size)
}

#[rstest]
fn seed_scenario_one_second_ohlc(mut aggregator: OhlcAggregator, base_time: DateTime<Utc>) {
    // (T+0.0, 100, 1), (T+0.3, 101, 2), (T+0.7, 99, 1), (T+0.9, 100, 1), (T+1.2, 105, 1)
    aggregator.add_tick(&tick(base_time, 0, 100.0, 1.0));
    aggregator.add_tick(&tick(base_time, 300, 101.0, 2.0));
    aggregator.add_tick(&tick(base_time, 700, 99.0, 1.0));
    aggregator.add_tick(&tick(base_time, 900, 100.0, 1.0));
    aggregator.add_tick(&tick(base_time, 1200, 105.0, 1.0));

    let buffer = aggregator.buffer("1s").unwrap();
    let candles = buffer.lock().get_last(10);
    assert_eq!(candles.len(), 1);

    let candle = &candles[0];
    assert_eq!(candle.datetime, base_time);
    assert_eq!(candle.open, 100.0);
    assert_eq!(candle.high, 101.0);
    assert_eq!(candle.low, 99.0);
    assert_eq!(candle.close, 100.0);
    assert_eq!(candle.volume, 5.0);

    let open = aggregator.open_candle("1s").expect("in-progress candle");
    assert_eq!(open.window_start, base_time.timestamp() + 1);
}

#[rstest]
fn per_second_reconstruction_of_synthetic_sequence(base_time: DateTime<Utc>) {
    let network = TimeframeNetwork::new(vec![Timeframe::parse("1s").unwrap()]).unwrap();
    let mut aggregator = OhlcAggregator::new("BTCUSDT", network);

    // Two ticks per second for 30 seconds, known prices
    let mut expected = Vec::new();
    for second in 0..30i64 {
        let first = 100.0 + second as f64;
        let second_price = first + 0.5;
        aggregator.add_tick(&tick(base_time, second * 1000, first, 1.0));
        aggregator.add_tick(&tick(base_time, second * 1000 + 400, second_price, 1.0));
        expected.push((first, second_price));
    }
    aggregator.force_finalize_all();

    let buffer = aggregator.buffer("1s").unwrap();
    let candles = buffer.lock().get_last(30);
    assert_eq!(candles.len(), 30);
    for (i, candle) in candles.iter().enumerate() {
        let (open, close) = expected[i];
        assert_eq!(candle.open, open);
        assert_eq!(candle.close, close);
        assert_eq!(candle.high, close);
        assert_eq!(candle.low, open);
        assert_eq!(candle.volume, 2.0);
        assert_eq!(
            candle.datetime,
            base_time + chrono::Duration::seconds(i as i64)
        );
    }
}

#[rstest]
fn buffer_datetimes_step_by_timeframe_seconds(base_time: DateTime<Utc>) {
    let network = TimeframeNetwork::from_labels(&["5s"]).unwrap();
    let mut aggregator = OhlcAggregator::new("BTCUSDT", network);

    for i in 0..60i64 {
        aggregator.add_tick(&tick(base_time, i * 1000, 100.0, 1.0));
    }
    aggregator.force_finalize_all();

    let buffer = aggregator.buffer("5s").unwrap();
    let candles = buffer.lock().get_last(100);
    assert_eq!(candles.len(), 12);
    for pair in candles.windows(2) {
        let delta = pair[1].datetime - pair[0].datetime;
        assert_eq!(delta.num_seconds(), 5);
        assert_eq!(pair[0].datetime.timestamp() % 5, 0);
    }
}

#[rstest]
#[case(0, 0)]
#[case(1, 0)]
#[case(1200, 1)]
#[case(4999, 4)]
fn window_alignment(
    base_time: DateTime<Utc>,
    #[case] offset_ms: i64,
    #[case] expected_window_offset: i64,
) {
    let tf = Timeframe::parse("1s").unwrap();
    let start = tf.window_start(base_time + chrono::Duration::milliseconds(offset_ms));
    assert_eq!(
        start,
        base_time + chrono::Duration::seconds(expected_window_offset)
    );
}

#[rstest]
fn every_finalized_candle_is_well_formed(base_time: DateTime<Utc>) {
    let network = TimeframeNetwork::intraday();
    let mut aggregator = OhlcAggregator::new("BTCUSDT", network.clone());

    // Sawtooth prices across several minutes
    for i in 0..600i64 {
        let price = 100.0 + ((i * 7) % 23) as f64 - 11.0;
        aggregator.add_tick(&tick(base_time, i * 500, price, 0.5));
    }
    aggregator.force_finalize_all();

    for tf in network.iter() {
        let buffer = aggregator.buffer(&tf.label).unwrap();
        let window = buffer.lock();
        assert!(window.len() <= window.capacity());
        for candle in window.get_last(window.len()) {
            assert!(candle.is_well_formed(), "bad candle in {}", tf.label);
            assert_eq!(candle.datetime.timestamp() % i64::from(tf.seconds), 0);
        }
    }
}

#[rstest]
fn normalizing_equal_input_twice_yields_equal_candles(base_time: DateTime<Utc>) {
    let run = |prices: &[(i64, f64)]| {
        let network = TimeframeNetwork::from_labels(&["1s"]).unwrap();
        let mut aggregator = OhlcAggregator::new("BTCUSDT", network);
        for &(offset, price) in prices {
            aggregator.add_tick(&tick(base_time, offset, price, 1.0));
        }
        aggregator.force_finalize_all();
        let buffer = aggregator.buffer("1s").unwrap();
        let candles = buffer.lock().get_last(100);
        candles
    };

    let input = [(0, 100.0), (400, 101.0), (1100, 99.5), (2200, 100.5)];
    assert_eq!(run(&input), run(&input));
}
