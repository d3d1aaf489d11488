//! Tests for univariate sample aggregation

use chainflow_common::{Tick, TimeframeNetwork};
use chrono::{DateTime, TimeZone, Utc};
use data_aggregator::UnivariateAggregator;
use rstest::*;

#[fixture]
fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
}

#[fixture]
fn aggregator() -> UnivariateAggregator {
    UnivariateAggregator::new("178087", TimeframeNetwork::weather())
}

fn observation(base: DateTime<Utc>, offset_secs: i64, value: f64) -> Tick {
    Tick::new(
        base + chrono::Duration::seconds(offset_secs),
        value,
        "178087",
        "accuweather",
    )
    .with_size(60.0)
}

#[rstest]
fn last_observation_carried_forward(
    mut aggregator: UnivariateAggregator,
    base_time: DateTime<Utc>,
) {
    aggregator.add_tick(&observation(base_time, 0, 21.5));
    aggregator.add_tick(&observation(base_time, 20, 21.8));
    aggregator.add_tick(&observation(base_time, 40, 21.2));
    // crosses into the next minute, finalizing the first window
    aggregator.add_tick(&observation(base_time, 61, 22.0));

    let buffer = aggregator.buffer("1m").unwrap();
    let samples = buffer.lock().get_last(10);
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].datetime, base_time);
    assert_eq!(samples[0].value, 21.2);
}

#[rstest]
fn fan_out_covers_every_weather_timeframe(
    mut aggregator: UnivariateAggregator,
    base_time: DateTime<Utc>,
) {
    aggregator.add_tick(&observation(base_time, 0, 18.0));
    aggregator.force_finalize_all();

    for label in ["1m", "5m", "15m", "1h"] {
        let buffer = aggregator.buffer(label).unwrap();
        let samples = buffer.lock().get_last(1);
        assert_eq!(samples.len(), 1, "missing sample for {label}");
        assert_eq!(samples[0].value, 18.0);
        assert_eq!(samples[0].datetime, base_time);
    }
}

#[rstest]
fn repeated_force_finalize_does_not_duplicate(
    mut aggregator: UnivariateAggregator,
    base_time: DateTime<Utc>,
) {
    aggregator.add_tick(&observation(base_time, 0, 10.0));
    aggregator.force_finalize_all();
    aggregator.force_finalize_all();
    aggregator.force_finalize_all();

    assert_eq!(aggregator.buffer("1m").unwrap().lock().len(), 1);
}
