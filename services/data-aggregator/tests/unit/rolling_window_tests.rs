//! Tests for the bounded rolling window

use chainflow_common::{Candle, Timestamped};
use chrono::{DateTime, TimeZone, Utc};
use data_aggregator::RollingWindow;
use rstest::*;

#[fixture]
fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

fn candle(base: DateTime<Utc>, minute: i64) -> Candle {
    Candle {
        datetime: base + chrono::Duration::minutes(minute),
        open: 100.0 + minute as f64,
        high: 101.0 + minute as f64,
        low: 99.0 + minute as f64,
        close: 100.5 + minute as f64,
        volume: 10.0,
    }
}

#[rstest]
fn size_never_exceeds_capacity(base_time: DateTime<Utc>) {
    let mut window = RollingWindow::new(100);
    for i in 0..500 {
        window.push(candle(base_time, i));
        assert!(window.len() <= 100);
    }
    assert!(window.is_full());
}

#[rstest]
fn eviction_is_fifo(base_time: DateTime<Utc>) {
    let mut window = RollingWindow::new(5);
    for i in 0..8 {
        window.push(candle(base_time, i));
    }

    let records = window.get_last(5);
    let minutes: Vec<i64> = records
        .iter()
        .map(|c| (c.datetime() - base_time).num_minutes())
        .collect();
    assert_eq!(minutes, vec![3, 4, 5, 6, 7]);
}

#[rstest]
fn consecutive_records_are_strictly_increasing(base_time: DateTime<Utc>) {
    let mut window = RollingWindow::new(50);
    for i in 0..50 {
        window.push(candle(base_time, i));
    }

    let records = window.get_last(50);
    for pair in records.windows(2) {
        assert!(pair[0].datetime() < pair[1].datetime());
        let delta = pair[1].datetime() - pair[0].datetime();
        assert_eq!(delta.num_seconds() % 60, 0);
    }
}

#[rstest]
fn records_are_value_copies(base_time: DateTime<Utc>) {
    let mut window = RollingWindow::new(5);
    let mut original = candle(base_time, 0);
    window.push(original.clone());

    // mutating the producer's copy must not affect the stored record
    original.close = 0.0;
    assert_eq!(window.get_last(1)[0].close, 100.5);
}

#[rstest]
fn oldest_and_newest_track_contents(base_time: DateTime<Utc>) {
    let mut window = RollingWindow::new(3);
    assert!(window.oldest_datetime().is_none());

    window.push(candle(base_time, 1));
    window.push(candle(base_time, 2));
    assert_eq!(
        window.oldest_datetime(),
        Some(base_time + chrono::Duration::minutes(1))
    );
    assert_eq!(
        window.newest_datetime(),
        Some(base_time + chrono::Duration::minutes(2))
    );
}
