//! CSV payload construction
//!
//! A payload is the header, the window's records in chronological order,
//! and one placeholder row whose datetime is the next theoretical window
//! start and whose numeric fields are all zero. Given `n` records the body
//! is exactly `n + 2` physical lines.

use chainflow_common::{Candle, UnivariateSample};
use chrono::{DateTime, Duration, Utc};

/// Header for OHLC payloads
pub const CANDLE_HEADER: &str = "datetime,open,high,low,close";

/// Header for univariate payloads
pub const SAMPLE_HEADER: &str = "datetime,value";

fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn next_window_start(last: DateTime<Utc>, step_seconds: u32) -> DateTime<Utc> {
    last + Duration::seconds(i64::from(step_seconds))
}

/// Serialize candles plus the zeroed placeholder row
#[must_use]
pub fn candle_csv(records: &[Candle], step_seconds: u32) -> String {
    let mut lines = Vec::with_capacity(records.len() + 2);
    lines.push(CANDLE_HEADER.to_string());
    for candle in records {
        lines.push(format!(
            "{},{},{},{},{}",
            format_datetime(candle.datetime),
            candle.open,
            candle.high,
            candle.low,
            candle.close
        ));
    }
    if let Some(last) = records.last() {
        lines.push(format!(
            "{},0,0,0,0",
            format_datetime(next_window_start(last.datetime, step_seconds))
        ));
    }
    lines.join("\n")
}

/// Serialize univariate samples plus the zeroed placeholder row
#[must_use]
pub fn sample_csv(records: &[UnivariateSample], step_seconds: u32) -> String {
    let mut lines = Vec::with_capacity(records.len() + 2);
    lines.push(SAMPLE_HEADER.to_string());
    for sample in records {
        lines.push(format!(
            "{},{}",
            format_datetime(sample.datetime),
            sample.value
        ));
    }
    if let Some(last) = records.last() {
        lines.push(format!(
            "{},0",
            format_datetime(next_window_start(last.datetime, step_seconds))
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn minute_candles(count: usize) -> Vec<Candle> {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        (0..count)
            .map(|i| Candle {
                datetime: base + Duration::minutes(i as i64),
                open: 100.0 + i as f64,
                high: 101.0 + i as f64,
                low: 99.0 + i as f64,
                close: 100.5 + i as f64,
                volume: 1.0,
            })
            .collect()
    }

    #[test]
    fn candle_csv_line_count_and_header() {
        let csv = candle_csv(&minute_candles(10), 60);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 12);
        assert_eq!(lines[0], CANDLE_HEADER);
    }

    #[test]
    fn placeholder_row_is_next_window_start_with_zeros() {
        let candles = minute_candles(3);
        let csv = candle_csv(&candles, 60);
        let last_line = csv.lines().last().unwrap();

        assert_eq!(last_line, "2025-01-01T09:03:00Z,0,0,0,0");
    }

    #[test]
    fn placeholder_follows_the_last_record_by_one_step() {
        let candles = minute_candles(5);
        let csv = candle_csv(&candles, 60);
        let lines: Vec<&str> = csv.lines().collect();

        let second_to_last = lines[lines.len() - 2].split(',').next().unwrap();
        let last = lines[lines.len() - 1].split(',').next().unwrap();
        let parse = |s: &str| DateTime::parse_from_rfc3339(s).unwrap();
        assert_eq!(
            (parse(last) - parse(second_to_last)).num_seconds(),
            60
        );
    }

    #[test]
    fn sample_csv_shape() {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let samples: Vec<UnivariateSample> = (0..4)
            .map(|i| UnivariateSample {
                datetime: base + Duration::minutes(i as i64),
                value: 20.0 + i as f64,
            })
            .collect();

        let csv = sample_csv(&samples, 60);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0], SAMPLE_HEADER);
        assert_eq!(lines[1], "2025-01-01T09:00:00Z,20");
        assert_eq!(lines[5], "2025-01-01T09:04:00Z,0");
    }

    #[test]
    fn datetimes_render_without_subseconds() {
        let csv = candle_csv(&minute_candles(1), 60);
        let data_line = csv.lines().nth(1).unwrap();
        assert!(data_line.starts_with("2025-01-01T09:00:00Z,"));
    }
}
