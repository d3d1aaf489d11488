//! Vendor message normalizers
//!
//! One normalizer per source, all implementing the same contract: decode a
//! raw vendor message into the common tick shape or return `None` so the
//! caller drops it and moves on. Timestamps are converted to UTC instants,
//! numeric strings are parsed, and the source name is stamped on every tick.

pub mod accuweather;
pub mod binance;
pub mod bloomberg;
pub mod polygon;

pub use accuweather::AccuweatherNormalizer;
pub use binance::BinanceNormalizer;
pub use bloomberg::BloombergNormalizer;
pub use polygon::PolygonNormalizer;

use chainflow_common::Tick;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Decode one vendor message into the common tick shape.
///
/// Returns `None` when required fields (symbol, price, timestamp) are
/// missing or the message is not a recognized event kind. Normalizing the
/// same raw message twice yields equal ticks.
pub trait Normalizer: Send + Sync {
    /// Source name stamped on produced ticks
    fn source(&self) -> &'static str;

    /// Decode a raw message
    fn normalize(&self, raw: &Value) -> Option<Tick>;
}

/// Numeric field that may arrive as a JSON number or string
pub(crate) fn num_field(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn utc_from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

pub(crate) fn utc_from_seconds(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// ISO-8601 string; values without an offset are read as UTC
pub(crate) fn utc_from_iso(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .map(|naive| naive.and_utc())
                .ok()
        })
}
