//! Normalizer for the polygon equities trade channel

use super::{num_field, utc_from_millis, Normalizer};
use chainflow_common::Tick;
use chrono::DateTime;
use serde_json::Value;

/// Decodes `T` (trade) events from the streaming channel. Status events are
/// the connector's business and yield `None` here. The range-trade rows the
/// backfill endpoint returns are decoded by `normalize_range_trade`.
pub struct PolygonNormalizer;

impl Normalizer for PolygonNormalizer {
    fn source(&self) -> &'static str {
        "polygon"
    }

    fn normalize(&self, raw: &Value) -> Option<Tick> {
        let event = raw.get("ev")?.as_str()?;
        if event != "T" {
            return None;
        }
        let symbol = raw.get("sym")?.as_str()?;
        let price = num_field(raw.get("p")?)?;
        let ts = utc_from_millis(raw.get("t")?.as_i64()?)?;

        let mut tick = Tick::new(ts, price, symbol, self.source());
        if let Some(size) = raw.get("s").and_then(num_field) {
            tick = tick.with_size(size);
        }
        Some(tick)
    }
}

impl PolygonNormalizer {
    /// Trade row from the range-trade REST endpoint, which reports
    /// nanosecond timestamps
    pub fn normalize_range_trade(&self, symbol: &str, raw: &Value) -> Option<Tick> {
        let nanos = raw
            .get("sip_timestamp")
            .and_then(Value::as_i64)
            .or_else(|| raw.get("participant_timestamp").and_then(Value::as_i64))?;
        let ts = DateTime::from_timestamp_nanos(nanos);
        let price = num_field(raw.get("price")?)?;

        let mut tick = Tick::new(ts, price, symbol, self.source());
        if let Some(size) = raw.get("size").and_then(num_field) {
            tick = tick.with_size(size);
        }
        Some(tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_trade_event() {
        let payload = json!({
            "ev": "T",
            "sym": "AAPL",
            "p": 189.42,
            "s": 100,
            "t": 1735725600250i64
        });
        let tick = PolygonNormalizer.normalize(&payload).unwrap();

        assert_eq!(tick.symbol, "AAPL");
        assert_eq!(tick.source, "polygon");
        assert_eq!(tick.price, 189.42);
        assert_eq!(tick.size, Some(100.0));
        assert_eq!(tick.ts.timestamp_millis(), 1735725600250);
    }

    #[test]
    fn ignores_status_events() {
        let payload = json!({
            "ev": "status",
            "status": "auth_success",
            "message": "authenticated"
        });
        assert!(PolygonNormalizer.normalize(&payload).is_none());
    }

    #[test]
    fn rejects_trade_without_timestamp() {
        let payload = json!({"ev": "T", "sym": "AAPL", "p": 100.0});
        assert!(PolygonNormalizer.normalize(&payload).is_none());
    }

    #[test]
    fn decodes_range_trade_row() {
        let row = json!({
            "sip_timestamp": 1735725600250000000i64,
            "price": 189.40,
            "size": 50
        });
        let tick = PolygonNormalizer
            .normalize_range_trade("AAPL", &row)
            .unwrap();

        assert_eq!(tick.symbol, "AAPL");
        assert_eq!(tick.ts.timestamp_millis(), 1735725600250);
        assert_eq!(tick.size, Some(50.0));
    }

    #[test]
    fn range_trade_falls_back_to_participant_timestamp() {
        let row = json!({
            "participant_timestamp": 1735725600000000000i64,
            "price": 10.0
        });
        let tick = PolygonNormalizer
            .normalize_range_trade("MSFT", &row)
            .unwrap();
        assert_eq!(tick.ts.timestamp(), 1735725600);
        assert_eq!(tick.size, None);
    }
}
