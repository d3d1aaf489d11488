//! Normalizer for the binance trade streams

use super::{num_field, utc_from_millis, Normalizer};
use chainflow_common::Tick;
use serde_json::Value;

/// Decodes `trade` and `aggTrade` events, unwrapping multiplexed
/// `{ stream, data }` envelopes transparently. Other event kinds yield
/// `None`.
pub struct BinanceNormalizer;

impl Normalizer for BinanceNormalizer {
    fn source(&self) -> &'static str {
        "binance"
    }

    fn normalize(&self, raw: &Value) -> Option<Tick> {
        let payload = raw.get("data").unwrap_or(raw);
        let event = payload.get("e")?.as_str()?;
        if event != "trade" && event != "aggTrade" {
            return None;
        }
        let symbol = payload.get("s")?.as_str()?;
        let price = num_field(payload.get("p")?)?;
        // trade time over event (receipt) time
        let millis = payload
            .get("T")
            .and_then(Value::as_i64)
            .or_else(|| payload.get("E").and_then(Value::as_i64))?;
        let ts = utc_from_millis(millis)?;

        let mut tick = Tick::new(ts, price, symbol, self.source());
        if let Some(size) = payload.get("q").and_then(num_field) {
            tick = tick.with_size(size);
        }
        Some(tick)
    }
}
