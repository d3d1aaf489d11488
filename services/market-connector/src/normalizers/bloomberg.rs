//! Normalizer for subscription-session market-data events

use super::{num_field, utc_from_millis, Normalizer};
use chainflow_common::Tick;
use serde_json::Value;

/// Field names probed for a price, in preference order
const PRICE_FIELDS: [&str; 4] = ["LAST_TRADE", "LAST_PRICE", "BID", "ASK"];

/// Decodes a session event's field map. The price is the first non-null
/// among `LAST_TRADE`, `LAST_PRICE`, `BID`, `ASK`; the size is `VOLUME`.
/// The connector resolves the correlation id to a security string and
/// stores it under `security` before handing the event here.
pub struct BloombergNormalizer;

impl Normalizer for BloombergNormalizer {
    fn source(&self) -> &'static str {
        "bloomberg"
    }

    fn normalize(&self, raw: &Value) -> Option<Tick> {
        let security = raw.get("security")?.as_str()?;
        let price = PRICE_FIELDS
            .iter()
            .find_map(|field| raw.get(*field).filter(|v| !v.is_null()).and_then(num_field))?;
        let ts = raw
            .get("timestamp")
            .and_then(Value::as_i64)
            .and_then(utc_from_millis)?;

        let mut tick = Tick::new(ts, price, security, self.source());
        if let Some(volume) = raw.get("VOLUME").and_then(num_field) {
            tick = tick.with_size(volume);
        }
        Some(tick)
    }
}
