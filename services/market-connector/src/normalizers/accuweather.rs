//! Normalizer for accuweather current-conditions responses

use super::{num_field, utc_from_iso, utc_from_seconds, Normalizer};
use chainflow_common::Tick;
use serde_json::Value;

/// Decodes the first element of a current-conditions response array.
///
/// The response carries no symbol, so the configured location key is
/// stamped instead. Metric temperature maps to the price and relative
/// humidity to the size.
pub struct AccuweatherNormalizer {
    location_key: String,
}

impl AccuweatherNormalizer {
    #[must_use]
    pub fn new(location_key: impl Into<String>) -> Self {
        Self {
            location_key: location_key.into(),
        }
    }
}

impl Normalizer for AccuweatherNormalizer {
    fn source(&self) -> &'static str {
        "accuweather"
    }

    fn normalize(&self, raw: &Value) -> Option<Tick> {
        let observation = match raw.as_array() {
            Some(items) => items.first()?,
            None => raw,
        };
        let price = num_field(observation.get("Temperature")?.get("Metric")?.get("Value")?)?;
        let ts = observation
            .get("EpochTime")
            .and_then(Value::as_i64)
            .and_then(utc_from_seconds)
            .or_else(|| {
                observation
                    .get("LocalObservationDateTime")
                    .and_then(Value::as_str)
                    .and_then(utc_from_iso)
            })?;

        let mut tick = Tick::new(ts, price, self.location_key.as_str(), self.source());
        if let Some(humidity) = observation.get("RelativeHumidity").and_then(num_field) {
            tick = tick.with_size(humidity);
        }
        Some(tick)
    }
}
