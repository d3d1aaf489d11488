//! Timeframe configuration and window alignment

use crate::errors::FlowError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default rolling-window capacity per (symbol, timeframe) pair
pub const DEFAULT_BUFFER_CAPACITY: usize = 5000;

/// A fixed-duration aggregation window.
///
/// `label` follows the `<count><unit>` grammar with units `s`, `m`, `h`
/// (e.g. `15s`, `1m`, `1h`) and doubles as the vendor interval string for
/// sources that accept one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeframe {
    /// Window length in seconds, always positive
    pub seconds: u32,
    /// Unique human-readable label, e.g. `1m`
    pub label: String,
    /// Rolling-window capacity for this timeframe
    pub capacity: usize,
}

impl Timeframe {
    /// Parse a `<count><unit>` label into a timeframe with the default
    /// buffer capacity.
    pub fn parse(label: &str) -> Result<Self, FlowError> {
        let split = label
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| FlowError::config(format!("timeframe label '{label}' has no unit")))?;
        let (count, unit) = label.split_at(split);
        let count: u32 = count
            .parse()
            .map_err(|_| FlowError::config(format!("timeframe label '{label}' has no count")))?;
        if count == 0 {
            return Err(FlowError::config(format!(
                "timeframe label '{label}' must be positive"
            )));
        }
        let unit_seconds = match unit {
            "s" => 1,
            "m" => 60,
            "h" => 3600,
            other => {
                return Err(FlowError::config(format!(
                    "timeframe label '{label}' has unknown unit '{other}'"
                )))
            }
        };
        Ok(Self {
            seconds: count * unit_seconds,
            label: label.to_string(),
            capacity: DEFAULT_BUFFER_CAPACITY,
        })
    }

    /// Override the rolling-window capacity
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Epoch-second start of the window containing `ts`
    #[must_use]
    pub fn window_start_secs(&self, ts: DateTime<Utc>) -> i64 {
        let step = i64::from(self.seconds);
        ts.timestamp().div_euclid(step) * step
    }

    /// Start instant of the window containing `ts`
    #[must_use]
    pub fn window_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        DateTime::from_timestamp(self.window_start_secs(ts), 0).unwrap_or_else(Utc::now)
    }
}

/// Non-empty ordered set of timeframes with unique labels
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeframeNetwork {
    timeframes: Vec<Timeframe>,
}

impl TimeframeNetwork {
    /// Build a network, validating non-emptiness and label uniqueness
    pub fn new(timeframes: Vec<Timeframe>) -> Result<Self, FlowError> {
        if timeframes.is_empty() {
            return Err(FlowError::config("timeframe network is empty"));
        }
        for (i, tf) in timeframes.iter().enumerate() {
            if timeframes[..i].iter().any(|other| other.label == tf.label) {
                return Err(FlowError::config(format!(
                    "duplicate timeframe label '{}'",
                    tf.label
                )));
            }
        }
        Ok(Self { timeframes })
    }

    /// Build a network from labels, all with the default capacity
    pub fn from_labels(labels: &[&str]) -> Result<Self, FlowError> {
        let timeframes = labels
            .iter()
            .map(|label| Timeframe::parse(label))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(timeframes)
    }

    /// Canonical equities/crypto network: one second up to one hour
    #[must_use]
    pub fn intraday() -> Self {
        Self {
            timeframes: ["1s", "5s", "15s", "1m", "5m", "15m", "1h"]
                .iter()
                .map(|label| known(label))
                .collect(),
        }
    }

    /// Canonical weather network: one minute up to one hour
    #[must_use]
    pub fn weather() -> Self {
        Self {
            timeframes: ["1m", "5m", "15m", "1h"]
                .iter()
                .map(|label| known(label))
                .collect(),
        }
    }

    /// Iterate timeframes in declaration order
    pub fn iter(&self) -> std::slice::Iter<'_, Timeframe> {
        self.timeframes.iter()
    }

    /// Look up a timeframe by label
    #[must_use]
    pub fn get(&self, label: &str) -> Option<&Timeframe> {
        self.timeframes.iter().find(|tf| tf.label == label)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.timeframes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timeframes.is_empty()
    }
}

/// Parse a label known to be valid at compile time
fn known(label: &str) -> Timeframe {
    Timeframe::parse(label).unwrap_or(Timeframe {
        seconds: 60,
        label: label.to_string(),
        capacity: DEFAULT_BUFFER_CAPACITY,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1s", 1)]
    #[case("15s", 15)]
    #[case("1m", 60)]
    #[case("5m", 300)]
    #[case("1h", 3600)]
    fn parses_labels(#[case] label: &str, #[case] seconds: u32) {
        let tf = Timeframe::parse(label).unwrap();
        assert_eq!(tf.seconds, seconds);
        assert_eq!(tf.label, label);
        assert_eq!(tf.capacity, DEFAULT_BUFFER_CAPACITY);
    }

    #[rstest]
    #[case("")]
    #[case("m")]
    #[case("0s")]
    #[case("5x")]
    #[case("1.5m")]
    fn rejects_malformed_labels(#[case] label: &str) {
        assert!(Timeframe::parse(label).is_err());
    }

    #[test]
    fn window_start_floors_to_multiple() {
        let tf = Timeframe::parse("5s").unwrap();
        let ts = DateTime::parse_from_rfc3339("2025-01-01T10:00:07.300Z")
            .unwrap()
            .with_timezone(&Utc);

        let start = tf.window_start(ts);
        assert_eq!(start.timestamp() % 5, 0);
        assert_eq!(
            start,
            DateTime::parse_from_rfc3339("2025-01-01T10:00:05Z").unwrap()
        );
    }

    #[test]
    fn network_rejects_duplicate_labels() {
        let result = TimeframeNetwork::from_labels(&["1m", "5m", "1m"]);
        assert!(result.is_err());
    }

    #[test]
    fn network_rejects_empty() {
        assert!(TimeframeNetwork::new(Vec::new()).is_err());
    }

    #[test]
    fn canonical_networks_are_valid() {
        let intraday = TimeframeNetwork::intraday();
        assert_eq!(intraday.get("1s").map(|tf| tf.seconds), Some(1));
        assert_eq!(intraday.get("1h").map(|tf| tf.seconds), Some(3600));

        let weather = TimeframeNetwork::weather();
        assert!(weather.get("1s").is_none());
        assert_eq!(weather.len(), 4);
    }
}
