//! Canonical market data types for the ingestion pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Records that carry the aligned window-start instant they were built for.
///
/// Implemented by every record shape a rolling window can hold so buffers
/// can expose oldest/newest datetimes without knowing the record type.
pub trait Timestamped {
    /// Aligned window-start of this record
    fn datetime(&self) -> DateTime<Utc>;
}

/// A single normalized observation produced by a source normalizer.
///
/// Immutable after construction. Connectors hand ticks to their aggregator
/// in receive order; nothing downstream mutates them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Vendor-supplied trade/observation time, converted to UTC
    pub ts: DateTime<Utc>,
    /// Trade or observation price
    pub price: f64,
    /// Traded size when the vendor carries one (non-negative)
    pub size: Option<f64>,
    /// Upstream symbol, e.g. `BTCUSDT` or a location key
    pub symbol: String,
    /// Source name stamped by the normalizer, e.g. `binance`
    pub source: String,
}

impl Tick {
    /// Create a tick without a size
    #[must_use]
    pub fn new(
        ts: DateTime<Utc>,
        price: f64,
        symbol: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            ts,
            price,
            size: None,
            symbol: symbol.into(),
            source: source.into(),
        }
    }

    /// Attach a traded size
    #[must_use]
    pub fn with_size(mut self, size: f64) -> Self {
        self.size = Some(size);
        self
    }
}

/// Finalized OHLC candle for one timeframe window
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Window start, aligned to a multiple of the timeframe's seconds
    pub datetime: DateTime<Utc>,
    /// First tick price in the window
    pub open: f64,
    /// Highest tick price in the window
    pub high: f64,
    /// Lowest tick price in the window
    pub low: f64,
    /// Last tick price in the window
    pub close: f64,
    /// Sum of tick sizes in the window (0 when all ticks lack size)
    pub volume: f64,
}

impl Candle {
    /// Check the OHLC ordering invariant
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.low <= self.open.min(self.close)
            && self.open.max(self.close) <= self.high
            && self.low <= self.high
    }
}

impl Timestamped for Candle {
    fn datetime(&self) -> DateTime<Utc> {
        self.datetime
    }
}

/// Finalized single-value sample for one timeframe window.
///
/// The value is the most recent tick price observed within the window
/// (last observation carried forward).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnivariateSample {
    /// Window start, aligned to a multiple of the timeframe's seconds
    pub datetime: DateTime<Utc>,
    /// Last observed value within the window
    pub value: f64,
}

impl Timestamped for UnivariateSample {
    fn datetime(&self) -> DateTime<Utc> {
        self.datetime
    }
}

/// Parsed response from the causal-intelligence service for one dispatch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainSignal {
    /// Window the signal refers to, as reported by the service
    pub datetime: DateTime<Utc>,
    /// Direction of the detected chain: -1, 0, or 1
    pub chain_detected: i8,
    /// Local receipt time, stamped when the response was parsed
    pub received_at: DateTime<Utc>,
}
