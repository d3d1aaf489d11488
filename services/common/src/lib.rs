//! Common types for the chainflow services
//!
//! Canonical market data shapes (ticks, candles, univariate samples), the
//! timeframe network configuration, connector health reporting, the shared
//! error set, and the environment-backed runtime configuration.

pub mod config;
pub mod errors;
pub mod health;
pub mod timeframe;
pub mod types;

pub use config::{ConnectorKind, RuntimeConfig};
pub use errors::FlowError;
pub use health::{ConnectorStatus, HealthMeter, HealthSnapshot, RateLimitInfo};
pub use timeframe::{Timeframe, TimeframeNetwork, DEFAULT_BUFFER_CAPACITY};
pub use types::{Candle, ChainSignal, Tick, Timestamped, UnivariateSample};
