//! Timeframe aggregator implementations

pub mod ohlc;
pub mod univariate;

pub use ohlc::{CandleInProgress, OhlcAggregator};
pub use univariate::{SampleInProgress, UnivariateAggregator};
