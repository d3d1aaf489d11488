//! Data Aggregator Service
//!
//! Folds normalized ticks into OHLC candles (or univariate samples) across a
//! configurable network of timeframes. Finalized records land in bounded
//! rolling windows shared with the dispatch task; completion listeners fire
//! synchronously after each push.

pub mod aggregators;
pub mod buffer;

pub use aggregators::{CandleInProgress, OhlcAggregator, SampleInProgress, UnivariateAggregator};
pub use buffer::{RollingWindow, SharedWindow};
