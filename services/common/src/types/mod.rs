//! Canonical data types shared across the pipeline

pub mod market;

pub use market::{Candle, ChainSignal, Tick, Timestamped, UnivariateSample};
