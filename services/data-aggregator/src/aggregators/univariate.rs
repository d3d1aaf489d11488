//! Univariate (single-value) aggregation across a timeframe network
//!
//! Same skeleton as the OHLC aggregator, but each window finalizes to the
//! most recent observed value (last observation carried forward).

use crate::aggregators::ohlc::window_datetime;
use crate::buffer::{RollingWindow, SharedWindow};
use chainflow_common::{Tick, TimeframeNetwork, UnivariateSample};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tracing::debug;

type CompletionListener = Box<dyn Fn(&UnivariateSample, &str) + Send + Sync>;

/// Sample under construction for one timeframe window.
///
/// `sum` and `count` accumulate alongside the carried value; finalization
/// uses the carried value only.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleInProgress {
    /// Epoch-second start of the window
    pub window_start: i64,
    /// Most recent observed value
    pub value: f64,
    pub sum: f64,
    pub count: u64,
}

impl SampleInProgress {
    fn open_with(window_start: i64, value: f64) -> Self {
        Self {
            window_start,
            value,
            sum: value,
            count: 1,
        }
    }

    fn update(&mut self, value: f64) {
        self.value = value;
        self.sum += value;
        self.count += 1;
    }

    fn finalize(&self) -> UnivariateSample {
        UnivariateSample {
            datetime: window_datetime(self.window_start),
            value: self.value,
        }
    }
}

/// Folds ticks for a single symbol into univariate samples across every
/// timeframe of a network. Ownership and listener rules match
/// [`crate::OhlcAggregator`].
pub struct UnivariateAggregator {
    symbol: String,
    network: TimeframeNetwork,
    open_samples: FxHashMap<String, SampleInProgress>,
    buffers: FxHashMap<String, SharedWindow<UnivariateSample>>,
    listeners: Vec<CompletionListener>,
}

impl std::fmt::Debug for UnivariateAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnivariateAggregator")
            .field("symbol", &self.symbol)
            .field("timeframes", &self.network.len())
            .field("open_samples", &self.open_samples.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl UnivariateAggregator {
    /// Create an aggregator with one rolling window per timeframe
    #[must_use]
    pub fn new(symbol: impl Into<String>, network: TimeframeNetwork) -> Self {
        let buffers = network
            .iter()
            .map(|tf| {
                (
                    tf.label.clone(),
                    Arc::new(Mutex::new(RollingWindow::new(tf.capacity))),
                )
            })
            .collect();
        Self {
            symbol: symbol.into(),
            network,
            open_samples: FxHashMap::default(),
            buffers,
            listeners: Vec::new(),
        }
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[must_use]
    pub fn network(&self) -> &TimeframeNetwork {
        &self.network
    }

    /// Handle to the rolling window for a timeframe label
    #[must_use]
    pub fn buffer(&self, label: &str) -> Option<SharedWindow<UnivariateSample>> {
        self.buffers.get(label).cloned()
    }

    /// Register a listener invoked with `(sample, timeframe_label)` after
    /// each finalized sample is pushed to its buffer
    pub fn on_complete(
        &mut self,
        listener: impl Fn(&UnivariateSample, &str) + Send + Sync + 'static,
    ) {
        self.listeners.push(Box::new(listener));
    }

    /// Fold one tick into every timeframe of the network
    pub fn add_tick(&mut self, tick: &Tick) {
        if tick.symbol != self.symbol {
            return;
        }
        for tf in self.network.iter() {
            let start = tf.window_start_secs(tick.ts);
            match self.open_samples.entry(tf.label.clone()) {
                Entry::Occupied(mut entry) => {
                    let current = entry.get_mut();
                    if current.window_start == start {
                        current.update(tick.price);
                    } else {
                        let finished = std::mem::replace(
                            current,
                            SampleInProgress::open_with(start, tick.price),
                        );
                        push_and_notify(
                            &self.buffers,
                            &self.listeners,
                            &tf.label,
                            finished.finalize(),
                        );
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(SampleInProgress::open_with(start, tick.price));
                }
            }
        }
    }

    /// Finalize every in-progress sample and clear the in-progress map
    pub fn force_finalize_all(&mut self) {
        for tf in self.network.iter() {
            if let Some(finished) = self.open_samples.remove(tf.label.as_str()) {
                push_and_notify(
                    &self.buffers,
                    &self.listeners,
                    &tf.label,
                    finished.finalize(),
                );
            }
        }
    }

    /// The in-progress sample for a timeframe, if one is open
    #[must_use]
    pub fn open_sample(&self, label: &str) -> Option<&SampleInProgress> {
        self.open_samples.get(label)
    }
}

fn push_and_notify(
    buffers: &FxHashMap<String, SharedWindow<UnivariateSample>>,
    listeners: &[CompletionListener],
    label: &str,
    sample: UnivariateSample,
) {
    debug!(
        "finalized {} sample at {}: value={}",
        label, sample.datetime, sample.value
    );
    if let Some(buffer) = buffers.get(label) {
        buffer.lock().push(sample.clone());
    }
    for listener in listeners {
        listener(&sample, label);
    }
}
