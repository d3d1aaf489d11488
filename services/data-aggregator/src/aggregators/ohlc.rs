//! OHLC candle aggregation across a timeframe network

use crate::buffer::{RollingWindow, SharedWindow};
use chainflow_common::{Candle, Tick, TimeframeNetwork};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tracing::debug;

type CompletionListener = Box<dyn Fn(&Candle, &str) + Send + Sync>;

/// Candle under construction for one timeframe window.
///
/// Created by the first tick of a window, mutated by every subsequent tick
/// in the same window, finalized when a tick for a different window arrives
/// or on `force_finalize_all`.
#[derive(Clone, Debug, PartialEq)]
pub struct CandleInProgress {
    /// Epoch-second start of the window
    pub window_start: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub tick_count: u64,
}

impl CandleInProgress {
    fn open_with(window_start: i64, price: f64, size: Option<f64>) -> Self {
        Self {
            window_start,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: size.unwrap_or(0.0),
            tick_count: 1,
        }
    }

    fn update(&mut self, price: f64, size: Option<f64>) {
        if price > self.high {
            self.high = price;
        }
        if price < self.low {
            self.low = price;
        }
        self.close = price;
        self.volume += size.unwrap_or(0.0);
        self.tick_count += 1;
    }

    fn finalize(&self) -> Candle {
        Candle {
            datetime: window_datetime(self.window_start),
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

/// Folds ticks for a single symbol into candles across every timeframe of a
/// network.
///
/// The aggregator exclusively owns its in-progress candles and is driven by
/// one ingest task; the rolling windows it fills are shared with the dispatch
/// task through [`SharedWindow`] handles. Completion listeners run
/// synchronously after a candle is pushed and must not call back into the
/// aggregator.
pub struct OhlcAggregator {
    symbol: String,
    network: TimeframeNetwork,
    open_candles: FxHashMap<String, CandleInProgress>,
    buffers: FxHashMap<String, SharedWindow<Candle>>,
    listeners: Vec<CompletionListener>,
}

impl std::fmt::Debug for OhlcAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OhlcAggregator")
            .field("symbol", &self.symbol)
            .field("timeframes", &self.network.len())
            .field("open_candles", &self.open_candles.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl OhlcAggregator {
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
            open_candles: FxHashMap::default(),
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
    pub fn buffer(&self, label: &str) -> Option<SharedWindow<Candle>> {
        self.buffers.get(label).cloned()
    }

    /// Register a listener invoked with `(candle, timeframe_label)` after
    /// each finalized candle is pushed to its buffer
    pub fn on_complete(&mut self, listener: impl Fn(&Candle, &str) + Send + Sync + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Fold one tick into every timeframe of the network.
    ///
    /// Ticks for other symbols are dropped silently. A tick whose window
    /// differs from the open one (later or earlier) finalizes the open
    /// candle; finalized candles are never back-patched.
    pub fn add_tick(&mut self, tick: &Tick) {
        if tick.symbol != self.symbol {
            return;
        }
        for tf in self.network.iter() {
            let start = tf.window_start_secs(tick.ts);
            match self.open_candles.entry(tf.label.clone()) {
                Entry::Occupied(mut entry) => {
                    let current = entry.get_mut();
                    if current.window_start == start {
                        current.update(tick.price, tick.size);
                    } else {
                        let finished = std::mem::replace(
                            current,
                            CandleInProgress::open_with(start, tick.price, tick.size),
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
                    entry.insert(CandleInProgress::open_with(start, tick.price, tick.size));
                }
            }
        }
    }

    /// Push already-finalized candles straight into a timeframe's buffer,
    /// oldest first, without invoking listeners. Used to seed windows from
    /// historical data before streaming starts. Returns the number pushed.
    pub fn seed_candles(&mut self, label: &str, candles: Vec<Candle>) -> usize {
        let Some(buffer) = self.buffers.get(label) else {
            debug!("no buffer for timeframe '{label}', seed skipped");
            return 0;
        };
        let mut window = buffer.lock();
        let count = candles.len();
        for candle in candles {
            window.push(candle);
        }
        count
    }

    /// Finalize every in-progress candle and clear the in-progress map.
    ///
    /// Invoked during graceful shutdown; calling it twice is a no-op the
    /// second time.
    pub fn force_finalize_all(&mut self) {
        for tf in self.network.iter() {
            if let Some(finished) = self.open_candles.remove(tf.label.as_str()) {
                push_and_notify(
                    &self.buffers,
                    &self.listeners,
                    &tf.label,
                    finished.finalize(),
                );
            }
        }
    }

    /// The in-progress candle for a timeframe, if one is open
    #[must_use]
    pub fn open_candle(&self, label: &str) -> Option<&CandleInProgress> {
        self.open_candles.get(label)
    }
}

fn push_and_notify(
    buffers: &FxHashMap<String, SharedWindow<Candle>>,
    listeners: &[CompletionListener],
    label: &str,
    candle: Candle,
) {
    debug!(
        "finalized {} candle at {}: o={} h={} l={} c={} v={}",
        label, candle.datetime, candle.open, candle.high, candle.low, candle.close, candle.volume
    );
    if let Some(buffer) = buffers.get(label) {
        buffer.lock().push(candle.clone());
    }
    for listener in listeners {
        listener(&candle, label);
    }
}

pub(crate) fn window_datetime(window_start: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(window_start, 0).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainflow_common::Timeframe;
    use chrono::TimeZone;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap()
    }

    fn tick_at(offset_ms: i64, price: f64, size: f64) -> Tick {
        Tick::new(
            base() + chrono::Duration::milliseconds(offset_ms),
            price,
            "BTCUSDT",
            "binance",
        )
        .with_size(size)
    }

    fn one_second_network() -> TimeframeNetwork {
        TimeframeNetwork::new(vec![Timeframe::parse("1s").unwrap()]).unwrap()
    }

    #[test]
    fn first_tick_opens_one_candle_per_timeframe() {
        let network = TimeframeNetwork::from_labels(&["1s", "5s"]).unwrap();
        let mut agg = OhlcAggregator::new("BTCUSDT", network);

        agg.add_tick(&tick_at(0, 100.0, 1.0));

        assert!(agg.open_candle("1s").is_some());
        assert!(agg.open_candle("5s").is_some());
        assert_eq!(agg.buffer("1s").unwrap().lock().len(), 0);
        assert_eq!(agg.buffer("5s").unwrap().lock().len(), 0);
    }

    #[test]
    fn one_second_window_folds_and_finalizes() {
        let mut agg = OhlcAggregator::new("BTCUSDT", one_second_network());

        agg.add_tick(&tick_at(0, 100.0, 1.0));
        agg.add_tick(&tick_at(300, 101.0, 2.0));
        agg.add_tick(&tick_at(700, 99.0, 1.0));
        agg.add_tick(&tick_at(900, 100.0, 1.0));
        agg.add_tick(&tick_at(1200, 105.0, 1.0));

        let buffer = agg.buffer("1s").unwrap();
        let window = buffer.lock();
        assert_eq!(window.len(), 1);

        let candle = &window.get_last(1)[0];
        assert_eq!(candle.datetime, base());
        assert_eq!(candle.open, 100.0);
        assert_eq!(candle.high, 101.0);
        assert_eq!(candle.low, 99.0);
        assert_eq!(candle.close, 100.0);
        assert_eq!(candle.volume, 5.0);
        assert!(candle.is_well_formed());
        drop(window);

        let open = agg.open_candle("1s").unwrap();
        assert_eq!(open.window_start, base().timestamp() + 1);
        assert_eq!(open.open, 105.0);
    }

    #[test]
    fn multi_timeframe_fan_out_finalizes_both() {
        let network = TimeframeNetwork::from_labels(&["1s", "5s"]).unwrap();
        let mut agg = OhlcAggregator::new("BTCUSDT", network);

        agg.add_tick(&tick_at(0, 100.0, 0.0));
        assert_eq!(agg.buffer("1s").unwrap().lock().len(), 0);
        assert_eq!(agg.buffer("5s").unwrap().lock().len(), 0);

        agg.add_tick(&tick_at(6000, 101.0, 0.0));

        assert_eq!(agg.buffer("1s").unwrap().lock().len(), 1);
        assert_eq!(agg.buffer("5s").unwrap().lock().len(), 1);
        let five = agg.buffer("5s").unwrap().lock().get_last(1).remove(0);
        assert_eq!(five.datetime, base());
    }

    #[test]
    fn wrong_symbol_is_dropped_silently() {
        let mut agg = OhlcAggregator::new("BTCUSDT", one_second_network());

        let mut foreign = tick_at(0, 100.0, 1.0);
        foreign.symbol = "ETHUSDT".to_string();
        agg.add_tick(&foreign);

        assert!(agg.open_candle("1s").is_none());
    }

    #[test]
    fn earlier_window_tick_finalizes_current() {
        let mut agg = OhlcAggregator::new("BTCUSDT", one_second_network());

        agg.add_tick(&tick_at(5000, 100.0, 1.0));
        // out-of-order: earlier window after a later one opened
        agg.add_tick(&tick_at(1000, 90.0, 1.0));

        let buffer = agg.buffer("1s").unwrap();
        assert_eq!(buffer.lock().len(), 1);
        let open = agg.open_candle("1s").unwrap();
        assert_eq!(open.window_start, base().timestamp() + 1);
        assert_eq!(open.open, 90.0);
    }

    #[test]
    fn same_timestamp_ticks_accumulate() {
        let mut agg = OhlcAggregator::new("BTCUSDT", one_second_network());

        agg.add_tick(&tick_at(0, 100.0, 1.0));
        agg.add_tick(&tick_at(0, 102.0, 2.0));

        let open = agg.open_candle("1s").unwrap();
        assert_eq!(open.high, 102.0);
        assert_eq!(open.volume, 3.0);
        assert_eq!(open.tick_count, 2);
    }

    #[test]
    fn sizeless_ticks_leave_volume_zero() {
        let mut agg = OhlcAggregator::new("BTCUSDT", one_second_network());

        agg.add_tick(&Tick::new(base(), 100.0, "BTCUSDT", "binance"));
        agg.add_tick(&Tick::new(
            base() + chrono::Duration::milliseconds(500),
            101.0,
            "BTCUSDT",
            "binance",
        ));
        agg.force_finalize_all();

        let candle = agg.buffer("1s").unwrap().lock().get_last(1).remove(0);
        assert_eq!(candle.volume, 0.0);
    }

    #[test]
    fn force_finalize_all_is_idempotent() {
        let mut agg = OhlcAggregator::new("BTCUSDT", one_second_network());
        agg.add_tick(&tick_at(0, 100.0, 1.0));

        agg.force_finalize_all();
        let len_after_first = agg.buffer("1s").unwrap().lock().len();
        agg.force_finalize_all();
        let len_after_second = agg.buffer("1s").unwrap().lock().len();

        assert_eq!(len_after_first, 1);
        assert_eq!(len_after_second, 1);
        assert!(agg.open_candle("1s").is_none());
    }

    #[test]
    fn listeners_fire_after_push() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let mut agg = OhlcAggregator::new("BTCUSDT", one_second_network());
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        agg.on_complete(move |candle, label| {
            assert_eq!(label, "1s");
            assert!(candle.is_well_formed());
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        agg.add_tick(&tick_at(0, 100.0, 1.0));
        agg.add_tick(&tick_at(1100, 101.0, 1.0));
        agg.force_finalize_all();

        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn seed_candles_fills_buffer_without_listeners() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let mut agg = OhlcAggregator::new("BTCUSDT", one_second_network());
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        agg.on_complete(move |_, _| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        let candles: Vec<Candle> = (0..3)
            .map(|i| Candle {
                datetime: base() + chrono::Duration::seconds(i),
                open: 100.0,
                high: 100.0,
                low: 100.0,
                close: 100.0,
                volume: 0.0,
            })
            .collect();
        let seeded = agg.seed_candles("1s", candles);

        assert_eq!(seeded, 3);
        assert_eq!(agg.buffer("1s").unwrap().lock().len(), 3);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
