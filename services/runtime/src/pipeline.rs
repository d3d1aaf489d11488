//! One ingestion pipeline: a connector wired to its aggregator and an
//! optional causal dispatcher

use causal_client::CausalClient;
use chainflow_common::{ChainSignal, TimeframeNetwork};
use data_aggregator::{OhlcAggregator, UnivariateAggregator};
use market_connector::Connector;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Aggregator variant owned by a pipeline
#[derive(Clone)]
pub enum PipelineAggregator {
    Ohlc(Arc<Mutex<OhlcAggregator>>),
    Univariate(Arc<Mutex<UnivariateAggregator>>),
}

impl PipelineAggregator {
    /// Finalize every in-progress record across all timeframes
    pub fn force_finalize_all(&self) {
        match self {
            Self::Ohlc(agg) => agg.lock().force_finalize_all(),
            Self::Univariate(agg) => agg.lock().force_finalize_all(),
        }
    }
}

/// A connector, its aggregator, and an optional dispatcher
pub struct Pipeline {
    pub name: &'static str,
    pub network: TimeframeNetwork,
    pub aggregator: PipelineAggregator,
    pub connector: Box<dyn Connector>,
    pub dispatcher: Option<CausalClient>,
}

/// Spawn the periodic dispatch task for one pipeline.
///
/// Each tick walks the timeframe network and sends every full window;
/// dispatches are independent per timeframe and a failure in one does not
/// affect the others. The HTTP call races the shutdown signal so it never
/// blocks termination.
pub fn spawn_dispatch_task(
    name: &'static str,
    client: CausalClient,
    aggregator: PipelineAggregator,
    network: TimeframeNetwork,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(client.settings().dispatch_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut latest: FxHashMap<String, ChainSignal> = FxHashMap::default();

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                () = dispatch_round(name, &client, &aggregator, &network, &mut latest) => {}
            }
        }
        debug!("{name}: dispatch task stopped");
    })
}

async fn dispatch_round(
    name: &str,
    client: &CausalClient,
    aggregator: &PipelineAggregator,
    network: &TimeframeNetwork,
    latest: &mut FxHashMap<String, ChainSignal>,
) {
    for tf in network.iter() {
        let signal = match aggregator {
            PipelineAggregator::Ohlc(agg) => {
                let window = {
                    let agg = agg.lock();
                    agg.buffer(&tf.label)
                };
                let Some(window) = window else { continue };
                client.send_candles(&window, tf).await
            }
            PipelineAggregator::Univariate(agg) => {
                let window = {
                    let agg = agg.lock();
                    agg.buffer(&tf.label)
                };
                let Some(window) = window else { continue };
                client.send_samples(&window, tf).await
            }
        };
        if let Some(signal) = signal {
            info!(
                "{name}: chain signal {} for {} window {}",
                signal.chain_detected, tf.label, signal.datetime
            );
            latest.insert(tf.label.clone(), signal);
        }
    }
}
