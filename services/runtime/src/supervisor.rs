//! Pipeline assembly, health reporting, and graceful shutdown

use crate::pipeline::{spawn_dispatch_task, Pipeline, PipelineAggregator};
use anyhow::Result;
use causal_client::CausalClient;
use chainflow_common::config::{
    AccuweatherSettings, BinanceSettings, BloombergSettings, CausalSettings, PolygonSettings,
};
use chainflow_common::{RuntimeConfig, TimeframeNetwork};
use data_aggregator::{OhlcAggregator, UnivariateAggregator};
use market_connector::{
    AccuweatherConfig, AccuweatherConnector, BinanceConfig, BinanceConnector, BloombergConfig,
    BloombergConnector, PolygonConfig, PolygonConnector,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{error, info, warn};

/// Cadence of the per-connector health report
const HEALTH_INTERVAL: Duration = Duration::from_secs(30);

/// Grace period for dispatch tasks to drain at shutdown
const DISPATCH_DRAIN: Duration = Duration::from_secs(2);

/// Owns every pipeline and drives the service lifecycle
pub struct Supervisor {
    pipelines: Vec<Pipeline>,
    shutdown: watch::Sender<bool>,
}

impl Supervisor {
    /// Assemble pipelines for the selected connector kind.
    ///
    /// A selected source whose credentials are missing is skipped with a
    /// warning; ending up with no pipeline at all is a startup error.
    pub fn from_config(config: RuntimeConfig) -> Result<Self> {
        let kind = config.connector_kind;
        let causal = config.causal.clone();
        let mut pipelines = Vec::new();

        if kind.wants_binance() {
            match &config.binance {
                Some(settings) => pipelines.push(binance_pipeline(settings, &causal)),
                None => warn!("binance selected but not configured, skipping"),
            }
        }
        if kind.wants_polygon() {
            match &config.polygon {
                Some(settings) => pipelines.push(polygon_pipeline(settings, &causal)),
                None => warn!("polygon selected but POLYGON_API_KEY is missing, skipping"),
            }
        }
        if kind.wants_accuweather() {
            match &config.accuweather {
                Some(settings) => pipelines.push(accuweather_pipeline(settings, &causal)),
                None => warn!(
                    "accuweather selected but ACCUWEATHER_API_KEY/ACCUWEATHER_LOCATION_KEY are missing, skipping"
                ),
            }
        }
        if kind.wants_bloomberg() {
            match &config.bloomberg {
                Some(settings) => pipelines.push(bloomberg_pipeline(settings, &causal)),
                None => warn!("bloomberg selected but BLOOMBERG_SECURITIES is missing, skipping"),
            }
        }

        if pipelines.is_empty() {
            anyhow::bail!("no connector pipeline could be assembled for {kind:?}");
        }
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            pipelines,
            shutdown,
        })
    }

    #[must_use]
    pub fn pipeline_names(&self) -> Vec<&'static str> {
        self.pipelines.iter().map(|p| p.name).collect()
    }

    /// Connect every pipeline, run dispatch and health routines, and block
    /// until an interrupt or terminate signal arrives
    pub async fn run(mut self) -> Result<()> {
        for pipeline in &mut self.pipelines {
            info!("starting {} pipeline", pipeline.name);
            if let Err(e) = pipeline.connector.connect().await {
                error!("{}: connect failed: {e:#}", pipeline.name);
            }
        }

        let mut dispatch_tasks = Vec::new();
        for pipeline in &self.pipelines {
            if let Some(client) = pipeline.dispatcher.clone() {
                dispatch_tasks.push(spawn_dispatch_task(
                    pipeline.name,
                    client,
                    pipeline.aggregator.clone(),
                    pipeline.network.clone(),
                    self.shutdown.subscribe(),
                ));
            }
        }

        let mut health_ticker = tokio::time::interval(HEALTH_INTERVAL);
        health_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut signal = Box::pin(shutdown_signal());
        loop {
            tokio::select! {
                () = &mut signal => break,
                _ = health_ticker.tick() => {
                    for pipeline in &self.pipelines {
                        let snapshot = pipeline.connector.health();
                        info!(
                            "{}: {:?}, {} errors, last message {:?}, up {}ms",
                            pipeline.name,
                            snapshot.status,
                            snapshot.error_count,
                            snapshot.last_message_at,
                            snapshot.uptime_ms
                        );
                    }
                }
            }
        }

        self.shutdown_all(dispatch_tasks).await;
        Ok(())
    }

    /// Finalize every aggregator, then stop connectors best-effort
    async fn shutdown_all(&mut self, dispatch_tasks: Vec<JoinHandle<()>>) {
        info!("shutting down");
        let _ = self.shutdown.send(true);

        for pipeline in &self.pipelines {
            pipeline.aggregator.force_finalize_all();
        }
        for pipeline in &mut self.pipelines {
            if let Err(e) = pipeline.connector.shutdown().await {
                error!("{}: shutdown failed: {e:#}", pipeline.name);
            }
        }
        for task in dispatch_tasks {
            if timeout(DISPATCH_DRAIN, task).await.is_err() {
                warn!("a dispatch task did not stop within {DISPATCH_DRAIN:?}");
            }
        }
        info!("shutdown complete");
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C, initiating graceful shutdown");
        }
        () = terminate => {
            info!("received SIGTERM, initiating graceful shutdown");
        }
    }
}

fn binance_pipeline(settings: &BinanceSettings, causal: &CausalSettings) -> Pipeline {
    let network = TimeframeNetwork::intraday();
    let symbol = settings
        .symbols
        .first()
        .cloned()
        .unwrap_or_else(|| "BTCUSDT".to_string());
    let aggregator = Arc::new(Mutex::new(OhlcAggregator::new(symbol, network.clone())));
    let config = BinanceConfig {
        ws_url: settings.ws_url.clone(),
        api_url: settings.api_url.clone(),
        symbols: settings.symbols.clone(),
        bootstrap: settings.bootstrap,
        ..BinanceConfig::default()
    };
    Pipeline {
        name: "binance",
        network,
        aggregator: PipelineAggregator::Ohlc(Arc::clone(&aggregator)),
        connector: Box::new(BinanceConnector::new(config, aggregator)),
        dispatcher: Some(CausalClient::new(causal.clone())),
    }
}

fn polygon_pipeline(settings: &PolygonSettings, causal: &CausalSettings) -> Pipeline {
    let network = TimeframeNetwork::intraday();
    let symbol = settings
        .symbols
        .first()
        .cloned()
        .unwrap_or_else(|| "AAPL".to_string());
    let aggregator = Arc::new(Mutex::new(OhlcAggregator::new(symbol, network.clone())));
    let config = PolygonConfig {
        ws_url: settings.ws_url.clone(),
        api_url: settings.api_url.clone(),
        api_key: settings.api_key.clone(),
        symbols: settings.symbols.clone(),
        backfill: settings.backfill,
        ..PolygonConfig::default()
    };
    Pipeline {
        name: "polygon",
        network,
        aggregator: PipelineAggregator::Ohlc(Arc::clone(&aggregator)),
        connector: Box::new(PolygonConnector::new(config, aggregator)),
        dispatcher: Some(CausalClient::new(causal.clone())),
    }
}

fn accuweather_pipeline(settings: &AccuweatherSettings, causal: &CausalSettings) -> Pipeline {
    let network = TimeframeNetwork::weather();
    let aggregator = Arc::new(Mutex::new(UnivariateAggregator::new(
        settings.location_key.clone(),
        network.clone(),
    )));
    let config = AccuweatherConfig {
        api_url: settings.api_url.clone(),
        api_key: settings.api_key.clone(),
        location_key: settings.location_key.clone(),
        poll_interval: settings.poll_interval,
        ..AccuweatherConfig::default()
    };
    Pipeline {
        name: "accuweather",
        network,
        aggregator: PipelineAggregator::Univariate(Arc::clone(&aggregator)),
        connector: Box::new(AccuweatherConnector::new(config, aggregator)),
        dispatcher: Some(CausalClient::new(causal.clone())),
    }
}

fn bloomberg_pipeline(settings: &BloombergSettings, causal: &CausalSettings) -> Pipeline {
    let network = TimeframeNetwork::intraday();
    let symbol = settings
        .securities
        .first()
        .cloned()
        .unwrap_or_default();
    let aggregator = Arc::new(Mutex::new(OhlcAggregator::new(symbol, network.clone())));
    let config = BloombergConfig {
        host: settings.host.clone(),
        port: settings.port,
        securities: settings.securities.clone(),
        ..BloombergConfig::default()
    };
    Pipeline {
        name: "bloomberg",
        network,
        aggregator: PipelineAggregator::Ohlc(Arc::clone(&aggregator)),
        connector: Box::new(BloombergConnector::new(config, aggregator)),
        dispatcher: Some(CausalClient::new(causal.clone())),
    }
}
