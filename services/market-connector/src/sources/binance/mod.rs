//! Binance streaming connector
//!
//! Multiplexed trade streams over a persistent socket with ping/pong
//! heartbeats, exponential reconnect backoff, dynamic SUBSCRIBE/UNSUBSCRIBE
//! control frames, and an optional historical kline bootstrap that seeds the
//! rolling windows before streaming starts.

mod bootstrap;
mod websocket;

use crate::{Connector, CONNECT_TIMEOUT, SHUTDOWN_GRACE};
use anyhow::Result;
use async_trait::async_trait;
use chainflow_common::{ConnectorStatus, HealthMeter, HealthSnapshot};
use data_aggregator::OhlcAggregator;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::warn;

/// Configuration for the binance streaming connector
#[derive(Debug, Clone)]
pub struct BinanceConfig {
    /// WebSocket base, e.g. `wss://stream.binance.us:9443`
    pub ws_url: String,
    /// REST base for the kline bootstrap, e.g. `https://api.binance.us`
    pub api_url: String,
    /// Symbols to stream, e.g. `BTCUSDT`
    pub symbols: Vec<String>,
    /// Stream kinds per symbol, e.g. `trade`, `aggTrade`
    pub streams: Vec<String>,
    /// Heartbeat interval; 3x staleness forces a reconnect
    pub ping_interval: Duration,
    /// Open timeout for each connection attempt
    pub connect_timeout: Duration,
    /// Base delay for exponential reconnect backoff
    pub reconnect_base: Duration,
    /// Reconnect attempt budget before giving up
    pub max_reconnects: u32,
    /// Seed buffers from the historical kline endpoint before streaming
    pub bootstrap: bool,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://stream.binance.us:9443".to_string(),
            api_url: "https://api.binance.us".to_string(),
            symbols: vec!["BTCUSDT".to_string()],
            streams: vec!["trade".to_string()],
            ping_interval: Duration::from_secs(30),
            connect_timeout: CONNECT_TIMEOUT,
            reconnect_base: Duration::from_secs(1),
            max_reconnects: 10,
            bootstrap: false,
        }
    }
}

/// Dynamic subscription changes applied on the live connection
#[derive(Debug)]
pub(crate) enum SubscriptionCommand {
    Add(Vec<String>),
    Remove(Vec<String>),
}

/// Streaming connector for the binance trade feed
pub struct BinanceConnector {
    config: BinanceConfig,
    aggregator: Arc<Mutex<OhlcAggregator>>,
    health: Arc<HealthMeter>,
    shutdown: watch::Sender<bool>,
    control: mpsc::UnboundedSender<SubscriptionCommand>,
    control_rx: Option<mpsc::UnboundedReceiver<SubscriptionCommand>>,
    task: Option<JoinHandle<()>>,
}

impl BinanceConnector {
    #[must_use]
    pub fn new(config: BinanceConfig, aggregator: Arc<Mutex<OhlcAggregator>>) -> Self {
        let (shutdown, _) = watch::channel(false);
        let (control, control_rx) = mpsc::unbounded_channel();
        Self {
            config,
            aggregator,
            health: Arc::new(HealthMeter::new()),
            shutdown,
            control,
            control_rx: Some(control_rx),
            task: None,
        }
    }

    /// Subscribe additional symbols on the live connection; queued until
    /// connect when the stream is not open yet
    pub fn add_symbols(&self, symbols: Vec<String>) {
        let _ = self.control.send(SubscriptionCommand::Add(symbols));
    }

    /// Unsubscribe symbols from the live connection; safe no-op when the
    /// stream is not open
    pub fn remove_symbols(&self, symbols: Vec<String>) {
        let _ = self.control.send(SubscriptionCommand::Remove(symbols));
    }
}

#[async_trait]
impl Connector for BinanceConnector {
    fn name(&self) -> &'static str {
        "binance"
    }

    async fn connect(&mut self) -> Result<()> {
        if self.task.is_some() {
            return Ok(());
        }
        if self.config.bootstrap {
            if let Err(e) = bootstrap::seed_buffers(&self.config, &self.aggregator).await {
                warn!("binance: historical bootstrap failed: {e:#}");
            }
        }
        let control_rx = self
            .control_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("binance connector cannot be restarted"))?;
        self.task = Some(tokio::spawn(websocket::run(
            self.config.clone(),
            Arc::clone(&self.aggregator),
            Arc::clone(&self.health),
            self.shutdown.subscribe(),
            control_rx,
        )));
        Ok(())
    }

    fn health(&self) -> HealthSnapshot {
        self.health.snapshot()
    }

    async fn shutdown(&mut self) -> Result<()> {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            if timeout(SHUTDOWN_GRACE, task).await.is_err() {
                warn!("binance: ingest task did not stop within {SHUTDOWN_GRACE:?}");
            }
        }
        self.health.set_status(ConnectorStatus::Disconnected);
        Ok(())
    }
}
