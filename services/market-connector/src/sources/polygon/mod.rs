//! Polygon equities streaming connector
//!
//! Authenticated socket with `T.<SYMBOL>` trade channels, status-event
//! handling, heartbeats, reconnect backoff, and gap backfill over the
//! range-trade REST endpoint when a disconnect leaves a hole larger than
//! the configured threshold.

mod backfill;
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

/// Configuration for the polygon streaming connector
#[derive(Debug, Clone)]
pub struct PolygonConfig {
    /// WebSocket endpoint, e.g. `wss://socket.polygon.io/stocks`
    pub ws_url: String,
    /// REST base for gap backfill, e.g. `https://api.polygon.io`
    pub api_url: String,
    /// API key sent in the auth frame and backfill requests
    pub api_key: String,
    /// Symbols to stream, e.g. `AAPL`
    pub symbols: Vec<String>,
    /// Heartbeat interval; 3x staleness forces a reconnect
    pub ping_interval: Duration,
    /// Open timeout for each connection attempt
    pub connect_timeout: Duration,
    /// Base delay for exponential reconnect backoff
    pub reconnect_base: Duration,
    /// Reconnect attempt budget before giving up
    pub max_reconnects: u32,
    /// Replay missed trades after a gap
    pub backfill: bool,
    /// Minimum gap that triggers a backfill
    pub backfill_threshold: Duration,
}

impl Default for PolygonConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://socket.polygon.io/stocks".to_string(),
            api_url: "https://api.polygon.io".to_string(),
            api_key: String::new(),
            symbols: vec!["AAPL".to_string()],
            ping_interval: Duration::from_secs(30),
            connect_timeout: CONNECT_TIMEOUT,
            reconnect_base: Duration::from_secs(1),
            max_reconnects: 10,
            backfill: true,
            backfill_threshold: Duration::from_secs(60),
        }
    }
}

/// Dynamic subscription changes applied on the live connection
#[derive(Debug)]
pub(crate) enum ChannelCommand {
    Add(Vec<String>),
    Remove(Vec<String>),
}

/// Streaming connector for the polygon equities trade feed
pub struct PolygonConnector {
    config: PolygonConfig,
    aggregator: Arc<Mutex<OhlcAggregator>>,
    health: Arc<HealthMeter>,
    shutdown: watch::Sender<bool>,
    control: mpsc::UnboundedSender<ChannelCommand>,
    control_rx: Option<mpsc::UnboundedReceiver<ChannelCommand>>,
    task: Option<JoinHandle<()>>,
}

impl PolygonConnector {
    #[must_use]
    pub fn new(config: PolygonConfig, aggregator: Arc<Mutex<OhlcAggregator>>) -> Self {
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

    /// Subscribe additional symbols on the live connection
    pub fn add_symbols(&self, symbols: Vec<String>) {
        let _ = self.control.send(ChannelCommand::Add(symbols));
    }

    /// Unsubscribe symbols; safe no-op when the stream is not open
    pub fn remove_symbols(&self, symbols: Vec<String>) {
        let _ = self.control.send(ChannelCommand::Remove(symbols));
    }
}

#[async_trait]
impl Connector for PolygonConnector {
    fn name(&self) -> &'static str {
        "polygon"
    }

    async fn connect(&mut self) -> Result<()> {
        if self.task.is_some() {
            return Ok(());
        }
        if self.config.api_key.is_empty() {
            anyhow::bail!("polygon connector requires an api key");
        }
        let control_rx = self
            .control_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("polygon connector cannot be restarted"))?;
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
                warn!("polygon: ingest task did not stop within {SHUTDOWN_GRACE:?}");
            }
        }
        self.health.set_status(ConnectorStatus::Disconnected);
        Ok(())
    }
}
