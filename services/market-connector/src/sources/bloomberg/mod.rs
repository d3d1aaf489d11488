//! Bloomberg subscription-session connector
//!
//! Opens a session, then the market-data service, then issues one
//! subscription per security with a monotonically increasing correlation
//! id. Inbound events are mapped back to their security string through the
//! correlation table before normalization. When the native vendor client is
//! absent a deterministic mock backend is substituted at initialization;
//! the two behave identically at the connector contract.

pub mod mock;
pub mod session;

use crate::normalizers::{BloombergNormalizer, Normalizer};
use crate::{Connector, SHUTDOWN_GRACE};
use anyhow::Result;
use async_trait::async_trait;
use chainflow_common::{ConnectorStatus, HealthMeter, HealthSnapshot};
use data_aggregator::OhlcAggregator;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use session::{SessionBackend, SessionEvent, MARKET_DATA_SERVICE};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Configuration for the subscription-session connector
#[derive(Debug, Clone)]
pub struct BloombergConfig {
    /// Session host, e.g. `127.0.0.1`
    pub host: String,
    /// Session port, e.g. `8194`
    pub port: u16,
    /// Securities to subscribe, e.g. `IBM US Equity`
    pub securities: Vec<String>,
    /// Cadence of the mock backend's synthetic ticks
    pub tick_interval: Duration,
}

impl Default for BloombergConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8194,
            securities: Vec::new(),
            tick_interval: Duration::from_secs(5),
        }
    }
}

/// Dynamic security changes applied on the live session
#[derive(Debug)]
pub(crate) enum SecurityCommand {
    Add(Vec<String>),
    Remove(Vec<String>),
}

/// Subscription-session connector with mock fallback
pub struct BloombergConnector {
    config: BloombergConfig,
    aggregator: Arc<Mutex<OhlcAggregator>>,
    health: Arc<HealthMeter>,
    shutdown: watch::Sender<bool>,
    control: mpsc::UnboundedSender<SecurityCommand>,
    control_rx: Option<mpsc::UnboundedReceiver<SecurityCommand>>,
    task: Option<JoinHandle<()>>,
}

impl BloombergConnector {
    #[must_use]
    pub fn new(config: BloombergConfig, aggregator: Arc<Mutex<OhlcAggregator>>) -> Self {
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

    /// Subscribe additional securities on the live session
    pub fn add_securities(&self, securities: Vec<String>) {
        let _ = self.control.send(SecurityCommand::Add(securities));
    }

    /// Unsubscribe securities; safe no-op when the session is not open
    pub fn remove_securities(&self, securities: Vec<String>) {
        let _ = self.control.send(SecurityCommand::Remove(securities));
    }
}

#[async_trait]
impl Connector for BloombergConnector {
    fn name(&self) -> &'static str {
        "bloomberg"
    }

    async fn connect(&mut self) -> Result<()> {
        if self.task.is_some() {
            return Ok(());
        }
        let control_rx = self
            .control_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("bloomberg connector cannot be restarted"))?;

        let mut backend = session::load_backend(self.config.tick_interval);
        backend
            .open_session(&self.config.host, self.config.port)
            .await?;
        backend.open_service(MARKET_DATA_SERVICE).await?;

        let mut correlation: FxHashMap<u64, String> = FxHashMap::default();
        let mut next_correlation_id: u64 = 0;
        for security in &self.config.securities {
            next_correlation_id += 1;
            backend.subscribe(security, next_correlation_id).await?;
            correlation.insert(next_correlation_id, security.clone());
        }
        info!(
            "bloomberg: session live with {} subscriptions",
            correlation.len()
        );
        self.health.set_status(ConnectorStatus::Connected);

        self.task = Some(tokio::spawn(run(
            backend,
            Arc::clone(&self.aggregator),
            Arc::clone(&self.health),
            self.shutdown.subscribe(),
            control_rx,
            correlation,
            next_correlation_id,
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
                warn!("bloomberg: session task did not stop within {SHUTDOWN_GRACE:?}");
            }
        }
        self.health.set_status(ConnectorStatus::Disconnected);
        Ok(())
    }
}

enum Step {
    Shutdown,
    Command(Option<SecurityCommand>),
    Event(Option<SessionEvent>),
}

async fn run(
    mut backend: Box<dyn SessionBackend>,
    aggregator: Arc<Mutex<OhlcAggregator>>,
    health: Arc<HealthMeter>,
    mut shutdown: watch::Receiver<bool>,
    mut control: mpsc::UnboundedReceiver<SecurityCommand>,
    mut correlation: FxHashMap<u64, String>,
    mut next_correlation_id: u64,
) {
    let mut control_open = true;
    loop {
        let step = tokio::select! {
            _ = shutdown.changed() => Step::Shutdown,
            cmd = control.recv(), if control_open => Step::Command(cmd),
            event = backend.next_event() => Step::Event(event),
        };

        match step {
            Step::Shutdown => break,
            Step::Command(None) => control_open = false,
            Step::Command(Some(SecurityCommand::Add(securities))) => {
                for security in securities {
                    if correlation.values().any(|known| known == &security) {
                        continue;
                    }
                    next_correlation_id += 1;
                    match backend.subscribe(&security, next_correlation_id).await {
                        Ok(()) => {
                            correlation.insert(next_correlation_id, security);
                        }
                        Err(e) => {
                            warn!("bloomberg: subscribe {security} failed: {e:#}");
                            health.record_error();
                        }
                    }
                }
            }
            Step::Command(Some(SecurityCommand::Remove(securities))) => {
                for security in securities {
                    let Some(id) = correlation
                        .iter()
                        .find(|(_, known)| **known == security)
                        .map(|(id, _)| *id)
                    else {
                        continue;
                    };
                    if let Err(e) = backend.unsubscribe(id).await {
                        warn!("bloomberg: unsubscribe {security} failed: {e:#}");
                    }
                    correlation.remove(&id);
                }
            }
            Step::Event(None) => {
                warn!("bloomberg: session stream ended");
                break;
            }
            Step::Event(Some(event)) => {
                handle_event(event, &correlation, &aggregator, &health);
            }
        }
    }

    if let Err(e) = backend.close().await {
        warn!("bloomberg: close failed: {e:#}");
    }
    health.set_status(ConnectorStatus::Disconnected);
}

/// Resolve the correlation id to its security, stamp it into the field
/// map, and hand the event to the normalizer
fn handle_event(
    event: SessionEvent,
    correlation: &FxHashMap<u64, String>,
    aggregator: &Arc<Mutex<OhlcAggregator>>,
    health: &Arc<HealthMeter>,
) {
    let Some(security) = correlation.get(&event.correlation_id) else {
        debug!(
            "bloomberg: event for unknown correlation id {}",
            event.correlation_id
        );
        return;
    };
    let mut fields = event.fields;
    if let Some(map) = fields.as_object_mut() {
        map.insert("security".to_string(), Value::String(security.clone()));
    }
    if let Some(tick) = BloombergNormalizer.normalize(&fields) {
        health.record_message(tick.ts);
        aggregator.lock().add_tick(&tick);
    } else {
        debug!("bloomberg: skipped event without usable price");
    }
}
