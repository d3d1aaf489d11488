//! AccuWeather polling connector
//!
//! Interval poller over the current-conditions endpoint. Each polling tick
//! retries a bounded number of times, a 429 reschedules the next poll per
//! `Retry-After`, and rate-limit headers surface in the health snapshot.
//! The next tick is always scheduled at the cadence, never as catch-up.

mod poller;

use crate::{Connector, SHUTDOWN_GRACE};
use anyhow::Result;
use async_trait::async_trait;
use chainflow_common::{ConnectorStatus, HealthMeter, HealthSnapshot};
use data_aggregator::UnivariateAggregator;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::warn;

/// Configuration for the polling weather connector
#[derive(Debug, Clone)]
pub struct AccuweatherConfig {
    /// REST base, e.g. `http://dataservice.accuweather.com`
    pub api_url: String,
    pub api_key: String,
    /// Location key polled for current conditions
    pub location_key: String,
    /// Polling cadence
    pub poll_interval: Duration,
    /// Attempts per polling tick
    pub max_retries: u32,
    /// Delay between attempts within one tick
    pub retry_delay: Duration,
}

impl Default for AccuweatherConfig {
    fn default() -> Self {
        Self {
            api_url: "http://dataservice.accuweather.com".to_string(),
            api_key: String::new(),
            location_key: String::new(),
            poll_interval: Duration::from_secs(300),
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// Polling connector for the weather observation feed
pub struct AccuweatherConnector {
    config: AccuweatherConfig,
    aggregator: Arc<Mutex<UnivariateAggregator>>,
    health: Arc<HealthMeter>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl AccuweatherConnector {
    #[must_use]
    pub fn new(config: AccuweatherConfig, aggregator: Arc<Mutex<UnivariateAggregator>>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            aggregator,
            health: Arc::new(HealthMeter::new()),
            shutdown,
            task: None,
        }
    }
}

#[async_trait]
impl Connector for AccuweatherConnector {
    fn name(&self) -> &'static str {
        "accuweather"
    }

    async fn connect(&mut self) -> Result<()> {
        if self.task.is_some() {
            return Ok(());
        }
        if self.config.api_key.is_empty() || self.config.location_key.is_empty() {
            anyhow::bail!("accuweather connector requires an api key and a location key");
        }
        self.task = Some(tokio::spawn(poller::run(
            self.config.clone(),
            Arc::clone(&self.aggregator),
            Arc::clone(&self.health),
            self.shutdown.subscribe(),
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
                warn!("accuweather: polling task did not stop within {SHUTDOWN_GRACE:?}");
            }
        }
        self.health.set_status(ConnectorStatus::Disconnected);
        Ok(())
    }
}
