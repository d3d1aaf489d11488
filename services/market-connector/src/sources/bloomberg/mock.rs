//! Deterministic mock session
//!
//! Emits one synthetic tick per subscription at a fixed cadence. Prices
//! follow a bounded zigzag derived from the per-subscription event counter,
//! so runs are repeatable and timestamps strictly increase per security.

use super::session::{SessionBackend, SessionEvent};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Interval;
use tracing::{debug, info};

const BASE_PRICE: f64 = 100.0;
const PRICE_STEP: f64 = 0.25;
const PRICE_CYCLE: u64 = 40;

#[derive(Debug)]
struct MockSubscription {
    correlation_id: u64,
    emitted: u64,
}

/// In-process stand-in for the vendor session client
pub struct MockSession {
    tick_interval: Duration,
    ticker: Option<Interval>,
    subscriptions: Vec<MockSubscription>,
    pending: VecDeque<SessionEvent>,
    session_open: bool,
    service_open: bool,
}

impl MockSession {
    #[must_use]
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            tick_interval,
            ticker: None,
            subscriptions: Vec::new(),
            pending: VecDeque::new(),
            session_open: false,
            service_open: false,
        }
    }

    fn synthetic_fields(emitted: u64) -> Value {
        let phase = (emitted * 7) % PRICE_CYCLE;
        let price = BASE_PRICE + phase as f64 * PRICE_STEP;
        let volume = 100 + (emitted % 10) * 10;
        json!({
            "timestamp": Utc::now().timestamp_millis(),
            "LAST_TRADE": price,
            "BID": price - PRICE_STEP,
            "ASK": price + PRICE_STEP,
            "VOLUME": volume,
        })
    }
}

#[async_trait]
impl SessionBackend for MockSession {
    async fn open_session(&mut self, host: &str, port: u16) -> anyhow::Result<()> {
        info!("bloomberg(mock): session opened against {host}:{port}");
        self.session_open = true;
        Ok(())
    }

    async fn open_service(&mut self, service: &str) -> anyhow::Result<()> {
        if !self.session_open {
            anyhow::bail!("service '{service}' opened before the session");
        }
        info!("bloomberg(mock): service {service} opened");
        self.service_open = true;
        Ok(())
    }

    async fn subscribe(&mut self, security: &str, correlation_id: u64) -> anyhow::Result<()> {
        if !self.service_open {
            anyhow::bail!("subscribe before the market-data service is open");
        }
        debug!("bloomberg(mock): subscribe {security} (correlation {correlation_id})");
        self.subscriptions.push(MockSubscription {
            correlation_id,
            emitted: 0,
        });
        Ok(())
    }

    async fn unsubscribe(&mut self, correlation_id: u64) -> anyhow::Result<()> {
        self.subscriptions
            .retain(|sub| sub.correlation_id != correlation_id);
        self.pending
            .retain(|event| event.correlation_id != correlation_id);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<SessionEvent> {
        if !self.service_open {
            return None;
        }
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let ticker = self
                .ticker
                .get_or_insert_with(|| tokio::time::interval(self.tick_interval));
            ticker.tick().await;

            let Self {
                subscriptions,
                pending,
                ..
            } = self;
            for sub in subscriptions.iter_mut() {
                sub.emitted += 1;
                pending.push_back(SessionEvent {
                    correlation_id: sub.correlation_id,
                    fields: Self::synthetic_fields(sub.emitted),
                });
            }
        }
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.service_open = false;
        self.session_open = false;
        self.subscriptions.clear();
        self.pending.clear();
        Ok(())
    }
}
