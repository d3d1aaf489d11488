//! Market-data session backend contract

use super::mock::MockSession;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

/// Service name opened for streaming market data
pub const MARKET_DATA_SERVICE: &str = "//blp/mktdata";

/// One market-data event delivered by the session
#[derive(Clone, Debug)]
pub struct SessionEvent {
    /// Correlation id the originating subscription was issued with
    pub correlation_id: u64,
    /// Raw field map: `LAST_TRADE`, `LAST_PRICE`, `BID`, `ASK`, `VOLUME`,
    /// and a `timestamp` in epoch millis
    pub fields: Value,
}

/// Vendor session lifecycle: open a session, open the market-data service,
/// issue correlated subscriptions, consume events.
///
/// The native client and the deterministic mock implement the same
/// contract, so the connector cannot tell them apart.
#[async_trait]
pub trait SessionBackend: Send {
    async fn open_session(&mut self, host: &str, port: u16) -> anyhow::Result<()>;

    async fn open_service(&mut self, service: &str) -> anyhow::Result<()>;

    async fn subscribe(&mut self, security: &str, correlation_id: u64) -> anyhow::Result<()>;

    async fn unsubscribe(&mut self, correlation_id: u64) -> anyhow::Result<()>;

    /// Next market-data event, or `None` when the session ended.
    /// Must be cancel-safe; the connector races it against control and
    /// shutdown channels.
    async fn next_event(&mut self) -> Option<SessionEvent>;

    async fn close(&mut self) -> anyhow::Result<()>;
}

/// Resolve the session backend at initialization.
///
/// The native vendor client is probed here; this build ships without it,
/// so the deterministic mock stands in behind the same contract.
pub fn load_backend(tick_interval: Duration) -> Box<dyn SessionBackend> {
    warn!("bloomberg: native session library unavailable, using deterministic mock feed");
    Box::new(MockSession::new(tick_interval))
}
