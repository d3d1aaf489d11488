//! Market Connector Service
//!
//! Manages connections to the upstream data sources, normalizes vendor
//! messages into ticks, and feeds them to the aggregation pipeline. Each
//! source variant implements the same [`Connector`] lifecycle over its own
//! internal state machine: streaming sockets for binance and polygon, an
//! interval poller for accuweather, and a subscription session (with mock
//! fallback) for bloomberg.

pub mod normalizers;
pub mod reconnect;
pub mod sources;

use anyhow::Result;
use async_trait::async_trait;
use chainflow_common::HealthSnapshot;
use std::time::Duration;
use tokio::sync::watch;

/// Grace period for ingest tasks to wind down during shutdown
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Default open timeout for streaming connections
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub use sources::accuweather::{AccuweatherConfig, AccuweatherConnector};
pub use sources::binance::{BinanceConfig, BinanceConnector};
pub use sources::bloomberg::{BloombergConfig, BloombergConnector};
pub use sources::polygon::{PolygonConfig, PolygonConnector};

/// Uniform lifecycle over the source-specific connector variants.
///
/// Construction takes the variant's config and its aggregator handle;
/// `connect` spawns the ingest tasks and returns, `shutdown` stops timers
/// and sockets before returning and is safe to call more than once.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Source name, e.g. `binance`
    fn name(&self) -> &'static str;

    /// Open the upstream connection and start ingesting
    async fn connect(&mut self) -> Result<()>;

    /// Assemble a point-in-time health snapshot
    fn health(&self) -> HealthSnapshot;

    /// Stop all tasks and close the connection; idempotent
    async fn shutdown(&mut self) -> Result<()>;
}

/// Sleep that aborts early when the shutdown flag flips.
///
/// Returns `true` when shutdown was requested, `false` when the full delay
/// elapsed. Every connector and dispatcher sleep goes through this so
/// shutdown completes within a bounded time.
pub async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        () = tokio::time::sleep(delay) => false,
        _ = shutdown.changed() => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sleep_or_shutdown_completes_when_undisturbed() {
        let (_tx, mut rx) = watch::channel(false);
        let interrupted = sleep_or_shutdown(Duration::from_millis(5), &mut rx).await;
        assert!(!interrupted);
    }

    #[tokio::test]
    async fn sleep_or_shutdown_aborts_on_signal() {
        let (tx, mut rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let _ = tx.send(true);
        });

        let interrupted = sleep_or_shutdown(Duration::from_secs(60), &mut rx).await;
        assert!(interrupted);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn sleep_or_shutdown_short_circuits_when_already_signalled() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();

        let interrupted = sleep_or_shutdown(Duration::from_secs(60), &mut rx).await;
        assert!(interrupted);
    }
}
