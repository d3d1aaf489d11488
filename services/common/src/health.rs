//! Connector health reporting
//!
//! Counters are written by connector I/O tasks and read by the
//! health-reporting task. Snapshots are assembled on demand from the live
//! counters and never cached.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::time::Instant;

/// Connection state reported in a health snapshot
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ConnectorStatus {
    Connected,
    Disconnected,
    Error,
}

impl ConnectorStatus {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Connected => 0,
            Self::Disconnected => 1,
            Self::Error => 2,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Connected,
            1 => Self::Disconnected,
            _ => Self::Error,
        }
    }
}

/// Vendor rate-limit budget, parsed from response headers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    /// Requests remaining in the current window
    pub remaining: u64,
    /// When the budget resets, when the vendor reports it
    pub reset_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of one connector's health
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub status: ConnectorStatus,
    /// Time of the last message that produced a tick
    pub last_message_at: Option<DateTime<Utc>>,
    /// Errors observed since the connector was created
    pub error_count: u64,
    /// Milliseconds since the connector was created
    pub uptime_ms: u64,
    /// Rate-limit budget for polling sources
    pub rate_limit: Option<RateLimitInfo>,
}

/// Shared health counters for one connector
#[derive(Debug)]
pub struct HealthMeter {
    started_at: Instant,
    status: AtomicU8,
    /// Epoch nanos of the last message; `i64::MIN` means none yet
    last_message_nanos: AtomicI64,
    error_count: AtomicU64,
    rate_limit: Mutex<Option<RateLimitInfo>>,
}

impl HealthMeter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            status: AtomicU8::new(ConnectorStatus::Disconnected.as_u8()),
            last_message_nanos: AtomicI64::new(i64::MIN),
            error_count: AtomicU64::new(0),
            rate_limit: Mutex::new(None),
        }
    }

    pub fn set_status(&self, status: ConnectorStatus) {
        self.status.store(status.as_u8(), Ordering::Relaxed);
    }

    #[must_use]
    pub fn status(&self) -> ConnectorStatus {
        ConnectorStatus::from_u8(self.status.load(Ordering::Relaxed))
    }

    /// Record a message that produced a tick
    pub fn record_message(&self, ts: DateTime<Utc>) {
        if let Some(nanos) = ts.timestamp_nanos_opt() {
            self.last_message_nanos.store(nanos, Ordering::Relaxed);
        }
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_rate_limit(&self, info: RateLimitInfo) {
        *self.rate_limit.lock() = Some(info);
    }

    /// Time of the last tick-bearing message, if any was seen
    #[must_use]
    pub fn last_message_at(&self) -> Option<DateTime<Utc>> {
        let nanos = self.last_message_nanos.load(Ordering::Relaxed);
        if nanos == i64::MIN {
            None
        } else {
            Some(DateTime::from_timestamp_nanos(nanos))
        }
    }

    /// Assemble a snapshot from the live counters
    #[must_use]
    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            status: self.status(),
            last_message_at: self.last_message_at(),
            error_count: self.error_count.load(Ordering::Relaxed),
            uptime_ms: u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            rate_limit: self.rate_limit.lock().clone(),
        }
    }
}

impl Default for HealthMeter {
    fn default() -> Self {
        Self::new()
    }
}
