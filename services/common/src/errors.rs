//! Common error types for the chainflow services

use std::time::Duration;
use thiserror::Error;

/// Pipeline error kinds.
///
/// Only `Config` is fatal, and only at startup. Everything else is recovered
/// where it occurs: network failures feed the reconnect state machine,
/// invalid messages drop the single tick, remote-API failures drop the
/// single dispatch.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("transient network failure: {0}")]
    TransientNetwork(String),

    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("causal service returned status {status}")]
    RemoteApi { status: u16 },
}

impl FlowError {
    /// Shorthand for a configuration error
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error is retryable without operator intervention
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientNetwork(_) | Self::RateLimited { .. } | Self::RemoteApi { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_not_retryable() {
        assert!(!FlowError::config("missing CAUSAL_API_URL").is_retryable());
        assert!(FlowError::TransientNetwork("reset".into()).is_retryable());
        assert!(FlowError::RateLimited {
            retry_after: Some(Duration::from_secs(10))
        }
        .is_retryable());
    }
}
