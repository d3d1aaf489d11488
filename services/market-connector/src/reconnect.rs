//! Reconnection backoff shared by the streaming connectors

use std::time::Duration;

/// Delay cap for exponential backoff
pub const BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Exponential reconnect backoff: `min(base * 2^attempt, cap)`.
///
/// `next_delay` yields the delay for the upcoming attempt and advances the
/// counter; it returns `None` once the configured attempt budget is spent.
/// A successful connect resets the counter.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl BackoffPolicy {
    #[must_use]
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max_attempts,
            attempt: 0,
        }
    }

    /// Delay before the next attempt, or `None` when attempts are exhausted
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let shift = self.attempt.min(31);
        let delay = self
            .base
            .checked_mul(1u32 << shift)
            .map_or(BACKOFF_CAP, |d| d.min(BACKOFF_CAP));
        self.attempt += 1;
        Some(delay)
    }

    /// Reset the attempt counter after a successful connect
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }
}
