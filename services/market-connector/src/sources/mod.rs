//! Source-specific connector variants

pub mod accuweather;
pub mod binance;
pub mod bloomberg;
pub mod polygon;

use chainflow_common::RateLimitInfo;
use chrono::DateTime;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;

/// Parse a `Retry-After` header given in seconds
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Parse `RateLimit-Remaining` / `RateLimit-Reset` headers; the reset value
/// is epoch seconds when present
pub(crate) fn rate_limit_info(headers: &HeaderMap) -> Option<RateLimitInfo> {
    let remaining = headers
        .get("RateLimit-Remaining")?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()?;
    let reset_at = headers
        .get("RateLimit-Reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<i64>().ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0));
    Some(RateLimitInfo {
        remaining,
        reset_at,
    })
}
