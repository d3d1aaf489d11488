//! Gap backfill over the range-trade REST endpoint
//!
//! Pages through `timestamp.gte`/`timestamp.lte` filtered trades per symbol,
//! advancing the lower bound past the last observed timestamp, then replays
//! everything into the aggregator in ascending timestamp order.

use super::PolygonConfig;
use crate::normalizers::PolygonNormalizer;
use crate::sources::retry_after;
use chainflow_common::Tick;
use chrono::{DateTime, Utc};
use data_aggregator::OhlcAggregator;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const PAGE_LIMIT: usize = 50_000;
const MAX_RETRIES: u32 = 3;
const RETRY_BASE: Duration = Duration::from_secs(1);
const RATE_LIMIT_FALLBACK: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct RangeTradeResponse {
    results: Option<Vec<Value>>,
}

pub(super) async fn replay_gap(
    http: &reqwest::Client,
    config: &PolygonConfig,
    symbols: &[String],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    aggregator: &Arc<Mutex<OhlcAggregator>>,
) -> anyhow::Result<usize> {
    let mut ticks: Vec<Tick> = Vec::new();
    for symbol in symbols {
        fetch_symbol_trades(http, config, symbol, from, to, &mut ticks).await?;
    }
    ticks.sort_by_key(|tick| tick.ts);

    let count = ticks.len();
    let mut agg = aggregator.lock();
    for tick in &ticks {
        agg.add_tick(tick);
    }
    Ok(count)
}

async fn fetch_symbol_trades(
    http: &reqwest::Client,
    config: &PolygonConfig,
    symbol: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    out: &mut Vec<Tick>,
) -> anyhow::Result<()> {
    let upper = to.timestamp_nanos_opt().unwrap_or(i64::MAX);
    let mut lower = from.timestamp_nanos_opt().unwrap_or(0);

    loop {
        let rows = fetch_page(http, config, symbol, lower, upper).await?;
        let page_len = rows.len();
        let mut last_seen = lower;
        for row in &rows {
            if let Some(tick) = PolygonNormalizer.normalize_range_trade(symbol, row) {
                if let Some(nanos) = tick.ts.timestamp_nanos_opt() {
                    last_seen = last_seen.max(nanos);
                }
                out.push(tick);
            }
        }
        debug!("polygon: backfill page for {symbol}: {page_len} trades");
        if page_len < PAGE_LIMIT || last_seen >= upper {
            break;
        }
        // advance past the newest row already seen, never refetching it
        lower = last_seen + 1;
    }
    Ok(())
}

async fn fetch_page(
    http: &reqwest::Client,
    config: &PolygonConfig,
    symbol: &str,
    lower: i64,
    upper: i64,
) -> anyhow::Result<Vec<Value>> {
    let url = format!(
        "{}/v3/trades/{}",
        config.api_url.trim_end_matches('/'),
        symbol.to_uppercase()
    );
    let mut attempt: u32 = 0;

    loop {
        let result = http
            .get(&url)
            .query(&[
                ("timestamp.gte", lower.to_string()),
                ("timestamp.lte", upper.to_string()),
                ("limit", PAGE_LIMIT.to_string()),
                ("apiKey", config.api_key.clone()),
            ])
            .send()
            .await;

        match result {
            Ok(response) if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                let wait = retry_after(response.headers()).unwrap_or(RATE_LIMIT_FALLBACK);
                warn!("polygon: backfill rate limited, waiting {wait:?}");
                tokio::time::sleep(wait).await;
            }
            Ok(response) if response.status().is_success() => {
                let body: RangeTradeResponse = response.json().await?;
                return Ok(body.results.unwrap_or_default());
            }
            Ok(response) => {
                attempt += 1;
                if attempt >= MAX_RETRIES {
                    anyhow::bail!("range-trade request returned {}", response.status());
                }
                tokio::time::sleep(RETRY_BASE * 2u32.pow(attempt - 1)).await;
            }
            Err(e) => {
                attempt += 1;
                if attempt >= MAX_RETRIES {
                    return Err(e.into());
                }
                tokio::time::sleep(RETRY_BASE * 2u32.pow(attempt - 1)).await;
            }
        }
    }
}
