//! Historical kline bootstrap
//!
//! Seeds each timeframe's rolling window from the vendor kline endpoint
//! before streaming starts, paging backwards with `endTime` until the
//! window capacity is covered. A failure for one timeframe is logged and
//! the others proceed.

use super::BinanceConfig;
use crate::normalizers::num_field;
use chainflow_common::{Candle, Timeframe};
use data_aggregator::OhlcAggregator;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

const PAGE_LIMIT: usize = 1000;

pub(super) async fn seed_buffers(
    config: &BinanceConfig,
    aggregator: &Arc<Mutex<OhlcAggregator>>,
) -> anyhow::Result<()> {
    let http = reqwest::Client::new();
    let (symbol, network) = {
        let agg = aggregator.lock();
        (agg.symbol().to_string(), agg.network().clone())
    };

    for tf in network.iter() {
        match fetch_klines(&http, &config.api_url, &symbol, tf).await {
            Ok(candles) if candles.is_empty() => {
                debug!("binance: no historical candles for {}", tf.label);
            }
            Ok(candles) => {
                let seeded = aggregator.lock().seed_candles(&tf.label, candles);
                info!("binance: seeded {seeded} historical {} candles", tf.label);
            }
            Err(e) => {
                warn!("binance: bootstrap for {} failed: {e:#}", tf.label);
            }
        }
    }
    Ok(())
}

/// Page backwards through the kline endpoint until `capacity` candles are
/// collected or history runs out; returns them oldest first
async fn fetch_klines(
    http: &reqwest::Client,
    api_url: &str,
    symbol: &str,
    tf: &Timeframe,
) -> anyhow::Result<Vec<Candle>> {
    let url = format!("{}/api/v3/klines", api_url.trim_end_matches('/'));
    let mut collected: Vec<Candle> = Vec::new();
    let mut end_time: Option<i64> = None;

    while collected.len() < tf.capacity {
        let mut request = http.get(&url).query(&[
            ("symbol", symbol.to_uppercase()),
            ("interval", tf.label.clone()),
            ("limit", PAGE_LIMIT.to_string()),
        ]);
        if let Some(end) = end_time {
            request = request.query(&[("endTime", end.to_string())]);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            anyhow::bail!("kline request returned {}", response.status());
        }
        let rows: Vec<Value> = response.json().await?;
        if rows.is_empty() {
            break;
        }

        let Some(first_open) = rows.first().and_then(|row| row.get(0)).and_then(Value::as_i64)
        else {
            break;
        };
        let page_len = rows.len();

        let mut page: Vec<Candle> = rows.iter().filter_map(parse_kline).collect();
        page.extend(collected);
        collected = page;

        // step past the oldest row so the next page ends before it
        end_time = Some(first_open - 1);
        if page_len < PAGE_LIMIT {
            break;
        }
    }

    collected.sort_by_key(|candle| candle.datetime);
    if collected.len() > tf.capacity {
        collected.drain(..collected.len() - tf.capacity);
    }
    Ok(collected)
}

/// Kline rows are positional arrays: open time, then OHLCV as strings
fn parse_kline(row: &Value) -> Option<Candle> {
    let datetime = chrono::DateTime::from_timestamp_millis(row.get(0)?.as_i64()?)?;
    Some(Candle {
        datetime,
        open: num_field(row.get(1)?)?,
        high: num_field(row.get(2)?)?,
        low: num_field(row.get(3)?)?,
        close: num_field(row.get(4)?)?,
        volume: num_field(row.get(5)?)?,
    })
}
