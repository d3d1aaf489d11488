//! Causal API dispatch client
//!
//! Serializes a full rolling window into a fixed-row CSV payload, posts it
//! to the remote causal-intelligence service, and parses the chain-detection
//! response. A dispatch whose window is not yet full, or whose request
//! fails, returns `None`; the next scheduled tick is the retry.

pub mod payload;

use chainflow_common::config::CausalSettings;
use chainflow_common::{Candle, ChainSignal, Timeframe, UnivariateSample};
use chrono::{DateTime, Utc};
use data_aggregator::SharedWindow;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::{debug, warn};

/// Raw response body from the causal service
#[derive(Debug, Deserialize)]
struct CausalResponse {
    datetime: String,
    chain_detected: i64,
}

/// HTTP client for the causal-intelligence service.
///
/// One instance per pipeline; dispatches for different timeframes are
/// independent and a failure in one does not affect the others.
#[derive(Debug, Clone)]
pub struct CausalClient {
    http: reqwest::Client,
    settings: CausalSettings,
}

impl CausalClient {
    #[must_use]
    pub fn new(settings: CausalSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &CausalSettings {
        &self.settings
    }

    /// Dispatch a candle window for one timeframe.
    ///
    /// Returns `None` until the window holds at least `payload_rows - 1`
    /// records, and on any request or parse failure.
    pub async fn send_candles(
        &self,
        window: &SharedWindow<Candle>,
        timeframe: &Timeframe,
    ) -> Option<ChainSignal> {
        let want = self.settings.payload_rows - 1;
        let records = {
            let window = window.lock();
            if window.len() < want {
                debug!(
                    "{}: window at {}/{want}, dispatch skipped",
                    timeframe.label,
                    window.len()
                );
                return None;
            }
            window.get_last(want)
        };
        let body = payload::candle_csv(&records, timeframe.seconds);
        self.post_csv(body, &self.settings.url, &timeframe.label)
            .await
    }

    /// Dispatch a univariate window for one timeframe against the variant
    /// endpoint
    pub async fn send_samples(
        &self,
        window: &SharedWindow<UnivariateSample>,
        timeframe: &Timeframe,
    ) -> Option<ChainSignal> {
        let want = self.settings.payload_rows - 1;
        let records = {
            let window = window.lock();
            if window.len() < want {
                debug!(
                    "{}: window at {}/{want}, dispatch skipped",
                    timeframe.label,
                    window.len()
                );
                return None;
            }
            window.get_last(want)
        };
        let body = payload::sample_csv(&records, timeframe.seconds);
        let url = univariate_url(&self.settings.url);
        self.post_csv(body, &url, &timeframe.label).await
    }

    async fn post_csv(&self, body: String, url: &str, label: &str) -> Option<ChainSignal> {
        let mut request = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "text/csv")
            .body(body);
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }
        if let Some(mode) = &self.settings.reasoning_mode {
            request = request.query(&[("reasoning_mode", mode.as_str())]);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("{label}: causal dispatch failed: {e}");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(
                "{label}: causal service returned {}, dispatch dropped",
                response.status()
            );
            return None;
        }
        let raw: CausalResponse = match response.json().await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("{label}: undecodable causal response: {e}");
                return None;
            }
        };
        parse_signal(&raw, label)
    }
}

/// Variant endpoint consuming `datetime,value` payloads
fn univariate_url(base: &str) -> String {
    format!("{}/univariate", base.trim_end_matches('/'))
}

fn parse_signal(raw: &CausalResponse, label: &str) -> Option<ChainSignal> {
    let datetime = parse_datetime(&raw.datetime).or_else(|| {
        warn!("{label}: unparseable datetime '{}'", raw.datetime);
        None
    })?;
    if !(-1..=1).contains(&raw.chain_detected) {
        warn!(
            "{label}: chain_detected {} outside {{-1,0,1}}, dropped",
            raw.chain_detected
        );
        return None;
    }
    Some(ChainSignal {
        datetime,
        chain_detected: raw.chain_detected as i8,
        received_at: Utc::now(),
    })
}

fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .map(|naive| naive.and_utc())
                .ok()
        })
}
