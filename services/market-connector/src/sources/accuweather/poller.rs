//! Polling loop for current conditions

use super::AccuweatherConfig;
use crate::normalizers::{AccuweatherNormalizer, Normalizer};
use crate::sleep_or_shutdown;
use crate::sources::{rate_limit_info, retry_after};
use chainflow_common::{ConnectorStatus, FlowError, HealthMeter};
use data_aggregator::UnivariateAggregator;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

const RATE_LIMIT_FALLBACK: Duration = Duration::from_secs(5);

pub(super) async fn run(
    config: AccuweatherConfig,
    aggregator: Arc<Mutex<UnivariateAggregator>>,
    health: Arc<HealthMeter>,
    mut shutdown: watch::Receiver<bool>,
) {
    let http = reqwest::Client::new();
    let normalizer = AccuweatherNormalizer::new(config.location_key.clone());

    'ticks: loop {
        if *shutdown.borrow() {
            break;
        }
        let mut next_delay = config.poll_interval;

        for attempt in 1..=config.max_retries {
            match poll_once(&http, &config, &normalizer, &aggregator, &health).await {
                Ok(()) => break,
                Err(FlowError::RateLimited { retry_after }) => {
                    let wait = retry_after.unwrap_or(RATE_LIMIT_FALLBACK);
                    warn!("accuweather: rate limited, next poll in {wait:?}");
                    health.record_error();
                    // the 429 reschedules the tick instead of retrying in place
                    next_delay = wait;
                    break;
                }
                Err(e) => {
                    warn!(
                        "accuweather: poll attempt {attempt}/{} failed: {e}",
                        config.max_retries
                    );
                    health.record_error();
                    health.set_status(ConnectorStatus::Error);
                    if attempt < config.max_retries
                        && sleep_or_shutdown(config.retry_delay, &mut shutdown).await
                    {
                        break 'ticks;
                    }
                }
            }
        }

        if sleep_or_shutdown(next_delay, &mut shutdown).await {
            break;
        }
    }
    health.set_status(ConnectorStatus::Disconnected);
}

async fn poll_once(
    http: &reqwest::Client,
    config: &AccuweatherConfig,
    normalizer: &AccuweatherNormalizer,
    aggregator: &Arc<Mutex<UnivariateAggregator>>,
    health: &Arc<HealthMeter>,
) -> Result<(), FlowError> {
    let url = format!(
        "{}/currentconditions/v1/{}",
        config.api_url.trim_end_matches('/'),
        config.location_key
    );
    let response = http
        .get(&url)
        .query(&[("apikey", config.api_key.as_str()), ("details", "true")])
        .send()
        .await
        .map_err(|e| FlowError::TransientNetwork(e.to_string()))?;

    if let Some(info) = rate_limit_info(response.headers()) {
        debug!(
            "accuweather: rate-limit budget {} remaining",
            info.remaining
        );
        health.set_rate_limit(info);
    }
    if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(FlowError::RateLimited {
            retry_after: retry_after(response.headers()),
        });
    }
    if !response.status().is_success() {
        return Err(FlowError::TransientNetwork(format!(
            "status {}",
            response.status()
        )));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| FlowError::InvalidMessage(e.to_string()))?;
    match normalizer.normalize(&body) {
        Some(tick) => {
            health.set_status(ConnectorStatus::Connected);
            health.record_message(tick.ts);
            aggregator.lock().add_tick(&tick);
            Ok(())
        }
        None => Err(FlowError::InvalidMessage(
            "no usable observation in response".to_string(),
        )),
    }
}
