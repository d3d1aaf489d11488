//! Polygon WebSocket session: auth handshake, channel subscription,
//! receive loop, and the gap-backfill trigger on disconnect

use super::{backfill, ChannelCommand, PolygonConfig};
use crate::normalizers::{Normalizer, PolygonNormalizer};
use crate::reconnect::BackoffPolicy;
use crate::sleep_or_shutdown;
use chainflow_common::{ConnectorStatus, HealthMeter};
use chrono::Utc;
use data_aggregator::OhlcAggregator;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

enum SessionEnd {
    Shutdown,
    Disconnected,
}

pub(super) async fn run(
    config: PolygonConfig,
    aggregator: Arc<Mutex<OhlcAggregator>>,
    health: Arc<HealthMeter>,
    mut shutdown: watch::Receiver<bool>,
    mut control: mpsc::UnboundedReceiver<ChannelCommand>,
) {
    let http = reqwest::Client::new();
    let mut backoff = BackoffPolicy::new(config.reconnect_base, config.max_reconnects);
    let mut symbols = config.symbols.clone();
    let mut control_open = true;

    loop {
        if *shutdown.borrow() {
            break;
        }

        match timeout(config.connect_timeout, connect_async(config.ws_url.as_str())).await {
            Ok(Ok((ws, _response))) => {
                let (mut write, mut read) = ws.split();
                match establish(&config, &mut write, &mut read, &symbols).await {
                    Ok(()) => {
                        info!("polygon: authenticated, {} channels live", symbols.len());
                        backoff.reset();
                        health.set_status(ConnectorStatus::Connected);

                        let end = run_session(
                            &config,
                            write,
                            read,
                            &mut symbols,
                            &aggregator,
                            &health,
                            &mut shutdown,
                            &mut control,
                            &mut control_open,
                        )
                        .await;
                        health.set_status(ConnectorStatus::Disconnected);
                        if matches!(end, SessionEnd::Shutdown) {
                            break;
                        }

                        // replay the hole before streaming resumes
                        if config.backfill {
                            if run_backfill(&http, &config, &symbols, &aggregator, &health, &mut shutdown)
                                .await
                            {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        warn!("polygon: handshake failed: {e:#}");
                        health.record_error();
                        health.set_status(ConnectorStatus::Error);
                    }
                }
            }
            Ok(Err(e)) => {
                warn!("polygon: connect failed: {e}");
                health.record_error();
                health.set_status(ConnectorStatus::Error);
            }
            Err(_) => {
                warn!(
                    "polygon: connect timed out after {:?}",
                    config.connect_timeout
                );
                health.record_error();
                health.set_status(ConnectorStatus::Error);
            }
        }

        let Some(delay) = backoff.next_delay() else {
            error!(
                "polygon: giving up after {} reconnect attempts",
                config.max_reconnects
            );
            health.set_status(ConnectorStatus::Error);
            return;
        };
        debug!("polygon: reconnecting in {delay:?}");
        if sleep_or_shutdown(delay, &mut shutdown).await {
            break;
        }
    }
    health.set_status(ConnectorStatus::Disconnected);
}

/// Auth frame, wait for `auth_success`, then subscribe the trade channels
async fn establish(
    config: &PolygonConfig,
    write: &mut WsSink,
    read: &mut WsSource,
    symbols: &[String],
) -> anyhow::Result<()> {
    let auth = json!({"action": "auth", "params": config.api_key});
    write.send(Message::Text(auth.to_string())).await?;

    timeout(AUTH_TIMEOUT, wait_for_auth(read))
        .await
        .map_err(|_| anyhow::anyhow!("no auth_success within {AUTH_TIMEOUT:?}"))??;

    let subscribe = json!({
        "action": "subscribe",
        "params": trade_channels(symbols),
    });
    write.send(Message::Text(subscribe.to_string())).await?;
    Ok(())
}

async fn wait_for_auth(read: &mut WsSource) -> anyhow::Result<()> {
    while let Some(frame) = read.next().await {
        let Message::Text(text) = frame? else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        for event in value.as_array().into_iter().flatten() {
            if event.get("ev").and_then(Value::as_str) != Some("status") {
                continue;
            }
            match event.get("status").and_then(Value::as_str) {
                Some("auth_success") => return Ok(()),
                Some("auth_failed") => {
                    anyhow::bail!(
                        "authentication rejected: {}",
                        event.get("message").and_then(Value::as_str).unwrap_or("")
                    )
                }
                Some(status) => debug!("polygon: status '{status}' during handshake"),
                None => {}
            }
        }
    }
    anyhow::bail!("stream ended during authentication")
}

/// `T.<SYMBOL>` channel list, comma separated
fn trade_channels(symbols: &[String]) -> String {
    symbols
        .iter()
        .map(|s| format!("T.{}", s.to_uppercase()))
        .collect::<Vec<_>>()
        .join(",")
}

#[allow(clippy::too_many_arguments)]
async fn run_session(
    config: &PolygonConfig,
    mut write: WsSink,
    mut read: WsSource,
    symbols: &mut Vec<String>,
    aggregator: &Arc<Mutex<OhlcAggregator>>,
    health: &Arc<HealthMeter>,
    shutdown: &mut watch::Receiver<bool>,
    control: &mut mpsc::UnboundedReceiver<ChannelCommand>,
    control_open: &mut bool,
) -> SessionEnd {
    let mut heartbeat = interval(config.ping_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_frame = Instant::now();

    loop {
        tokio::select! {
            _ = shutdown.changed() => return SessionEnd::Shutdown,

            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    last_frame = Instant::now();
                    handle_frame(&text, aggregator, health);
                }
                Some(Ok(Message::Ping(payload))) => {
                    last_frame = Instant::now();
                    if write.send(Message::Pong(payload)).await.is_err() {
                        return SessionEnd::Disconnected;
                    }
                }
                Some(Ok(Message::Pong(_))) => {
                    last_frame = Instant::now();
                }
                Some(Ok(Message::Close(_))) => {
                    info!("polygon: server closed the stream");
                    return SessionEnd::Disconnected;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("polygon: read error: {e}");
                    health.record_error();
                    return SessionEnd::Disconnected;
                }
                None => return SessionEnd::Disconnected,
            },

            cmd = control.recv(), if *control_open => match cmd {
                Some(cmd) => {
                    if apply_channels(&mut write, symbols, cmd).await.is_err() {
                        return SessionEnd::Disconnected;
                    }
                }
                None => *control_open = false,
            },

            _ = heartbeat.tick() => {
                if last_frame.elapsed() > config.ping_interval * 3 {
                    warn!(
                        "polygon: no frames for {:?}, forcing reconnect",
                        last_frame.elapsed()
                    );
                    return SessionEnd::Disconnected;
                }
                if write.send(Message::Ping(Vec::new())).await.is_err() {
                    return SessionEnd::Disconnected;
                }
            }
        }
    }
}

/// Frames carry arrays of events; trades go to the normalizer, status
/// events are logged and dropped
fn handle_frame(text: &str, aggregator: &Arc<Mutex<OhlcAggregator>>, health: &Arc<HealthMeter>) {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!("polygon: undecodable frame dropped: {e}");
            health.record_error();
            return;
        }
    };
    for event in value.as_array().into_iter().flatten() {
        if event.get("ev").and_then(Value::as_str) == Some("status") {
            info!(
                "polygon: status {}",
                event.get("message").and_then(|v| v.as_str()).unwrap_or("-")
            );
            continue;
        }
        if let Some(tick) = PolygonNormalizer.normalize(event) {
            health.record_message(tick.ts);
            aggregator.lock().add_tick(&tick);
        } else {
            debug!("polygon: skipped non-trade event");
        }
    }
}

async fn apply_channels(
    write: &mut WsSink,
    symbols: &mut Vec<String>,
    cmd: ChannelCommand,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let (action, affected) = match cmd {
        ChannelCommand::Add(list) => {
            let fresh: Vec<String> = list
                .into_iter()
                .filter(|s| !symbols.iter().any(|known| known.eq_ignore_ascii_case(s)))
                .collect();
            symbols.extend(fresh.iter().cloned());
            ("subscribe", fresh)
        }
        ChannelCommand::Remove(list) => {
            symbols.retain(|known| !list.iter().any(|s| s.eq_ignore_ascii_case(known)));
            ("unsubscribe", list)
        }
    };
    if affected.is_empty() {
        return Ok(());
    }
    let frame = json!({
        "action": action,
        "params": trade_channels(&affected),
    });
    info!("polygon: {action} {affected:?}");
    write.send(Message::Text(frame.to_string())).await
}

/// Backfill the gap since the last message when it exceeds the threshold.
/// Returns `true` when shutdown interrupted the replay.
async fn run_backfill(
    http: &reqwest::Client,
    config: &PolygonConfig,
    symbols: &[String],
    aggregator: &Arc<Mutex<OhlcAggregator>>,
    health: &Arc<HealthMeter>,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    let Some(last_message) = health.last_message_at() else {
        return false;
    };
    let now = Utc::now();
    let gap = (now - last_message)
        .to_std()
        .unwrap_or(Duration::ZERO);
    if gap <= config.backfill_threshold {
        return false;
    }
    info!(
        "polygon: gap of {}s since last trade, backfilling",
        gap.as_secs()
    );

    tokio::select! {
        _ = shutdown.changed() => true,
        result = backfill::replay_gap(http, config, symbols, last_message, now, aggregator) => {
            match result {
                Ok(count) => info!("polygon: replayed {count} backfilled trades"),
                Err(e) => {
                    warn!("polygon: backfill failed: {e:#}");
                    health.record_error();
                }
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_channels_are_uppercased_and_prefixed() {
        let channels = trade_channels(&["aapl".to_string(), "MSFT".to_string()]);
        assert_eq!(channels, "T.AAPL,T.MSFT");
    }
}
