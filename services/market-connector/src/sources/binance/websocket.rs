//! Binance WebSocket session and reconnect loop

use super::{BinanceConfig, SubscriptionCommand};
use crate::normalizers::{BinanceNormalizer, Normalizer};
use crate::reconnect::BackoffPolicy;
use crate::sleep_or_shutdown;
use chainflow_common::{ConnectorStatus, HealthMeter};
use data_aggregator::OhlcAggregator;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// How a live session ended
enum SessionEnd {
    Shutdown,
    Disconnected,
}

/// Reconnect loop: connect with timeout, run the session, back off on
/// failure, reset the backoff on success
pub(super) async fn run(
    config: BinanceConfig,
    aggregator: Arc<Mutex<OhlcAggregator>>,
    health: Arc<HealthMeter>,
    mut shutdown: watch::Receiver<bool>,
    mut control: mpsc::UnboundedReceiver<SubscriptionCommand>,
) {
    let mut backoff = BackoffPolicy::new(config.reconnect_base, config.max_reconnects);
    let mut symbols = config.symbols.clone();
    let mut next_request_id: u64 = 0;
    let mut control_open = true;

    loop {
        if *shutdown.borrow() {
            break;
        }
        let url = match stream_url(&config.ws_url, &symbols, &config.streams) {
            Ok(url) => url,
            Err(e) => {
                error!("binance: cannot build stream url: {e:#}");
                health.set_status(ConnectorStatus::Error);
                return;
            }
        };

        match timeout(config.connect_timeout, connect_async(url.as_str())).await {
            Ok(Ok((ws, _response))) => {
                info!(
                    "binance: stream open ({} symbols, {} stream kinds)",
                    symbols.len(),
                    config.streams.len()
                );
                backoff.reset();
                health.set_status(ConnectorStatus::Connected);

                let end = run_session(
                    &config,
                    ws,
                    &mut symbols,
                    &mut next_request_id,
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
            }
            Ok(Err(e)) => {
                warn!("binance: connect failed: {e}");
                health.record_error();
                health.set_status(ConnectorStatus::Error);
            }
            Err(_) => {
                warn!(
                    "binance: connect timed out after {:?}",
                    config.connect_timeout
                );
                health.record_error();
                health.set_status(ConnectorStatus::Error);
            }
        }

        let Some(delay) = backoff.next_delay() else {
            error!(
                "binance: giving up after {} reconnect attempts",
                config.max_reconnects
            );
            health.set_status(ConnectorStatus::Error);
            return;
        };
        debug!("binance: reconnecting in {delay:?}");
        if sleep_or_shutdown(delay, &mut shutdown).await {
            break;
        }
    }
    health.set_status(ConnectorStatus::Disconnected);
}

/// Multiplexed stream endpoint: `<base>/stream?streams=<sym>@<kind>/...`
fn stream_url(ws_base: &str, symbols: &[String], streams: &[String]) -> anyhow::Result<String> {
    let stream_names: Vec<String> = symbols
        .iter()
        .flat_map(|symbol| {
            streams
                .iter()
                .map(move |kind| format!("{}@{}", symbol.to_lowercase(), kind))
        })
        .collect();
    let url = format!(
        "{}/stream?streams={}",
        ws_base.trim_end_matches('/'),
        stream_names.join("/")
    );
    Url::parse(&url)?;
    Ok(url)
}

#[allow(clippy::too_many_arguments)]
async fn run_session(
    config: &BinanceConfig,
    ws: WsStream,
    symbols: &mut Vec<String>,
    next_request_id: &mut u64,
    aggregator: &Arc<Mutex<OhlcAggregator>>,
    health: &Arc<HealthMeter>,
    shutdown: &mut watch::Receiver<bool>,
    control: &mut mpsc::UnboundedReceiver<SubscriptionCommand>,
    control_open: &mut bool,
) -> SessionEnd {
    let (mut write, mut read) = ws.split();
    let mut heartbeat = interval(config.ping_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_frame = Instant::now();

    loop {
        tokio::select! {
            _ = shutdown.changed() => return SessionEnd::Shutdown,

            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    last_frame = Instant::now();
                    handle_text(&text, aggregator, health);
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
                    info!("binance: server closed the stream");
                    return SessionEnd::Disconnected;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("binance: read error: {e}");
                    health.record_error();
                    return SessionEnd::Disconnected;
                }
                None => return SessionEnd::Disconnected,
            },

            cmd = control.recv(), if *control_open => match cmd {
                Some(cmd) => {
                    if apply_subscription(&mut write, symbols, next_request_id, &config.streams, cmd)
                        .await
                        .is_err()
                    {
                        return SessionEnd::Disconnected;
                    }
                }
                None => *control_open = false,
            },

            _ = heartbeat.tick() => {
                if last_frame.elapsed() > config.ping_interval * 3 {
                    warn!(
                        "binance: no frames for {:?}, forcing reconnect",
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

/// A frame may carry one message or an array of them; event-bearing
/// payloads go to the normalizer, everything else is logged
fn handle_text(text: &str, aggregator: &Arc<Mutex<OhlcAggregator>>, health: &Arc<HealthMeter>) {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!("binance: undecodable frame dropped: {e}");
            health.record_error();
            return;
        }
    };
    match value {
        Value::Array(items) => {
            for item in &items {
                dispatch_message(item, aggregator, health);
            }
        }
        other => dispatch_message(&other, aggregator, health),
    }
}

fn dispatch_message(
    value: &Value,
    aggregator: &Arc<Mutex<OhlcAggregator>>,
    health: &Arc<HealthMeter>,
) {
    if let Some(tick) = BinanceNormalizer.normalize(value) {
        health.record_message(tick.ts);
        aggregator.lock().add_tick(&tick);
    } else if value.get("id").is_some() {
        debug!("binance: control ack {value}");
    } else {
        debug!("binance: skipped non-trade message");
    }
}

async fn apply_subscription(
    write: &mut WsSink,
    symbols: &mut Vec<String>,
    next_request_id: &mut u64,
    streams: &[String],
    cmd: SubscriptionCommand,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let (method, affected) = match cmd {
        SubscriptionCommand::Add(list) => {
            let fresh: Vec<String> = list
                .into_iter()
                .filter(|s| !symbols.iter().any(|known| known.eq_ignore_ascii_case(s)))
                .collect();
            symbols.extend(fresh.iter().cloned());
            ("SUBSCRIBE", fresh)
        }
        SubscriptionCommand::Remove(list) => {
            symbols.retain(|known| !list.iter().any(|s| s.eq_ignore_ascii_case(known)));
            ("UNSUBSCRIBE", list)
        }
    };
    if affected.is_empty() {
        return Ok(());
    }
    let params: Vec<String> = affected
        .iter()
        .flat_map(|symbol| {
            streams
                .iter()
                .map(move |kind| format!("{}@{}", symbol.to_lowercase(), kind))
        })
        .collect();
    *next_request_id += 1;
    let frame = json!({
        "method": method,
        "params": params,
        "id": *next_request_id,
    });
    info!("binance: {} {:?}", method.to_lowercase(), affected);
    write.send(Message::Text(frame.to_string())).await
}
