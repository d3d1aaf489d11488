//! Runtime configuration sourced from the process environment
//!
//! Per-source settings resolve to `None` when their credentials are missing
//! so the supervisor can skip that pipeline with a warning. Only the causal
//! service URL is required infrastructure; its absence aborts startup.

use crate::errors::FlowError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_BINANCE_WS_URL: &str = "wss://stream.binance.us:9443";
const DEFAULT_BINANCE_API_URL: &str = "https://api.binance.us";
const DEFAULT_BINANCE_SYMBOLS: &str = "BTCUSDT";
const DEFAULT_POLYGON_WS_URL: &str = "wss://socket.polygon.io/stocks";
const DEFAULT_POLYGON_API_URL: &str = "https://api.polygon.io";
const DEFAULT_ACCUWEATHER_API_URL: &str = "http://dataservice.accuweather.com";
const DEFAULT_BLOOMBERG_HOST: &str = "127.0.0.1";
const DEFAULT_BLOOMBERG_PORT: u16 = 8194;
const DEFAULT_DISPATCH_INTERVAL_SECS: u64 = 60;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

/// CSV data rows per dispatch payload, including the forecast placeholder
pub const DEFAULT_PAYLOAD_ROWS: usize = 5001;

/// Which connector pipelines the runtime assembles
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectorKind {
    Binance,
    Polygon,
    Accuweather,
    Bloomberg,
    /// All four sources
    All,
    /// The two streaming feeds (binance + polygon)
    Both,
}

impl ConnectorKind {
    #[must_use]
    pub const fn wants_binance(self) -> bool {
        matches!(self, Self::Binance | Self::All | Self::Both)
    }

    #[must_use]
    pub const fn wants_polygon(self) -> bool {
        matches!(self, Self::Polygon | Self::All | Self::Both)
    }

    #[must_use]
    pub const fn wants_accuweather(self) -> bool {
        matches!(self, Self::Accuweather | Self::All)
    }

    #[must_use]
    pub const fn wants_bloomberg(self) -> bool {
        matches!(self, Self::Bloomberg | Self::All)
    }
}

impl FromStr for ConnectorKind {
    type Err = FlowError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "binance" => Ok(Self::Binance),
            "polygon" => Ok(Self::Polygon),
            "accuweather" => Ok(Self::Accuweather),
            "bloomberg" => Ok(Self::Bloomberg),
            "all" => Ok(Self::All),
            "both" => Ok(Self::Both),
            other => Err(FlowError::config(format!(
                "unknown CONNECTOR_KIND '{other}' (expected binance|polygon|accuweather|bloomberg|all|both)"
            ))),
        }
    }
}

/// Causal-intelligence service settings (required infrastructure)
#[derive(Clone, Debug)]
pub struct CausalSettings {
    /// Endpoint for OHLC payloads; the univariate variant appends `/univariate`
    pub url: String,
    /// Bearer token, sent when present
    pub api_key: Option<String>,
    /// Cadence of the per-pipeline dispatch task
    pub dispatch_interval: Duration,
    /// CSV data rows per payload, including the placeholder row
    pub payload_rows: usize,
    /// Optional reasoning mode forwarded as a query parameter
    pub reasoning_mode: Option<String>,
}

#[derive(Clone, Debug)]
pub struct BinanceSettings {
    pub ws_url: String,
    pub api_url: String,
    pub symbols: Vec<String>,
    /// Seed buffers from the historical kline endpoint before streaming
    pub bootstrap: bool,
}

#[derive(Clone, Debug)]
pub struct PolygonSettings {
    pub ws_url: String,
    pub api_url: String,
    pub api_key: String,
    pub symbols: Vec<String>,
    /// Replay missed trades over the range endpoint after a gap
    pub backfill: bool,
}

#[derive(Clone, Debug)]
pub struct AccuweatherSettings {
    pub api_url: String,
    pub api_key: String,
    pub location_key: String,
    pub poll_interval: Duration,
}

#[derive(Clone, Debug)]
pub struct BloombergSettings {
    pub host: String,
    pub port: u16,
    pub securities: Vec<String>,
}

/// Full runtime configuration
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub connector_kind: ConnectorKind,
    pub causal: CausalSettings,
    pub binance: Option<BinanceSettings>,
    pub polygon: Option<PolygonSettings>,
    pub accuweather: Option<AccuweatherSettings>,
    pub bloomberg: Option<BloombergSettings>,
}

impl RuntimeConfig {
    /// Read the configuration from the environment.
    ///
    /// `connector_override` takes precedence over `CONNECTOR_KIND`.
    pub fn from_env(connector_override: Option<&str>) -> Result<Self, FlowError> {
        let kind_raw = connector_override
            .map(str::to_string)
            .or_else(|| var("CONNECTOR_KIND"))
            .unwrap_or_else(|| "binance".to_string());
        let connector_kind = kind_raw.parse::<ConnectorKind>()?;

        let causal = CausalSettings {
            url: var("CAUSAL_API_URL")
                .ok_or_else(|| FlowError::config("CAUSAL_API_URL is required"))?,
            api_key: var("CAUSAL_API_KEY"),
            dispatch_interval: Duration::from_secs(var_parse(
                "DISPATCH_INTERVAL_SECS",
                DEFAULT_DISPATCH_INTERVAL_SECS,
            )?),
            payload_rows: var_parse("CAUSAL_PAYLOAD_ROWS", DEFAULT_PAYLOAD_ROWS)?,
            reasoning_mode: var("CAUSAL_REASONING_MODE"),
        };
        if causal.payload_rows < 2 {
            return Err(FlowError::config(
                "CAUSAL_PAYLOAD_ROWS must be at least 2 (one data row plus the placeholder)",
            ));
        }

        let binance = Some(BinanceSettings {
            ws_url: var("BINANCE_WS_URL").unwrap_or_else(|| DEFAULT_BINANCE_WS_URL.to_string()),
            api_url: var("BINANCE_API_URL").unwrap_or_else(|| DEFAULT_BINANCE_API_URL.to_string()),
            symbols: split_list(
                &var("BINANCE_SYMBOLS").unwrap_or_else(|| DEFAULT_BINANCE_SYMBOLS.to_string()),
            ),
            bootstrap: var_flag("BINANCE_BOOTSTRAP", false)?,
        });

        let polygon = var("POLYGON_API_KEY").map(|api_key| {
            Ok::<_, FlowError>(PolygonSettings {
                ws_url: var("POLYGON_WS_URL").unwrap_or_else(|| DEFAULT_POLYGON_WS_URL.to_string()),
                api_url: var("POLYGON_API_URL")
                    .unwrap_or_else(|| DEFAULT_POLYGON_API_URL.to_string()),
                api_key,
                symbols: split_list(&var("POLYGON_SYMBOLS").unwrap_or_else(|| "AAPL".to_string())),
                backfill: var_flag("POLYGON_BACKFILL", true)?,
            })
        });
        let polygon = polygon.transpose()?;

        let accuweather = match (var("ACCUWEATHER_API_KEY"), var("ACCUWEATHER_LOCATION_KEY")) {
            (Some(api_key), Some(location_key)) => Some(AccuweatherSettings {
                api_url: var("ACCUWEATHER_API_URL")
                    .unwrap_or_else(|| DEFAULT_ACCUWEATHER_API_URL.to_string()),
                api_key,
                location_key,
                poll_interval: Duration::from_secs(var_parse(
                    "ACCUWEATHER_POLL_SECS",
                    DEFAULT_POLL_INTERVAL_SECS,
                )?),
            }),
            _ => None,
        };

        let bloomberg = var("BLOOMBERG_SECURITIES").map(|raw| {
            Ok::<_, FlowError>(BloombergSettings {
                host: var("BLOOMBERG_HOST").unwrap_or_else(|| DEFAULT_BLOOMBERG_HOST.to_string()),
                port: var_parse("BLOOMBERG_PORT", DEFAULT_BLOOMBERG_PORT)?,
                securities: split_list(&raw),
            })
        });
        let bloomberg = bloomberg.transpose()?;

        Ok(Self {
            connector_kind,
            causal,
            binance,
            polygon,
            accuweather,
            bloomberg,
        })
    }
}

/// Read an environment variable, treating empty values as absent
fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn var_parse<T: FromStr>(name: &str, default: T) -> Result<T, FlowError> {
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| FlowError::config(format!("{name} has invalid value '{raw}'"))),
        None => Ok(default),
    }
}

fn var_flag(name: &str, default: bool) -> Result<bool, FlowError> {
    match var(name).as_deref().map(str::trim) {
        None => Ok(default),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some("0") | Some("false") | Some("no") => Ok(false),
        Some(other) => Err(FlowError::config(format!(
            "{name} has invalid boolean '{other}'"
        ))),
    }
}

/// Split a comma-separated list, trimming and dropping empty entries
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
