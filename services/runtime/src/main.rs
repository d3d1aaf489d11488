//! Chainflow market-data ingestion service
//!
//! Reads the connector selection and per-source credentials from the
//! environment, assembles the pipelines, and runs them until interrupted.

use anyhow::Result;
use chainflow_common::RuntimeConfig;
use chainflow_runtime::Supervisor;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SERVICE_NAME: &str = "chainflow";

#[derive(Parser)]
#[command(name = "chainflow")]
#[command(about = "Unified market-data ingestion and causal-dispatch service")]
struct Cli {
    /// Connector selection override (binance|polygon|accuweather|bloomberg|all|both)
    #[arg(long)]
    connector: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenv::dotenv().ok();
    init_tracing(cli.debug);

    info!("starting {SERVICE_NAME} v{}", env!("CARGO_PKG_VERSION"));

    let config = RuntimeConfig::from_env(cli.connector.as_deref())?;
    info!("connector kind: {:?}", config.connector_kind);

    let supervisor = Supervisor::from_config(config)?;
    supervisor.run().await
}

fn init_tracing(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{SERVICE_NAME}={level},chainflow_runtime={level},market_connector={level},data_aggregator={level},causal_client={level}"
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
