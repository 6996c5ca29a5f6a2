//! Treasury disbursement service.
//!
//! ```text
//!   HTTP client
//!       │
//!       ▼
//!   ┌────────┐   ┌──────────────┐   ┌──────────────┐   ┌────────────────────┐
//!   │  http  │──▶│  dispatcher  │──▶│ balance gate │──▶│ connection manager │──▶ RPC endpoint 0..N
//!   └────────┘   └──────┬───────┘   └──────────────┘   └────────────────────┘
//!                       │                                        ▲
//!                       ├──▶ payout estimator                    │
//!                       └──▶ sign + broadcast + await inclusion ─┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use treasury_disburser::blockchain::{AlloyConnector, Wallet};
use treasury_disburser::config::{self, ServiceConfig};
use treasury_disburser::disbursement::RandomPayoutEstimator;
use treasury_disburser::http::HttpServer;
use treasury_disburser::lifecycle::{signals, startup, Shutdown};
use treasury_disburser::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "treasury-disburser", version, about = "Treasury disbursement service")]
struct Args {
    /// Path to a TOML config file. Defaults plus environment when omitted.
    #[arg(short, long, env = "DISBURSER_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config: ServiceConfig = match &args.config {
        Some(path) => config::load_config(path)?,
        None => config::load_from_env()?,
    };

    logging::init_logging(&config.observability);
    tracing::info!("treasury-disburser v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        endpoints = config.network.endpoints.len(),
        chain_id = config.network.chain_id,
        treasury = %config.account.treasury_address,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let wallet = Wallet::from_env(config.network.chain_id)?;
    let connector = Arc::new(AlloyConnector::new(config.network.rpc_timeout()));
    let dispatcher = startup::build_dispatcher(
        &config,
        wallet,
        connector,
        Arc::new(RandomPayoutEstimator),
    )?;
    startup::warm_up(&dispatcher).await;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    signals::spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config, dispatcher);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
