//! Shared utilities for integration tests.
#![allow(dead_code)]

use alloy::primitives::U256;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use treasury_disburser::blockchain::mock::MockNetwork;
use treasury_disburser::blockchain::units::ether_to_wei;
use treasury_disburser::blockchain::Wallet;
use treasury_disburser::config::ServiceConfig;
use treasury_disburser::disbursement::{FixedBonusEstimator, PayoutEstimator};
use treasury_disburser::http::HttpServer;
use treasury_disburser::lifecycle::{startup, Shutdown};
use treasury_disburser::TransactionDispatcher;

/// Anvil's first account.
pub const TEST_PRIVATE_KEY: &str =
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const TREASURY: &str = "0x0fF31D4cdCE8B3f7929c04EbD4cd852608DC09f4";
pub const CHAIN_ID: u64 = 31337;

pub fn eth(amount: f64) -> U256 {
    ether_to_wei(amount).unwrap()
}

/// Config pointing at `urls`, with fast polling.
pub fn test_config(urls: &[&str]) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.network.endpoints = urls.iter().map(|u| u.to_string()).collect();
    config.network.chain_id = CHAIN_ID;
    config.account.treasury_address = TREASURY.to_string();
    config.dispatch.poll_interval_ms = 10;
    config.dispatch.confirmation_timeout_secs = 5;
    config
}

/// A dispatcher over a mock network whose endpoints are `urls`; the ones in
/// `down` refuse connections.
pub fn mock_service(
    urls: &[&str],
    down: &[&str],
    estimator: Arc<dyn PayoutEstimator>,
) -> (MockNetwork, Arc<TransactionDispatcher>, ServiceConfig) {
    let network = MockNetwork::new(CHAIN_ID);
    for url in urls {
        if down.contains(url) {
            network.add_unreachable_endpoint(url);
        } else {
            network.add_endpoint(url);
        }
    }

    let config = test_config(urls);
    let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY, CHAIN_ID).unwrap();
    let dispatcher = startup::build_dispatcher(
        &config,
        wallet,
        Arc::new(network.connector()),
        estimator,
    )
    .unwrap();

    (network, dispatcher, config)
}

pub fn fixed_estimator() -> Arc<dyn PayoutEstimator> {
    Arc::new(FixedBonusEstimator::new(0.001))
}

/// Serve `dispatcher` on an ephemeral port. Keep the returned `Shutdown`
/// alive for the duration of the test.
pub async fn spawn_server(
    config: ServiceConfig,
    dispatcher: Arc<TransactionDispatcher>,
) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, dispatcher);
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
