//! Startup orchestration.
//!
//! # Order
//! config → endpoint pool → wallet → connection manager → dispatcher → listener
//!
//! Any startup error is fatal. The first connection is attempted eagerly so
//! the log shows which endpoint the service starts on, but an unreachable
//! network does not prevent startup: the next request retries.

use std::sync::Arc;

use crate::blockchain::{BlockchainResult, Connector, ConnectionManager, EndpointPool, Wallet};
use crate::config::ServiceConfig;
use crate::disbursement::{PayoutEstimator, TransactionDispatcher};

/// Assemble the dispatcher for `config` around an already loaded wallet.
pub fn build_dispatcher(
    config: &ServiceConfig,
    wallet: Wallet,
    connector: Arc<dyn Connector>,
    estimator: Arc<dyn PayoutEstimator>,
) -> BlockchainResult<Arc<TransactionDispatcher>> {
    let pool = EndpointPool::new(&config.network.endpoints)?;
    tracing::info!(
        endpoints = pool.len(),
        chain_id = config.network.chain_id,
        "Endpoint pool configured"
    );

    let manager = Arc::new(ConnectionManager::new(pool, connector, wallet));
    Ok(Arc::new(TransactionDispatcher::new(
        manager,
        estimator,
        config.dispatch.clone(),
    )))
}

/// Try the first connection, logging instead of failing.
pub async fn warm_up(dispatcher: &TransactionDispatcher) {
    match dispatcher.manager().acquire().await {
        Ok(conn) => tracing::info!(
            endpoint = %conn.endpoint().display_url(),
            "Initial connection established"
        ),
        Err(e) => tracing::warn!(
            error = %e,
            "No endpoint reachable at startup, will retry on first request"
        ),
    }
}
