//! JSON-RPC connection handles.
//!
//! # Responsibilities
//! - Open a connection to a single endpoint
//! - Query chain state (block number, balances, nonces, receipts)
//! - Broadcast pre-signed transactions
//! - Bound every call with a timeout
//!
//! Failover lives one level up in `connection.rs`; a handle only ever talks
//! to the endpoint it was opened against.

use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::transports::TransportError;
use async_trait::async_trait;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::blockchain::pool::NetworkEndpoint;
use crate::blockchain::types::{
    BlockchainError, BlockchainResult, InclusionReceipt, SignedTransfer,
};

/// An open connection to one ledger endpoint.
#[async_trait]
pub trait RpcHandle: Send + Sync {
    /// Endpoint this handle talks to.
    fn url(&self) -> &str;

    /// Latest block number. Doubles as the liveness probe.
    async fn block_number(&self) -> BlockchainResult<u64>;

    async fn chain_id(&self) -> BlockchainResult<u64>;

    /// Liquid balance in wei at the latest block.
    async fn balance(&self, address: Address) -> BlockchainResult<U256>;

    /// Current network gas price in wei.
    async fn gas_price(&self) -> BlockchainResult<u128>;

    /// Transaction count including pending transactions.
    async fn pending_nonce(&self, address: Address) -> BlockchainResult<u64>;

    /// Broadcast a signed transaction, returning the hash the node reports.
    async fn send_raw(&self, tx: &SignedTransfer) -> BlockchainResult<TxHash>;

    /// Receipt for `tx_hash`, or `None` while it is still pending.
    async fn receipt(&self, tx_hash: TxHash) -> BlockchainResult<Option<InclusionReceipt>>;
}

/// Opens handles to endpoints.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, endpoint: &NetworkEndpoint) -> BlockchainResult<Arc<dyn RpcHandle>>;
}

/// Connector backed by alloy HTTP providers.
#[derive(Debug, Clone)]
pub struct AlloyConnector {
    timeout_duration: Duration,
}

impl AlloyConnector {
    pub fn new(rpc_timeout: Duration) -> Self {
        Self {
            timeout_duration: rpc_timeout,
        }
    }
}

#[async_trait]
impl Connector for AlloyConnector {
    async fn open(&self, endpoint: &NetworkEndpoint) -> BlockchainResult<Arc<dyn RpcHandle>> {
        let url: url::Url = endpoint.url.parse().map_err(|e| {
            BlockchainError::Rpc(format!("Invalid RPC URL '{}': {}", endpoint.display_url(), e))
        })?;
        let provider = ProviderBuilder::new().connect_http(url);

        Ok(Arc::new(AlloyHandle {
            url: endpoint.url.clone(),
            provider: Arc::new(provider),
            timeout_duration: self.timeout_duration,
        }))
    }
}

/// Handle wrapping a single alloy provider.
pub struct AlloyHandle {
    url: String,
    provider: Arc<dyn Provider + Send + Sync>,
    timeout_duration: Duration,
}

impl AlloyHandle {
    async fn call<T, F>(&self, fut: F) -> BlockchainResult<T>
    where
        F: IntoFuture<Output = Result<T, TransportError>>,
    {
        match timeout(self.timeout_duration, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(map_transport_error(e)),
            Err(_) => Err(BlockchainError::Timeout(self.timeout_duration.as_secs())),
        }
    }
}

#[async_trait]
impl RpcHandle for AlloyHandle {
    fn url(&self) -> &str {
        &self.url
    }

    async fn block_number(&self) -> BlockchainResult<u64> {
        self.call(self.provider.get_block_number()).await
    }

    async fn chain_id(&self) -> BlockchainResult<u64> {
        self.call(self.provider.get_chain_id()).await
    }

    async fn balance(&self, address: Address) -> BlockchainResult<U256> {
        self.call(self.provider.get_balance(address)).await
    }

    async fn gas_price(&self) -> BlockchainResult<u128> {
        self.call(self.provider.get_gas_price()).await
    }

    async fn pending_nonce(&self, address: Address) -> BlockchainResult<u64> {
        self.call(self.provider.get_transaction_count(address).pending())
            .await
    }

    async fn send_raw(&self, tx: &SignedTransfer) -> BlockchainResult<TxHash> {
        let pending = self.call(self.provider.send_raw_transaction(&tx.raw)).await?;
        Ok(*pending.tx_hash())
    }

    async fn receipt(&self, tx_hash: TxHash) -> BlockchainResult<Option<InclusionReceipt>> {
        let receipt = self
            .call(self.provider.get_transaction_receipt(tx_hash))
            .await?;

        Ok(receipt.and_then(|r| {
            // Receipts without a block number are still pending on some nodes
            let block_number = r.block_number?;
            Some(InclusionReceipt {
                tx_hash: r.transaction_hash,
                block_number,
                gas_used: r.gas_used,
                effective_gas_price: r.effective_gas_price,
                success: r.status(),
            })
        }))
    }
}

impl std::fmt::Debug for AlloyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlloyHandle")
            .field("url", &self.url)
            .field("timeout_secs", &self.timeout_duration.as_secs())
            .finish()
    }
}

/// Keep node-side rejections (JSON-RPC error objects) apart from transport
/// failures; only the former carry a reason code worth surfacing.
fn map_transport_error(err: TransportError) -> BlockchainError {
    match err.as_error_resp() {
        Some(payload) => BlockchainError::Rejected {
            code: payload.code,
            message: payload.message.to_string(),
        },
        None => BlockchainError::Rpc(err.to_string()),
    }
}
