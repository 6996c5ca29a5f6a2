//! In-memory ledger network.
//!
//! Stands in for a set of JSON-RPC endpoints in tests and local dry runs.
//! Every endpoint shares one ledger; each endpoint's reachability, chain ID
//! and failure modes can be scripted independently, and every opened
//! connection and RPC call is counted.

use alloy::primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::blockchain::client::{Connector, RpcHandle};
use crate::blockchain::pool::NetworkEndpoint;
use crate::blockchain::types::{
    BlockchainError, BlockchainResult, InclusionReceipt, SignedTransfer,
};

/// Gas price reported by mock endpoints unless overridden (20 gwei).
pub const MOCK_GAS_PRICE: u128 = 20_000_000_000;

#[derive(Debug, Clone)]
struct EndpointBehavior {
    reachable: bool,
    chain_id: u64,
    gas_price_fails: bool,
    reject_with: Option<(i64, String)>,
}

#[derive(Debug, Default)]
struct LedgerState {
    head: u64,
    gas_price: u128,
    auto_mine: bool,
    balances: HashMap<Address, U256>,
    nonces: HashMap<Address, u64>,
    pending: Vec<SignedTransfer>,
    receipts: HashMap<TxHash, InclusionReceipt>,
    sent: Vec<SignedTransfer>,
}

impl LedgerState {
    fn include(&mut self, tx: &SignedTransfer) {
        self.head += 1;
        self.receipts.insert(
            tx.hash,
            InclusionReceipt {
                tx_hash: tx.hash,
                block_number: self.head,
                gas_used: tx.gas_limit,
                effective_gas_price: tx.gas_price,
                success: true,
            },
        );
    }
}

#[derive(Debug)]
struct MockInner {
    chain_id: u64,
    endpoints: Mutex<HashMap<String, EndpointBehavior>>,
    ledger: Mutex<LedgerState>,
    opens: AtomicUsize,
    calls: AtomicUsize,
}

/// Shared in-memory network. Cloning shares state.
#[derive(Debug, Clone)]
pub struct MockNetwork {
    inner: Arc<MockInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockNetwork {
    /// Create a network for `chain_id` with no endpoints.
    pub fn new(chain_id: u64) -> Self {
        Self {
            inner: Arc::new(MockInner {
                chain_id,
                endpoints: Mutex::new(HashMap::new()),
                ledger: Mutex::new(LedgerState {
                    head: 1_000,
                    gas_price: MOCK_GAS_PRICE,
                    auto_mine: true,
                    ..Default::default()
                }),
                opens: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }),
        }
    }

    /// Register a reachable endpoint. Unregistered URLs refuse connections.
    pub fn add_endpoint(&self, url: &str) -> &Self {
        lock(&self.inner.endpoints).insert(
            url.to_string(),
            EndpointBehavior {
                reachable: true,
                chain_id: self.inner.chain_id,
                gas_price_fails: false,
                reject_with: None,
            },
        );
        self
    }

    /// Register an endpoint that refuses every request.
    pub fn add_unreachable_endpoint(&self, url: &str) -> &Self {
        self.add_endpoint(url);
        self.set_reachable(url, false);
        self
    }

    fn update_endpoint(&self, url: &str, f: impl FnOnce(&mut EndpointBehavior)) {
        if let Some(behavior) = lock(&self.inner.endpoints).get_mut(url) {
            f(behavior);
        }
    }

    pub fn set_reachable(&self, url: &str, reachable: bool) {
        self.update_endpoint(url, |b| b.reachable = reachable);
    }

    /// Make an endpoint report a different chain ID.
    pub fn set_endpoint_chain_id(&self, url: &str, chain_id: u64) {
        self.update_endpoint(url, |b| b.chain_id = chain_id);
    }

    /// Make `eth_gasPrice` fail on an endpoint while everything else works.
    pub fn fail_gas_price(&self, url: &str) {
        self.update_endpoint(url, |b| b.gas_price_fails = true);
    }

    /// Make an endpoint reject every broadcast with a JSON-RPC error.
    pub fn reject_submissions(&self, url: &str, code: i64, message: &str) {
        let message = message.to_string();
        self.update_endpoint(url, |b| b.reject_with = Some((code, message)));
    }

    pub fn set_gas_price(&self, gas_price: u128) {
        lock(&self.inner.ledger).gas_price = gas_price;
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        lock(&self.inner.ledger).balances.insert(address, balance);
    }

    pub fn balance_of(&self, address: Address) -> U256 {
        lock(&self.inner.ledger)
            .balances
            .get(&address)
            .copied()
            .unwrap_or_default()
    }

    /// When held, broadcasts stay pending until [`MockNetwork::mine`].
    pub fn hold_inclusion(&self, hold: bool) {
        lock(&self.inner.ledger).auto_mine = !hold;
    }

    /// Include every pending transaction, one block each.
    pub fn mine(&self) {
        let mut ledger = lock(&self.inner.ledger);
        let pending = std::mem::take(&mut ledger.pending);
        for tx in &pending {
            ledger.include(tx);
        }
    }

    /// Advance the head by `blocks` empty blocks.
    pub fn advance_head(&self, blocks: u64) {
        lock(&self.inner.ledger).head += blocks;
    }

    /// Connections opened so far, across all endpoints.
    pub fn opens(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    /// RPC calls made so far, across all handles.
    pub fn rpc_calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// Every transaction accepted for broadcast, in order.
    pub fn sent_transfers(&self) -> Vec<SignedTransfer> {
        lock(&self.inner.ledger).sent.clone()
    }

    pub fn connector(&self) -> MockConnector {
        MockConnector {
            network: self.clone(),
        }
    }
}

/// [`Connector`] over a [`MockNetwork`].
#[derive(Debug, Clone)]
pub struct MockConnector {
    network: MockNetwork,
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, endpoint: &NetworkEndpoint) -> BlockchainResult<Arc<dyn RpcHandle>> {
        self.network.inner.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockHandle {
            url: endpoint.url.clone(),
            inner: self.network.inner.clone(),
        }))
    }
}

/// Handle to one mock endpoint.
#[derive(Debug)]
pub struct MockHandle {
    url: String,
    inner: Arc<MockInner>,
}

impl MockHandle {
    fn behavior(&self) -> BlockchainResult<EndpointBehavior> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.inner.endpoints).get(&self.url) {
            Some(b) if b.reachable => Ok(b.clone()),
            _ => Err(BlockchainError::Rpc(format!(
                "error sending request for url ({}): connection refused",
                self.url
            ))),
        }
    }
}

#[async_trait]
impl RpcHandle for MockHandle {
    fn url(&self) -> &str {
        &self.url
    }

    async fn block_number(&self) -> BlockchainResult<u64> {
        self.behavior()?;
        Ok(lock(&self.inner.ledger).head)
    }

    async fn chain_id(&self) -> BlockchainResult<u64> {
        Ok(self.behavior()?.chain_id)
    }

    async fn balance(&self, address: Address) -> BlockchainResult<U256> {
        self.behavior()?;
        Ok(lock(&self.inner.ledger)
            .balances
            .get(&address)
            .copied()
            .unwrap_or_default())
    }

    async fn gas_price(&self) -> BlockchainResult<u128> {
        if self.behavior()?.gas_price_fails {
            return Err(BlockchainError::Rejected {
                code: -32601,
                message: "the method eth_gasPrice does not exist/is not available".to_string(),
            });
        }
        Ok(lock(&self.inner.ledger).gas_price)
    }

    async fn pending_nonce(&self, address: Address) -> BlockchainResult<u64> {
        self.behavior()?;
        Ok(lock(&self.inner.ledger)
            .nonces
            .get(&address)
            .copied()
            .unwrap_or_default())
    }

    async fn send_raw(&self, tx: &SignedTransfer) -> BlockchainResult<TxHash> {
        let behavior = self.behavior()?;
        if let Some((code, message)) = behavior.reject_with {
            return Err(BlockchainError::Rejected { code, message });
        }

        let mut ledger = lock(&self.inner.ledger);
        let expected_nonce = ledger.nonces.get(&tx.from).copied().unwrap_or_default();
        if tx.nonce != expected_nonce {
            return Err(BlockchainError::Rejected {
                code: -32000,
                message: format!("nonce too low: next nonce {}, tx nonce {}", expected_nonce, tx.nonce),
            });
        }

        let max_cost = tx.value + U256::from(tx.gas_price) * U256::from(tx.gas_limit);
        let balance = ledger.balances.get(&tx.from).copied().unwrap_or_default();
        if balance < max_cost {
            return Err(BlockchainError::Rejected {
                code: -32000,
                message: "insufficient funds for gas * price + value".to_string(),
            });
        }

        ledger.balances.insert(tx.from, balance - max_cost);
        let to_balance = ledger.balances.get(&tx.to).copied().unwrap_or_default();
        ledger.balances.insert(tx.to, to_balance + tx.value);
        ledger.nonces.insert(tx.from, expected_nonce + 1);
        ledger.sent.push(tx.clone());

        if ledger.auto_mine {
            ledger.include(tx);
        } else {
            ledger.pending.push(tx.clone());
        }

        Ok(tx.hash)
    }

    async fn receipt(&self, tx_hash: TxHash) -> BlockchainResult<Option<InclusionReceipt>> {
        self.behavior()?;
        Ok(lock(&self.inner.ledger).receipts.get(&tx_hash).cloned())
    }
}
