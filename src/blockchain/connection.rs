//! Connection manager with endpoint failover.
//!
//! # State Machine
//! ```text
//! DISCONNECTED ──probe ok on some candidate──▶ CONNECTED
//! CONNECTED ──probe failed / read failed──▶ DISCONNECTED
//! ```
//!
//! The live connection is published as an immutable `Arc<LiveConnection>`
//! and replaced wholesale on failover. Holders keep a usable snapshot; the
//! generation counter tells them whether it is still the current one.
//!
//! There is no background reconnect loop: a dead network is only retried
//! when the next caller asks for a connection.

use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::blockchain::client::{Connector, RpcHandle};
use crate::blockchain::pool::{EndpointPool, NetworkEndpoint};
use crate::blockchain::types::{BlockchainError, BlockchainResult};
use crate::blockchain::wallet::Wallet;
use crate::observability::metrics;

/// A probed connection with the signing identity bound to it.
pub struct LiveConnection {
    endpoint: NetworkEndpoint,
    index: usize,
    generation: u64,
    handle: Arc<dyn RpcHandle>,
    wallet: Wallet,
}

impl LiveConnection {
    pub fn endpoint(&self) -> &NetworkEndpoint {
        &self.endpoint
    }

    /// Position of the endpoint in the pool.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn rpc(&self) -> &dyn RpcHandle {
        self.handle.as_ref()
    }

    /// The account bound to this connection.
    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }
}

impl std::fmt::Debug for LiveConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveConnection")
            .field("endpoint", &self.endpoint.display_url())
            .field("index", &self.index)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Side-effect-free view of the connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub endpoint: Option<String>,
    pub index: Option<usize>,
    pub generation: u64,
    pub last_known_good: usize,
    pub pool_size: usize,
}

/// Owns the single live connection and the signing identity.
pub struct ConnectionManager {
    pool: EndpointPool,
    connector: Arc<dyn Connector>,
    wallet: Wallet,
    state: ArcSwapOption<LiveConnection>,
    last_known_good: AtomicUsize,
    generation: AtomicU64,
    /// Serializes probe + failover so concurrent callers cannot race a swap.
    failover: Mutex<()>,
}

impl ConnectionManager {
    pub fn new(pool: EndpointPool, connector: Arc<dyn Connector>, wallet: Wallet) -> Self {
        Self {
            pool,
            connector,
            wallet,
            state: ArcSwapOption::empty(),
            last_known_good: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
            failover: Mutex::new(()),
        }
    }

    /// Return a live connection, failing over across the pool if needed.
    pub async fn acquire(&self) -> BlockchainResult<Arc<LiveConnection>> {
        let _guard = self.failover.lock().await;

        if let Some(current) = self.state.load_full() {
            match current.rpc().block_number().await {
                Ok(_) => return Ok(current),
                Err(e) => {
                    tracing::warn!(
                        endpoint = %current.endpoint.display_url(),
                        error = %e,
                        "Liveness probe failed, reconnecting"
                    );
                    metrics::record_probe_failure(current.index);
                    self.state.store(None);
                }
            }
        }

        self.connect().await
    }

    /// Sweep the pool once from the last-known-good index.
    async fn connect(&self) -> BlockchainResult<Arc<LiveConnection>> {
        let start = self.last_known_good.load(Ordering::SeqCst);
        let expected_chain = self.wallet.chain_id();

        for (index, endpoint) in self.pool.rotation(start) {
            tracing::debug!(endpoint = %endpoint.display_url(), index, "Trying RPC endpoint");

            match self.try_endpoint(endpoint, expected_chain).await {
                Ok((handle, block)) => {
                    let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    let live = Arc::new(LiveConnection {
                        endpoint: endpoint.clone(),
                        index,
                        generation,
                        handle,
                        wallet: self.wallet.clone(),
                    });
                    self.state.store(Some(live.clone()));
                    self.last_known_good.store(index, Ordering::SeqCst);
                    metrics::record_active_endpoint(Some(index));
                    if index != start {
                        metrics::record_failover(start, index);
                    }

                    tracing::info!(
                        endpoint = %endpoint.display_url(),
                        index,
                        block,
                        generation,
                        account = %self.wallet.address(),
                        "Connected to RPC endpoint"
                    );
                    return Ok(live);
                }
                Err(e) => {
                    metrics::record_probe_failure(index);
                    tracing::warn!(
                        endpoint = %endpoint.display_url(),
                        index,
                        error = %e,
                        "RPC endpoint failed"
                    );
                }
            }
        }

        self.state.store(None);
        metrics::record_active_endpoint(None);
        tracing::error!(
            attempted = self.pool.len(),
            "All RPC endpoints failed, will retry on next request"
        );
        Err(BlockchainError::Unreachable {
            attempted: self.pool.len(),
        })
    }

    async fn try_endpoint(
        &self,
        endpoint: &NetworkEndpoint,
        expected_chain: u64,
    ) -> BlockchainResult<(Arc<dyn RpcHandle>, u64)> {
        let handle = self.connector.open(endpoint).await?;
        let block = handle.block_number().await?;
        let chain_id = handle.chain_id().await?;
        if chain_id != expected_chain {
            return Err(BlockchainError::ChainMismatch {
                expected: expected_chain,
                actual: chain_id,
            });
        }
        Ok((handle, block))
    }

    /// Drop `conn` if it is still the live connection.
    ///
    /// Called when a read through an otherwise live handle fails, so the
    /// next `acquire` starts a fresh sweep instead of trusting it.
    pub fn invalidate(&self, conn: &LiveConnection) {
        if let Some(live) = self.state.load_full() {
            if live.generation == conn.generation {
                self.state.store(None);
                metrics::record_active_endpoint(None);
                tracing::warn!(
                    endpoint = %conn.endpoint.display_url(),
                    generation = conn.generation,
                    "Connection invalidated"
                );
            }
        }
    }

    /// The published live connection, without probing it.
    pub fn current(&self) -> Option<Arc<LiveConnection>> {
        self.state.load_full()
    }

    /// Whether `conn` is still the published live connection.
    pub fn is_current(&self, conn: &LiveConnection) -> bool {
        self.current()
            .map(|live| live.generation == conn.generation)
            .unwrap_or(false)
    }

    pub fn is_live(&self) -> bool {
        self.current().is_some()
    }

    /// Index of the endpoint that last passed a probe.
    pub fn last_known_good(&self) -> usize {
        self.last_known_good.load(Ordering::SeqCst)
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn pool(&self) -> &EndpointPool {
        &self.pool
    }

    pub fn status(&self) -> ConnectionStatus {
        let current = self.current();
        let live = current.as_deref();
        ConnectionStatus {
            connected: live.is_some(),
            endpoint: live.map(|c| c.endpoint.display_url().to_string()),
            index: live.map(|c| c.index),
            generation: self.generation.load(Ordering::SeqCst),
            last_known_good: self.last_known_good(),
            pool_size: self.pool.len(),
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("pool_size", &self.pool.len())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::mock::MockNetwork;

    const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn manager(network: &MockNetwork, urls: &[&str]) -> ConnectionManager {
        let pool = EndpointPool::new(urls.iter().copied()).unwrap();
        let wallet = Wallet::from_private_key(TEST_PRIVATE_KEY, 1).unwrap();
        ConnectionManager::new(pool, Arc::new(network.connector()), wallet)
    }

    #[tokio::test]
    async fn test_connects_past_unreachable_candidates() {
        let network = MockNetwork::new(1);
        network
            .add_unreachable_endpoint("http://bad1")
            .add_unreachable_endpoint("http://bad2")
            .add_endpoint("http://good");
        let manager = manager(&network, &["http://bad1", "http://bad2", "http://good"]);

        let conn = manager.acquire().await.unwrap();
        assert_eq!(conn.index(), 2);
        assert_eq!(conn.endpoint().url, "http://good");
        assert_eq!(manager.last_known_good(), 2);
        assert!(manager.is_live());
    }

    #[tokio::test]
    async fn test_first_k_unreachable() {
        for k in 0..4 {
            let network = MockNetwork::new(1);
            let urls: Vec<String> = (0..5).map(|i| format!("http://rpc{}", i)).collect();
            for (i, url) in urls.iter().enumerate() {
                if i < k {
                    network.add_unreachable_endpoint(url);
                } else {
                    network.add_endpoint(url);
                }
            }
            let refs: Vec<&str> = urls.iter().map(String::as_str).collect();
            let manager = manager(&network, &refs);

            let conn = manager.acquire().await.unwrap();
            assert_eq!(conn.index(), k);
            assert_eq!(manager.last_known_good(), k);
        }
    }

    #[tokio::test]
    async fn test_all_unreachable() {
        let network = MockNetwork::new(1);
        network
            .add_unreachable_endpoint("http://bad1")
            .add_unreachable_endpoint("http://bad2");
        let manager = manager(&network, &["http://bad1", "http://bad2"]);

        let err = manager.acquire().await.unwrap_err();
        assert!(matches!(err, BlockchainError::Unreachable { attempted: 2 }));
        assert!(!manager.is_live());
        assert!(!manager.status().connected);
        // Each candidate opened exactly once: no hidden retry loop
        assert_eq!(network.opens(), 2);
    }

    #[tokio::test]
    async fn test_reuses_live_connection() {
        let network = MockNetwork::new(1);
        network.add_endpoint("http://a").add_endpoint("http://b");
        let manager = manager(&network, &["http://a", "http://b"]);

        let first = manager.acquire().await.unwrap();
        let second = manager.acquire().await.unwrap();
        assert_eq!(first.generation(), second.generation());
        assert_eq!(network.opens(), 1);
    }

    #[tokio::test]
    async fn test_fails_over_when_live_endpoint_dies() {
        let network = MockNetwork::new(1);
        network.add_endpoint("http://a").add_endpoint("http://b");
        let manager = manager(&network, &["http://a", "http://b"]);

        let first = manager.acquire().await.unwrap();
        assert_eq!(first.index(), 0);

        network.set_reachable("http://a", false);
        let second = manager.acquire().await.unwrap();
        assert_eq!(second.index(), 1);
        assert!(second.generation() > first.generation());
        assert!(!manager.is_current(&first));
        assert!(manager.is_current(&second));
        assert_eq!(manager.last_known_good(), 1);
    }

    #[tokio::test]
    async fn test_sweep_starts_at_last_known_good() {
        let network = MockNetwork::new(1);
        network
            .add_unreachable_endpoint("http://a")
            .add_endpoint("http://b")
            .add_endpoint("http://c");
        let manager = manager(&network, &["http://a", "http://b", "http://c"]);

        let conn = manager.acquire().await.unwrap();
        assert_eq!(conn.index(), 1);

        // a recovers, but the next sweep starts from b
        network.set_reachable("http://a", true);
        manager.invalidate(&conn);
        let conn = manager.acquire().await.unwrap();
        assert_eq!(conn.index(), 1);
    }

    #[tokio::test]
    async fn test_chain_mismatch_skips_candidate() {
        let network = MockNetwork::new(1);
        network.add_endpoint("http://wrong").add_endpoint("http://right");
        network.set_endpoint_chain_id("http://wrong", 5);
        let manager = manager(&network, &["http://wrong", "http://right"]);

        let conn = manager.acquire().await.unwrap();
        assert_eq!(conn.endpoint().url, "http://right");
    }

    #[tokio::test]
    async fn test_invalidate_ignores_stale_generation() {
        let network = MockNetwork::new(1);
        network.add_endpoint("http://a").add_endpoint("http://b");
        let manager = manager(&network, &["http://a", "http://b"]);

        let first = manager.acquire().await.unwrap();
        manager.invalidate(&first);
        let second = manager.acquire().await.unwrap();

        // Invalidating the old snapshot must not drop the new connection
        manager.invalidate(&first);
        assert!(manager.is_current(&second));
    }

    #[tokio::test]
    async fn test_recovers_after_total_outage() {
        let network = MockNetwork::new(1);
        network.add_unreachable_endpoint("http://a");
        let manager = manager(&network, &["http://a"]);

        assert!(manager.acquire().await.is_err());
        network.set_reachable("http://a", true);
        assert!(manager.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_acquire_single_failover() {
        let network = MockNetwork::new(1);
        network.add_unreachable_endpoint("http://a").add_endpoint("http://b");
        let manager = Arc::new(manager(&network, &["http://a", "http://b"]));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.acquire().await.map(|c| c.generation()) })
            })
            .collect();

        let mut generations = Vec::new();
        for task in tasks {
            generations.push(task.await.unwrap().unwrap());
        }
        assert!(generations.iter().all(|g| *g == generations[0]));
        // a once, b once
        assert_eq!(network.opens(), 2);
    }
}
