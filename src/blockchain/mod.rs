//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! Configured RPC endpoints
//!     → pool.rs (ordered candidates, rotation)
//!     → client.rs (one handle per endpoint, every call time-bounded)
//!     → connection.rs (single live connection, failover, account binding)
//!     → transaction.rs (nonce sync, local signing, inclusion checks)
//! ```
//!
//! # Security Constraints
//! - Private keys ONLY from environment variables
//! - Never log private keys or sensitive data
//! - All RPC calls have configurable timeouts
//! - Graceful degradation when every endpoint is unreachable

pub mod client;
pub mod connection;
pub mod mock;
pub mod pool;
pub mod transaction;
pub mod types;
pub mod units;
pub mod wallet;

pub use client::{AlloyConnector, Connector, RpcHandle};
pub use connection::{ConnectionManager, ConnectionStatus, LiveConnection};
pub use pool::{EndpointPool, NetworkEndpoint};
pub use types::{BlockchainError, BlockchainResult, ConfirmationStatus, InclusionReceipt};
pub use wallet::Wallet;
