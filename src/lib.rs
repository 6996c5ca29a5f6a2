//! Treasury disbursement service library.
//!
//! Moves funds out of a single custodial account on an EVM network through a
//! set of interchangeable JSON-RPC endpoints, failing over between them and
//! gating every transfer on the live balance.

pub mod blockchain;
pub mod config;
pub mod disbursement;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::schema::ServiceConfig;
pub use disbursement::TransactionDispatcher;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
