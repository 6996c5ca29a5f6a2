//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files, and
//! every section has defaults so a minimal file (or none at all) works.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::blockchain::units::{ether_to_wei, gwei_to_wei};

/// Root configuration for the disbursement service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Ledger network and failover endpoints.
    pub network: NetworkConfig,

    /// Custodial account settings (the key itself comes from the environment).
    pub account: AccountConfig,

    /// Dispatch policy.
    pub dispatch: DispatchConfig,

    /// Display currency settings.
    pub display: DisplayConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 64 * 1024,
        }
    }
}

/// Ledger network configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Candidate JSON-RPC endpoints, in failover priority order.
    pub endpoints: Vec<String>,

    /// Chain ID (e.g., 1 for Ethereum mainnet, 31337 for local Anvil).
    pub chain_id: u64,

    /// Per-call RPC timeout in seconds.
    pub rpc_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![
                "https://ethereum-rpc.publicnode.com".to_string(),
                "https://eth.llamarpc.com".to_string(),
                "https://rpc.ankr.com/eth".to_string(),
                "https://1rpc.io/eth".to_string(),
                "https://cloudflare-eth.com".to_string(),
            ],
            chain_id: 1,
            rpc_timeout_secs: 10,
        }
    }
}

impl NetworkConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }
}

/// Custodial account configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AccountConfig {
    /// Default destination for disbursements.
    pub treasury_address: String,
}

/// Dispatch policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Balance (ETH) that must remain after a disbursement, for fees.
    pub fee_reserve_eth: f64,

    /// Gas price (gwei) used when the network fee query fails.
    pub default_gas_price_gwei: f64,

    /// Gas limit for a plain value transfer.
    pub gas_limit: u64,

    /// How long to wait for inclusion before reporting a timeout.
    pub confirmation_timeout_secs: u64,

    /// Receipt polling interval in milliseconds.
    pub poll_interval_ms: u64,

    /// Extra blocks required on top of inclusion.
    pub confirmation_blocks: u32,

    /// Principal (ETH) used when a disbursement request omits it.
    pub default_principal_eth: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            fee_reserve_eth: 0.001,
            default_gas_price_gwei: 30.0,
            gas_limit: 21_000,
            confirmation_timeout_secs: 120,
            poll_interval_ms: 2_000,
            confirmation_blocks: 0,
            default_principal_eth: 10.0,
        }
    }
}

impl DispatchConfig {
    pub fn fee_reserve_wei(&self) -> U256 {
        ether_to_wei(self.fee_reserve_eth).unwrap_or_default()
    }

    pub fn default_gas_price_wei(&self) -> u128 {
        gwei_to_wei(self.default_gas_price_gwei).unwrap_or_default()
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Display currency configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Fixed USD price of one ETH.
    pub usd_rate: f64,

    /// Minimum balance (ETH) reported as "has operating gas".
    pub operating_gas_eth: f64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            usd_rate: 3450.0,
            operating_gas_eth: 0.002,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Overall HTTP request timeout in seconds. Must exceed the
    /// confirmation timeout or callers lose the result of a paid transfer.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 180 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
