//! Custodial account and transaction signing.
//!
//! # Security
//! - Private keys are loaded ONLY from environment variables
//! - Keys are never logged or serialized
//! - Signing happens locally; endpoints only ever see raw signed bytes

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{keccak256, Address, Bytes};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;

use crate::blockchain::types::{BlockchainError, BlockchainResult, SignedTransfer};

/// Environment variable name for the private key.
pub const PRIVATE_KEY_ENV_VAR: &str = "DISBURSER_PRIVATE_KEY";

/// The custodial account: signing key and chain binding.
///
/// Nonces are not tracked here; every build reads the pending count.
#[derive(Clone)]
pub struct Wallet {
    /// The underlying signer (private key).
    signer: PrivateKeySigner,
    /// Chain ID for EIP-155 replay protection.
    chain_id: u64,
}

impl Wallet {
    /// Create a wallet from a hex-encoded private key string.
    ///
    /// # Arguments
    /// * `private_key_hex` - Hex string (with or without 0x prefix)
    /// * `chain_id` - Chain ID for transaction signing
    pub fn from_private_key(private_key_hex: &str, chain_id: u64) -> BlockchainResult<Self> {
        let key_hex = private_key_hex.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| BlockchainError::Wallet(format!("Invalid private key format: {}", e)))?;

        tracing::info!(
            address = %signer.address(),
            chain_id = chain_id,
            "Wallet initialized"
        );

        Ok(Self { signer, chain_id })
    }

    /// Load wallet from environment variable.
    ///
    /// Reads `DISBURSER_PRIVATE_KEY` from environment.
    pub fn from_env(chain_id: u64) -> BlockchainResult<Self> {
        let private_key = std::env::var(PRIVATE_KEY_ENV_VAR).map_err(|_| {
            BlockchainError::Wallet(format!(
                "Environment variable {} not set",
                PRIVATE_KEY_ENV_VAR
            ))
        })?;

        Self::from_private_key(&private_key, chain_id)
    }

    /// Get the wallet's address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Get the chain ID this wallet is configured for.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Sign a fully populated transaction request.
    ///
    /// The request must carry `to`, `value`, `nonce`, `gas_price` and
    /// `gas_limit`; the chain ID is forced to the wallet's own.
    pub async fn sign_transfer(&self, tx: TransactionRequest) -> BlockchainResult<SignedTransfer> {
        let to = tx
            .to
            .and_then(|kind| kind.to().copied())
            .ok_or_else(|| BlockchainError::Wallet("Transfer has no destination".to_string()))?;
        let value = tx.value.unwrap_or_default();
        let (nonce, gas_price, gas_limit) = match (tx.nonce, tx.gas_price, tx.gas) {
            (Some(n), Some(p), Some(g)) => (n, p, g),
            _ => {
                return Err(BlockchainError::Wallet(
                    "Transfer is missing nonce, gas price or gas limit".to_string(),
                ))
            }
        };

        let tx = tx.with_from(self.address()).with_chain_id(self.chain_id);
        let signer = EthereumWallet::from(self.signer.clone());
        let envelope = tx
            .build(&signer)
            .await
            .map_err(|e| BlockchainError::Wallet(format!("Signing failed: {}", e)))?;

        let raw = Bytes::from(envelope.encoded_2718());
        Ok(SignedTransfer {
            hash: keccak256(&raw),
            raw,
            from: self.address(),
            to,
            value,
            nonce,
            gas_price,
            gas_limit,
        })
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address())
            .field("chain_id", &self.chain_id)
            .finish()
    }
}
