//! Disbursement request and result types.

use alloy::primitives::{Address, TxHash, U256};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::blockchain::units::{ether_to_wei, gwei_to_wei};
use crate::config::validation::is_address;
use crate::disbursement::error::{DisbursementError, DisbursementResult};
use crate::disbursement::estimator::PayoutEstimate;

/// A requested value transfer out of the custodial account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// Destination as supplied by the caller; checked by [`TransferRequest::validate`].
    pub to: String,
    /// Amount in wei.
    pub amount: U256,
    /// Gas price override in wei.
    pub gas_price: Option<u128>,
}

impl TransferRequest {
    pub fn new(to: impl Into<String>, amount: U256) -> Self {
        Self {
            to: to.into(),
            amount,
            gas_price: None,
        }
    }

    /// Build from decimal ether and optional gwei amounts.
    pub fn from_ether(
        to: impl Into<String>,
        amount_eth: f64,
        gas_price_gwei: Option<f64>,
    ) -> DisbursementResult<Self> {
        if !amount_eth.is_finite() || amount_eth <= 0.0 {
            return Err(DisbursementError::Validation(format!(
                "amount must be a positive number, got {}",
                amount_eth
            )));
        }
        let amount = ether_to_wei(amount_eth).ok_or_else(|| {
            DisbursementError::Validation(format!("amount {} is not representable", amount_eth))
        })?;

        let gas_price = match gas_price_gwei {
            Some(gwei) if gwei.is_finite() && gwei > 0.0 => gwei_to_wei(gwei),
            Some(gwei) => {
                return Err(DisbursementError::Validation(format!(
                    "gasPriceGwei must be a positive number, got {}",
                    gwei
                )))
            }
            None => None,
        };

        Ok(Self {
            to: to.into(),
            amount,
            gas_price,
        })
    }

    pub fn with_gas_price(mut self, gas_price: u128) -> Self {
        self.gas_price = Some(gas_price);
        self
    }

    /// Check the request without touching the network, returning the parsed
    /// destination.
    pub fn validate(&self) -> DisbursementResult<Address> {
        let destination = parse_destination(&self.to)?;
        if self.amount.is_zero() {
            return Err(DisbursementError::Validation(
                "amount must be greater than zero".to_string(),
            ));
        }
        if self.gas_price == Some(0) {
            return Err(DisbursementError::Validation(
                "gas price override must be greater than zero".to_string(),
            ));
        }
        Ok(destination)
    }
}

/// Parse a `0x`-prefixed, 42-character address.
pub fn parse_destination(to: &str) -> DisbursementResult<Address> {
    let to = to.trim();
    if !is_address(to) {
        return Err(DisbursementError::Validation(format!(
            "invalid destination address '{}'",
            to
        )));
    }
    to.parse()
        .map_err(|_| DisbursementError::Validation(format!("invalid destination address '{}'", to)))
}

/// A transfer the network reported as included. Never partial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub gas_used: u64,
    pub effective_gas_price: u128,
    /// `gas_used * effective_gas_price`.
    pub fee_paid: U256,
    /// False when the transfer was included but reverted.
    pub success: bool,
    pub to: Address,
    pub amount: U256,
}

/// Liquid balance of the custodial account at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub account: Address,
    /// Balance in wei.
    pub available: U256,
    /// Endpoint the balance was read from.
    pub endpoint: String,
}

/// Outcome of a balance gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDecision {
    pub sufficient: bool,
    pub available: U256,
    /// Amount plus reserve.
    pub required: U256,
}

impl GateDecision {
    /// How much is missing; zero when sufficient.
    pub fn shortfall(&self) -> U256 {
        self.required.saturating_sub(self.available)
    }
}

/// Per-call dispatch controls.
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// Overrides the configured confirmation timeout.
    pub confirmation_timeout: Option<Duration>,
    /// Cancels the inclusion wait. A broadcast already sent is not recalled.
    pub cancel: Option<CancellationToken>,
}

impl DispatchOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// What `simulate_then_pay` did.
#[derive(Debug, Clone, PartialEq)]
pub enum DisbursementOutcome {
    /// The payout was transferred and included.
    Paid {
        estimate: PayoutEstimate,
        result: TransferResult,
    },
    /// Funds did not cover the payout; nothing was sent.
    Simulated {
        estimate: PayoutEstimate,
        available: U256,
        shortfall: U256,
    },
}

impl DisbursementOutcome {
    pub fn estimate(&self) -> &PayoutEstimate {
        match self {
            Self::Paid { estimate, .. } | Self::Simulated { estimate, .. } => estimate,
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, Self::Simulated { .. })
    }
}
