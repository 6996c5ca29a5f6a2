//! Disbursement error taxonomy.

use alloy::primitives::{TxHash, U256};
use thiserror::Error;

use crate::blockchain::types::BlockchainError;
use crate::blockchain::units::wei_to_ether;

/// Why a disbursement request did not produce a result.
#[derive(Debug, Clone, Error)]
pub enum DisbursementError {
    /// The request itself is malformed. Nothing touched the network.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// No endpoint could serve the request.
    #[error("Network unavailable: {0}")]
    Connectivity(#[source] BlockchainError),

    /// Liquid balance does not cover amount plus fee reserve.
    #[error(
        "Insufficient funds: available {} ETH, required {} ETH",
        wei_to_ether(*available),
        wei_to_ether(*required)
    )]
    InsufficientFunds { available: U256, required: U256 },

    /// Signing or broadcast failed; nothing was accepted by the network.
    #[error("Submission failed: {reason}")]
    Submission { reason: String, code: Option<i64> },

    /// Broadcast succeeded but inclusion was not observed in time.
    #[error("Transaction {tx_hash} not confirmed after {waited_secs}s")]
    ConfirmationTimeout {
        tx_hash: TxHash,
        waited_secs: u64,
        cancelled: bool,
    },
}

impl DisbursementError {
    /// Stable machine-readable category.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Connectivity(_) => "connectivity",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::Submission { .. } => "submission",
            Self::ConfirmationTimeout { .. } => "confirmation_timeout",
        }
    }

    /// Map a failure before any signed bytes left the process, or an
    /// explicit rejection of a broadcast.
    ///
    /// Transport failures here mean the endpoint went away before anything
    /// was sent, so they stay connectivity errors.
    pub(crate) fn from_submission(err: BlockchainError) -> Self {
        match err {
            BlockchainError::Rejected { code, message } => Self::Submission {
                reason: message,
                code: Some(code),
            },
            BlockchainError::Wallet(reason) => Self::Submission { reason, code: None },
            other if other.is_transport() => Self::Connectivity(other),
            other => Self::Submission {
                reason: other.to_string(),
                code: None,
            },
        }
    }
}

impl From<BlockchainError> for DisbursementError {
    fn from(err: BlockchainError) -> Self {
        Self::Connectivity(err)
    }
}

pub type DisbursementResult<T> = Result<T, DisbursementError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            DisbursementError::Validation("bad".into()).category(),
            "validation"
        );
        assert_eq!(
            DisbursementError::from(BlockchainError::Unreachable { attempted: 3 }).category(),
            "connectivity"
        );
        assert_eq!(
            DisbursementError::ConfirmationTimeout {
                tx_hash: TxHash::ZERO,
                waited_secs: 120,
                cancelled: false
            }
            .category(),
            "confirmation_timeout"
        );
    }

    #[test]
    fn test_insufficient_funds_message() {
        let err = DisbursementError::InsufficientFunds {
            available: U256::from(500_000_000_000_000_000u64),
            required: U256::from(1_001_000_000_000_000_000u64),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient funds: available 0.5 ETH, required 1.001 ETH"
        );
    }

    #[test]
    fn test_submission_mapping() {
        let err = DisbursementError::from_submission(BlockchainError::Rejected {
            code: -32000,
            message: "replacement transaction underpriced".into(),
        });
        assert!(matches!(
            err,
            DisbursementError::Submission { code: Some(-32000), .. }
        ));

        let err = DisbursementError::from_submission(BlockchainError::Timeout(10));
        assert_eq!(err.category(), "connectivity");
    }
}
