//! Balance gate: decides whether the custodial account can cover a transfer.

use alloy::primitives::U256;
use std::sync::Arc;

use crate::blockchain::ConnectionManager;
use crate::disbursement::error::{DisbursementError, DisbursementResult};
use crate::disbursement::types::{BalanceSnapshot, GateDecision};

/// Pure sufficiency rule: `available >= required + reserve`.
pub fn decide(available: U256, required: U256, reserve: U256) -> GateDecision {
    let total = required.saturating_add(reserve);
    GateDecision {
        sufficient: available >= total,
        available,
        required: total,
    }
}

/// Reads the live balance through the connection manager. Nothing is cached.
#[derive(Debug, Clone)]
pub struct BalanceGate {
    manager: Arc<ConnectionManager>,
}

impl BalanceGate {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    /// Current liquid balance of the bound account.
    ///
    /// A failed read drops the connection that produced it; the balance is
    /// never assumed to be zero.
    pub async fn snapshot(&self) -> DisbursementResult<BalanceSnapshot> {
        let conn = self.manager.acquire().await?;
        let account = conn.wallet().address();

        match conn.rpc().balance(account).await {
            Ok(available) => Ok(BalanceSnapshot {
                account,
                available,
                endpoint: conn.endpoint().url.clone(),
            }),
            Err(e) => {
                tracing::warn!(
                    endpoint = %conn.endpoint().display_url(),
                    error = %e,
                    "Balance read failed"
                );
                self.manager.invalidate(&conn);
                Err(DisbursementError::Connectivity(e))
            }
        }
    }

    /// Whether the account covers `required` plus `reserve`.
    pub async fn check_sufficient(
        &self,
        required: U256,
        reserve: U256,
    ) -> DisbursementResult<GateDecision> {
        let snapshot = self.snapshot().await?;
        let decision = decide(snapshot.available, required, reserve);

        tracing::debug!(
            account = %snapshot.account,
            available = %decision.available,
            required = %decision.required,
            sufficient = decision.sufficient,
            "Balance gate evaluated"
        );

        Ok(decision)
    }
}
