//! Transaction dispatcher.
//!
//! # Pipeline
//! ```text
//! validate → [submission lock] → balance gate → acquire → fee rate
//!     → sign (nonce from pending count) → broadcast → await inclusion
//! ```
//!
//! Disbursements from the custodial account are serialized: the submission
//! lock is held from the balance check until inclusion is observed, so two
//! requests can never both pass the gate on the same funds or race a nonce.
//!
//! Once signed bytes have been handed to an endpoint, the only failure that
//! proves nothing was accepted is an explicit rejection. Any other broadcast
//! error is settled by waiting for the known hash, ending in either a result
//! or `ConfirmationTimeout`.

use alloy::primitives::{Address, TxHash, U256};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};

use crate::blockchain::transaction::{check_inclusion, sign_transfer, TransferPlan};
use crate::blockchain::types::{ConfirmationStatus, InclusionReceipt};
use crate::blockchain::units::ether_to_wei;
use crate::blockchain::{BlockchainError, ConnectionManager, LiveConnection};
use crate::config::DispatchConfig;
use crate::disbursement::error::{DisbursementError, DisbursementResult};
use crate::disbursement::estimator::PayoutEstimator;
use crate::disbursement::gate::BalanceGate;
use crate::disbursement::types::{
    parse_destination, BalanceSnapshot, DisbursementOutcome, DispatchOptions, TransferRequest,
    TransferResult,
};
use crate::observability::metrics;

/// Runs transfers from the custodial account end to end.
pub struct TransactionDispatcher {
    manager: Arc<ConnectionManager>,
    gate: BalanceGate,
    estimator: Arc<dyn PayoutEstimator>,
    policy: DispatchConfig,
    submission: Mutex<()>,
}

impl TransactionDispatcher {
    pub fn new(
        manager: Arc<ConnectionManager>,
        estimator: Arc<dyn PayoutEstimator>,
        policy: DispatchConfig,
    ) -> Self {
        Self {
            gate: BalanceGate::new(manager.clone()),
            manager,
            estimator,
            policy,
            submission: Mutex::new(()),
        }
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn policy(&self) -> &DispatchConfig {
        &self.policy
    }

    /// Current liquid balance of the custodial account.
    pub async fn query_balance(&self) -> DisbursementResult<BalanceSnapshot> {
        self.gate.snapshot().await
    }

    /// Transfer `request.amount` to `request.to` and wait for inclusion.
    pub async fn dispatch(
        &self,
        request: TransferRequest,
        options: DispatchOptions,
    ) -> DisbursementResult<TransferResult> {
        let result = self.run_dispatch(request, options).await;
        metrics::record_dispatch(match &result {
            Ok(_) => "confirmed",
            Err(e) => e.category(),
        });
        result
    }

    async fn run_dispatch(
        &self,
        request: TransferRequest,
        options: DispatchOptions,
    ) -> DisbursementResult<TransferResult> {
        let destination = request.validate()?;

        let _submission = self.submission.lock().await;

        let decision = self
            .gate
            .check_sufficient(request.amount, self.policy.fee_reserve_wei())
            .await?;
        if !decision.sufficient {
            tracing::warn!(
                available = %decision.available,
                required = %decision.required,
                "Transfer refused, insufficient funds"
            );
            return Err(DisbursementError::InsufficientFunds {
                available: decision.available,
                required: decision.required,
            });
        }

        self.submit_and_wait(destination, request.amount, request.gas_price, &options)
            .await
    }

    /// Estimate a payout for `principal` and pay it to `destination` if the
    /// account can cover it; otherwise report the estimate as simulated.
    pub async fn simulate_then_pay(
        &self,
        principal: f64,
        destination: &str,
        options: DispatchOptions,
    ) -> DisbursementResult<DisbursementOutcome> {
        let outcome = self.run_disbursement(principal, destination, options).await;
        metrics::record_dispatch(match &outcome {
            Ok(DisbursementOutcome::Paid { .. }) => "confirmed",
            Ok(DisbursementOutcome::Simulated { .. }) => "simulated",
            Err(e) => e.category(),
        });
        outcome
    }

    async fn run_disbursement(
        &self,
        principal: f64,
        destination: &str,
        options: DispatchOptions,
    ) -> DisbursementResult<DisbursementOutcome> {
        if !principal.is_finite() || principal <= 0.0 {
            return Err(DisbursementError::Validation(format!(
                "principal must be a positive number, got {}",
                principal
            )));
        }
        let to = parse_destination(destination)?;

        let estimate = self.estimator.estimate(principal);
        let payout = ether_to_wei(estimate.payout)
            .filter(|wei| !wei.is_zero())
            .ok_or_else(|| {
                DisbursementError::Validation(format!(
                    "estimated payout {} ETH is too small to transfer",
                    estimate.payout
                ))
            })?;

        tracing::info!(
            principal = estimate.principal,
            payout = estimate.payout,
            rate = estimate.rate,
            destination = %to,
            "Payout estimated"
        );

        let _submission = self.submission.lock().await;

        let decision = self
            .gate
            .check_sufficient(payout, self.policy.fee_reserve_wei())
            .await?;
        if !decision.sufficient {
            tracing::info!(
                available = %decision.available,
                required = %decision.required,
                "Insufficient funds, payout simulated"
            );
            return Ok(DisbursementOutcome::Simulated {
                estimate,
                available: decision.available,
                shortfall: decision.shortfall(),
            });
        }

        let result = self.submit_and_wait(to, payout, None, &options).await?;
        Ok(DisbursementOutcome::Paid { estimate, result })
    }

    /// Steps after the gate. Caller holds the submission lock.
    async fn submit_and_wait(
        &self,
        to: Address,
        value: U256,
        gas_price_override: Option<u128>,
        options: &DispatchOptions,
    ) -> DisbursementResult<TransferResult> {
        let conn = self.manager.acquire().await?;

        let gas_price = match gas_price_override {
            Some(price) => price,
            None => self.network_gas_price(&conn).await,
        };

        let plan = TransferPlan {
            to,
            value,
            gas_price,
            gas_limit: self.policy.gas_limit,
        };
        let signed = sign_transfer(&conn, plan)
            .await
            .map_err(|e| self.submission_failed(&conn, e))?;

        // Never broadcast through a handle that has been swapped out
        let conn = if self.manager.is_current(&conn) {
            conn
        } else {
            tracing::debug!("Connection replaced while signing, re-acquiring");
            self.manager.acquire().await?
        };

        let tx_hash = match conn.rpc().send_raw(&signed).await {
            Ok(hash) => hash,
            Err(e @ BlockchainError::Rejected { .. }) => {
                return Err(self.submission_failed(&conn, e));
            }
            Err(e) => {
                // The node may have accepted the bytes before the error came
                // back; only inclusion (or its absence) settles it.
                tracing::warn!(
                    tx_hash = %signed.hash,
                    endpoint = %conn.endpoint().display_url(),
                    error = %e,
                    "Broadcast outcome unknown, waiting for inclusion"
                );
                if e.is_transport() {
                    self.manager.invalidate(&conn);
                }
                signed.hash
            }
        };

        tracing::info!(
            tx_hash = %tx_hash,
            to = %to,
            value = %value,
            nonce = signed.nonce,
            gas_price = gas_price,
            endpoint = %conn.endpoint().display_url(),
            "Transfer broadcast"
        );

        let receipt = self.await_inclusion(tx_hash, options).await?;

        if !receipt.success {
            tracing::warn!(tx_hash = %tx_hash, block = receipt.block_number, "Transfer reverted");
        } else {
            tracing::info!(
                tx_hash = %tx_hash,
                block = receipt.block_number,
                gas_used = receipt.gas_used,
                "Transfer confirmed"
            );
        }

        Ok(TransferResult {
            tx_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price,
            fee_paid: U256::from(receipt.gas_used) * U256::from(receipt.effective_gas_price),
            success: receipt.success,
            to,
            amount: value,
        })
    }

    /// Network gas price, or the configured default when the query fails.
    async fn network_gas_price(&self, conn: &LiveConnection) -> u128 {
        let fallback = self.policy.default_gas_price_wei();
        match conn.rpc().gas_price().await {
            Ok(price) if price > 0 => price,
            Ok(_) => {
                tracing::warn!(fallback, "Endpoint reported zero gas price, using default");
                fallback
            }
            Err(e) => {
                tracing::warn!(error = %e, fallback, "Gas price query failed, using default");
                fallback
            }
        }
    }

    fn submission_failed(
        &self,
        conn: &LiveConnection,
        err: BlockchainError,
    ) -> DisbursementError {
        tracing::error!(
            endpoint = %conn.endpoint().display_url(),
            error = %err,
            "Transfer submission failed"
        );
        if err.is_transport() {
            self.manager.invalidate(conn);
        }
        DisbursementError::from_submission(err)
    }

    /// Poll until `tx_hash` is confirmed, the deadline passes, or the wait
    /// is cancelled. Read failures are retried on a fresh connection.
    async fn await_inclusion(
        &self,
        tx_hash: TxHash,
        options: &DispatchOptions,
    ) -> DisbursementResult<InclusionReceipt> {
        let limit = options
            .confirmation_timeout
            .unwrap_or_else(|| self.policy.confirmation_timeout());
        let cancel = options.cancel.clone().unwrap_or_default();
        let required = self.policy.confirmation_blocks;
        let started = Instant::now();

        let wait = async {
            let mut ticker = interval(self.policy.poll_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                match self.poll_inclusion(tx_hash, required).await {
                    Ok(ConfirmationStatus::Confirmed(receipt)) => return receipt,
                    Ok(ConfirmationStatus::Pending) => {
                        tracing::debug!(tx_hash = %tx_hash, "Transaction pending");
                    }
                    Ok(ConfirmationStatus::Confirming { current, required }) => {
                        tracing::debug!(
                            tx_hash = %tx_hash,
                            confirmations = current,
                            required,
                            "Waiting for confirmations"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(tx_hash = %tx_hash, error = %e, "Receipt poll failed");
                    }
                }
            }
        };

        let timed_out = |cancelled: bool| DisbursementError::ConfirmationTimeout {
            tx_hash,
            waited_secs: started.elapsed().as_secs(),
            cancelled,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!(tx_hash = %tx_hash, "Inclusion wait cancelled");
                Err(timed_out(true))
            }
            result = timeout(limit, wait) => match result {
                Ok(receipt) => Ok(receipt),
                Err(_) => {
                    tracing::warn!(
                        tx_hash = %tx_hash,
                        timeout_secs = limit.as_secs(),
                        "Transaction not confirmed before deadline"
                    );
                    Err(timed_out(false))
                }
            },
        }
    }

    async fn poll_inclusion(
        &self,
        tx_hash: TxHash,
        required: u32,
    ) -> crate::blockchain::BlockchainResult<ConfirmationStatus> {
        let conn = self.manager.acquire().await?;
        let status = check_inclusion(conn.rpc(), tx_hash, required).await;
        if status.is_err() {
            self.manager.invalidate(&conn);
        }
        status
    }
}

impl std::fmt::Debug for TransactionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionDispatcher")
            .field("account", &self.manager.wallet().address())
            .field("policy", &self.policy)
            .finish()
    }
}
