//! Disbursement core.
//!
//! # Data Flow
//! ```text
//! TransferRequest / principal
//!     → estimator.rs (payout sizing, disbursements only)
//!     → gate.rs (live balance vs amount + fee reserve)
//!     → dispatcher.rs (sign, broadcast, await inclusion)
//!     → TransferResult / DisbursementOutcome
//! ```

pub mod dispatcher;
pub mod error;
pub mod estimator;
pub mod gate;
pub mod types;

pub use dispatcher::TransactionDispatcher;
pub use error::{DisbursementError, DisbursementResult};
pub use estimator::{FixedBonusEstimator, PayoutEstimate, PayoutEstimator, RandomPayoutEstimator};
pub use gate::BalanceGate;
pub use types::{
    BalanceSnapshot, DisbursementOutcome, DispatchOptions, GateDecision, TransferRequest,
    TransferResult,
};
