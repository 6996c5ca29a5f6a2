//! Payout estimation.
//!
//! The estimate is a bounded pseudo-random rate applied to a principal; no
//! trading or on-chain simulation takes place.

use rand::Rng;
use serde::Serialize;

/// Base rate before the random bonus.
pub const BASE_RATE: f64 = 0.003;
/// Upper bound (exclusive) of the random bonus.
pub const MAX_BONUS: f64 = 0.002;
/// Cap on the size multiplier.
pub const MAX_SIZE_MULTIPLIER: f64 = 1.5;

/// Estimated payout for a principal, in ether.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutEstimate {
    pub principal: f64,
    pub payout: f64,
    pub rate: f64,
}

/// Strategy for sizing a disbursement.
pub trait PayoutEstimator: Send + Sync {
    fn estimate(&self, principal: f64) -> PayoutEstimate;
}

/// Larger principals earn up to 50% more, growing 10% per 1000 units.
pub fn size_multiplier(principal: f64) -> f64 {
    (1.0 + (principal / 1000.0) * 0.1).min(MAX_SIZE_MULTIPLIER)
}

fn estimate_with_bonus(principal: f64, bonus: f64) -> PayoutEstimate {
    let rate = (BASE_RATE + bonus) * size_multiplier(principal);
    PayoutEstimate {
        principal,
        payout: principal * rate,
        rate,
    }
}

/// Production estimator: bonus drawn uniformly from `[0, MAX_BONUS)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomPayoutEstimator;

impl PayoutEstimator for RandomPayoutEstimator {
    fn estimate(&self, principal: f64) -> PayoutEstimate {
        let bonus = rand::thread_rng().gen_range(0.0..MAX_BONUS);
        estimate_with_bonus(principal, bonus)
    }
}

/// Deterministic estimator with a caller-chosen bonus.
#[derive(Debug, Clone, Copy)]
pub struct FixedBonusEstimator {
    bonus: f64,
}

impl FixedBonusEstimator {
    /// `bonus` is clamped into `[0, MAX_BONUS]`.
    pub fn new(bonus: f64) -> Self {
        let bonus = if bonus.is_finite() {
            bonus.clamp(0.0, MAX_BONUS)
        } else {
            0.0
        };
        Self { bonus }
    }
}

impl PayoutEstimator for FixedBonusEstimator {
    fn estimate(&self, principal: f64) -> PayoutEstimate {
        estimate_with_bonus(principal, self.bonus)
    }
}
