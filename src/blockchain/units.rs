//! Conversions between display units (ether, gwei) and wei.

use alloy::primitives::utils::{format_ether, parse_ether};
use alloy::primitives::U256;

/// Wei per gwei.
pub const GWEI: u128 = 1_000_000_000;

/// Convert a decimal ether amount to wei.
///
/// Returns `None` for NaN, infinities and negative values. Precision beyond
/// 18 decimals is truncated by formatting.
pub fn ether_to_wei(eth: f64) -> Option<U256> {
    if !eth.is_finite() || eth < 0.0 {
        return None;
    }
    parse_ether(&format!("{:.18}", eth)).ok()
}

/// Convert wei to a decimal ether amount for display.
pub fn wei_to_ether(wei: U256) -> f64 {
    format_ether(wei).parse().unwrap_or(f64::MAX)
}

/// Convert a decimal gwei amount to wei.
pub fn gwei_to_wei(gwei: f64) -> Option<u128> {
    if !gwei.is_finite() || gwei < 0.0 {
        return None;
    }
    Some((gwei * GWEI as f64).round() as u128)
}
