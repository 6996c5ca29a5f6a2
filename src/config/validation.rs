//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate endpoint URLs and the treasury address
//! - Validate value ranges (timeouts > 0, amounts finite and non-negative)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use alloy::primitives::Address;
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::ServiceConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("network.endpoints must list at least one endpoint")]
    NoEndpoints,

    #[error("network.endpoints: invalid URL '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("account.treasury_address: '{0}' is not a valid address")]
    InvalidTreasury(String),

    #[error("listener.bind_address: '{0}' is not a socket address")]
    InvalidBindAddress(String),

    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("{field} must be a finite, non-negative number")]
    InvalidAmount { field: &'static str },
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.network.endpoints.is_empty() {
        errors.push(ValidationError::NoEndpoints);
    }
    for url in &config.network.endpoints {
        match url::Url::parse(url.trim()) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https" | "ws" | "wss") => {}
            Ok(parsed) => errors.push(ValidationError::InvalidEndpoint {
                url: url.clone(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            }),
            Err(e) => errors.push(ValidationError::InvalidEndpoint {
                url: url.clone(),
                reason: e.to_string(),
            }),
        }
    }

    if !is_address(&config.account.treasury_address) {
        errors.push(ValidationError::InvalidTreasury(
            config.account.treasury_address.clone(),
        ));
    }

    let positives: [(&'static str, u64); 5] = [
        ("network.rpc_timeout_secs", config.network.rpc_timeout_secs),
        ("dispatch.gas_limit", config.dispatch.gas_limit),
        (
            "dispatch.confirmation_timeout_secs",
            config.dispatch.confirmation_timeout_secs,
        ),
        ("dispatch.poll_interval_ms", config.dispatch.poll_interval_ms),
        ("timeouts.request_secs", config.timeouts.request_secs),
    ];
    for (field, value) in positives {
        if value == 0 {
            errors.push(ValidationError::NotPositive { field });
        }
    }

    let amounts: [(&'static str, f64); 5] = [
        ("dispatch.fee_reserve_eth", config.dispatch.fee_reserve_eth),
        (
            "dispatch.default_gas_price_gwei",
            config.dispatch.default_gas_price_gwei,
        ),
        (
            "dispatch.default_principal_eth",
            config.dispatch.default_principal_eth,
        ),
        ("display.usd_rate", config.display.usd_rate),
        ("display.operating_gas_eth", config.display.operating_gas_eth),
    ];
    for (field, value) in amounts {
        if !value.is_finite() || value < 0.0 {
            errors.push(ValidationError::InvalidAmount { field });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// `0x` followed by 40 hex characters.
pub fn is_address(candidate: &str) -> bool {
    candidate.len() == 42 && candidate.starts_with("0x") && candidate.parse::<Address>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.account.treasury_address = "0x0fF31D4cdCE8B3f7929c04EbD4cd852608DC09f4".to_string();
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_treasury() {
        let config = ServiceConfig::default();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::InvalidTreasury(String::new())]);
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = valid_config();
        config.network.endpoints.clear();
        config.dispatch.gas_limit = 0;
        config.dispatch.fee_reserve_eth = f64::NAN;
        config.listener.bind_address = "nowhere".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::NoEndpoints));
        assert!(errors.contains(&ValidationError::NotPositive {
            field: "dispatch.gas_limit"
        }));
    }

    #[test]
    fn test_bad_endpoint_scheme() {
        let mut config = valid_config();
        config.network.endpoints = vec!["ftp://rpc.example.com".to_string()];
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::InvalidEndpoint { .. }));
    }

    #[test]
    fn test_is_address() {
        assert!(is_address("0x0fF31D4cdCE8B3f7929c04EbD4cd852608DC09f4"));
        assert!(!is_address("0fF31D4cdCE8B3f7929c04EbD4cd852608DC09f4"));
        assert!(!is_address("0x0fF31D4cdCE8B3f7929c04EbD4cd852608DC09"));
        assert!(!is_address("0xZZF31D4cdCE8B3f7929c04EbD4cd852608DC09f4"));
    }
}
