//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Comma-separated endpoint list overriding `network.endpoints`.
pub const RPC_URLS_ENV_VAR: &str = "DISBURSER_RPC_URLS";
pub const TREASURY_ENV_VAR: &str = "DISBURSER_TREASURY_ADDRESS";
pub const CHAIN_ID_ENV_VAR: &str = "DISBURSER_CHAIN_ID";
/// Port overriding the port half of `listener.bind_address`.
pub const PORT_ENV_VAR: &str = "PORT";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Env { var: &'static str, value: String },
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Env { var, value } => {
                write!(f, "Invalid value '{}' for environment variable {}", value, var)
            }
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load configuration from a TOML file, apply process environment
/// overrides, and validate.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: ServiceConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;
    finish(config, |var| std::env::var(var).ok())
}

/// Defaults plus environment overrides, for running without a file.
pub fn load_from_env() -> Result<ServiceConfig, ConfigError> {
    finish(ServiceConfig::default(), |var| std::env::var(var).ok())
}

fn finish<F>(mut config: ServiceConfig, lookup: F) -> Result<ServiceConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    apply_env_overrides(&mut config, lookup)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply environment overrides through `lookup`. Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut ServiceConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

    if let Some(urls) = get(RPC_URLS_ENV_VAR) {
        config.network.endpoints = urls
            .split(',')
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(String::from)
            .collect();
    }

    if let Some(treasury) = get(TREASURY_ENV_VAR) {
        config.account.treasury_address = treasury.trim().to_string();
    }

    if let Some(chain_id) = get(CHAIN_ID_ENV_VAR) {
        config.network.chain_id = chain_id.trim().parse().map_err(|_| ConfigError::Env {
            var: CHAIN_ID_ENV_VAR,
            value: chain_id.clone(),
        })?;
    }

    if let Some(port) = get(PORT_ENV_VAR) {
        let port: u16 = port.trim().parse().map_err(|_| ConfigError::Env {
            var: PORT_ENV_VAR,
            value: port.clone(),
        })?;
        let host = config
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.listener.bind_address = format!("{}:{}", host, port);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServiceConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                (RPC_URLS_ENV_VAR, "http://a:8545, http://b:8545,"),
                (TREASURY_ENV_VAR, "0x0fF31D4cdCE8B3f7929c04EbD4cd852608DC09f4"),
                (CHAIN_ID_ENV_VAR, "31337"),
                (PORT_ENV_VAR, "3000"),
            ]),
        )
        .unwrap();

        assert_eq!(config.network.endpoints, vec!["http://a:8545", "http://b:8545"]);
        assert_eq!(config.network.chain_id, 31337);
        assert_eq!(config.listener.bind_address, "0.0.0.0:3000");
        assert!(finish(config, env(&[])).is_ok());
    }

    #[test]
    fn test_empty_values_ignored() {
        let mut config = ServiceConfig::default();
        apply_env_overrides(&mut config, env(&[(RPC_URLS_ENV_VAR, "  ")])).unwrap();
        assert_eq!(config.network.endpoints.len(), 5);
    }

    #[test]
    fn test_bad_chain_id() {
        let mut config = ServiceConfig::default();
        let err = apply_env_overrides(&mut config, env(&[(CHAIN_ID_ENV_VAR, "mainnet")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: CHAIN_ID_ENV_VAR, .. }));
    }

    #[test]
    fn test_validation_reported() {
        let err = finish(ServiceConfig::default(), env(&[])).unwrap_err();
        assert!(err.to_string().contains("treasury_address"));
    }
}
