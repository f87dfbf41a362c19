//! Configuration validation

use crate::{AppConfig, ChainConfig, ConfigError, Environment, Result};

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate the entire application configuration
///
/// Every problem is collected and reported in one error.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let mut errors = Vec::new();

    // Service
    if config.service.validator_id.trim().is_empty() {
        errors.push(ValidationError::new(
            "service.validator_id",
            "validator id is required",
        ));
    }

    if let Err(e) = validate_log_level(&config.service.log_level) {
        errors.push(ValidationError::new("service.log_level", e));
    }

    if config.service.proof_version.is_empty() {
        errors.push(ValidationError::new(
            "service.proof_version",
            "proof version is required",
        ));
    }

    // Database
    if config.database.required || !config.database.url.is_empty() {
        if let Err(e) = validate_database_url(&config.database.url) {
            errors.push(ValidationError::new("database.url", e));
        }
    }

    if config.database.max_connections == 0 {
        errors.push(ValidationError::new(
            "database.max_connections",
            "must be greater than 0",
        ));
    }

    if config.service.environment == Environment::Mainnet && !config.database.required {
        errors.push(ValidationError::new(
            "database.required",
            "mainnet deployments require a persistent store",
        ));
    }

    // Batching
    if config.batching.max_transactions == 0 {
        errors.push(ValidationError::new(
            "batching.max_transactions",
            "must be greater than 0",
        ));
    }

    if config.batching.on_demand_max_transactions == 0 {
        errors.push(ValidationError::new(
            "batching.on_demand_max_transactions",
            "must be greater than 0",
        ));
    }

    if config.batching.on_demand_max_transactions > config.batching.max_transactions {
        errors.push(ValidationError::new(
            "batching.on_demand_max_transactions",
            "must not exceed batching.max_transactions",
        ));
    }

    if config.batching.max_batch_age_secs == 0 {
        errors.push(ValidationError::new(
            "batching.max_batch_age_secs",
            "must be greater than 0",
        ));
    }

    // Chains
    if config.chains.is_empty() {
        errors.push(ValidationError::new(
            "chains",
            "at least one anchoring chain must be configured",
        ));
    }

    for (chain_name, chain_config) in &config.chains {
        if let Err(e) = validate_chain_config(chain_config) {
            errors.push(ValidationError::new(format!("chains.{chain_name}"), e));
        }
    }

    // Retry
    if config.retry.initial_backoff_ms > config.retry.max_backoff_ms {
        errors.push(ValidationError::new(
            "retry.initial_backoff_ms",
            "must not exceed retry.max_backoff_ms",
        ));
    }

    if config.retry.multiplier < 1.0 {
        errors.push(ValidationError::new(
            "retry.multiplier",
            "must be at least 1.0",
        ));
    }

    // Intents
    if config.intents.default_deadline_secs == Some(0) {
        errors.push(ValidationError::new(
            "intents.default_deadline_secs",
            "must be greater than 0 when set",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(errors))
    }
}

/// Validate one anchoring target
pub fn validate_chain_config(chain: &ChainConfig) -> std::result::Result<(), String> {
    if chain.network_name.is_empty() {
        return Err("network_name is required".to_string());
    }

    if chain.required_confirmations == 0 {
        return Err("required_confirmations must be greater than 0".to_string());
    }

    if chain.confirmation_timeout_secs == 0 {
        return Err("confirmation_timeout_secs must be greater than 0".to_string());
    }

    Ok(())
}

pub fn validate_log_level(level: &str) -> std::result::Result<(), String> {
    match level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        other => Err(format!("unknown log level '{other}'")),
    }
}

/// The store speaks sqlx URLs; only SQLite is bundled
pub fn validate_database_url(url: &str) -> std::result::Result<(), String> {
    if url.is_empty() {
        return Err("URL cannot be empty".to_string());
    }

    if !url.starts_with("sqlite:") {
        return Err("URL must start with sqlite:".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AppConfig {
        let mut config = AppConfig::default();
        config.service.validator_id = "validator-1".to_string();
        config.chains.insert(
            "ethereum".to_string(),
            ChainConfig {
                network_name: "sepolia".to_string(),
                ..Default::default()
            },
        );
        config
    }

    #[test]
    fn test_valid_config_passes() {
        validate_config(&valid()).unwrap();
    }

    #[test]
    fn test_all_errors_reported_together() {
        let mut config = valid();
        config.service.validator_id.clear();
        config.service.log_level = "loud".to_string();
        config.batching.max_transactions = 0;

        let ConfigError::Invalid(problems) = validate_config(&config).unwrap_err() else {
            panic!("expected validation error");
        };
        let fields: Vec<_> = problems.iter().map(|p| p.field.as_str()).collect();
        for field in ["service.validator_id", "service.log_level", "batching.max_transactions"] {
            assert!(fields.contains(&field), "{field} missing from {fields:?}");
        }
    }

    #[test]
    fn test_mainnet_requires_database() {
        let mut config = valid();
        config.service.environment = Environment::Mainnet;
        assert!(validate_config(&config).is_err());

        config.database.required = true;
        config.database.url = "sqlite://ledger.db".to_string();
        validate_config(&config).unwrap();
    }

    #[test]
    fn test_chain_validation() {
        let mut chain = ChainConfig {
            network_name: "mainnet".to_string(),
            ..Default::default()
        };
        assert!(validate_chain_config(&chain).is_ok());

        chain.required_confirmations = 0;
        assert!(validate_chain_config(&chain)
            .unwrap_err()
            .contains("required_confirmations"));
    }

    #[test]
    fn test_database_url() {
        assert!(validate_database_url("sqlite::memory:").is_ok());
        assert!(validate_database_url("postgres://db").is_err());
        assert!(validate_database_url("").is_err());
    }
}
