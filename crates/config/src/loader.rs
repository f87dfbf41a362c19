//! Configuration loading from multiple sources

use crate::{AppConfig, ConfigError, Result};
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use std::path::Path;
use tracing::debug;

/// Prefix for environment overrides, e.g. `ANCHOR_PROOFS_SERVICE__VALIDATOR_ID`
pub const ENV_PREFIX: &str = "ANCHOR_PROOFS";

fn env_source(prefix: &str) -> Environment {
    // `__` separates sections so snake_case keys survive
    Environment::with_prefix(prefix)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

fn file_format(path: &Path) -> Result<FileFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => Ok(FileFormat::Toml),
        Some("yaml") | Some("yml") => Ok(FileFormat::Yaml),
        Some("json") => Ok(FileFormat::Json),
        _ => Err(ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
    }
}

/// Configuration loader with support for multiple formats and sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    ///
    /// Supports TOML, YAML, and JSON formats based on file extension
    pub fn from_file(path: &Path) -> Result<AppConfig> {
        let format = file_format(path)?;
        let content = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), ?format, "Loading config file");

        match format {
            FileFormat::Toml => Self::from_toml(&content),
            FileFormat::Yaml => Self::from_yaml(&content),
            _ => Self::from_json(&content),
        }
    }

    pub fn from_toml(content: &str) -> Result<AppConfig> {
        toml::from_str(content).map_err(ConfigError::from)
    }

    pub fn from_yaml(content: &str) -> Result<AppConfig> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    pub fn from_json(content: &str) -> Result<AppConfig> {
        serde_json::from_str(content).map_err(ConfigError::from)
    }

    /// Load configuration from environment variables under [`ENV_PREFIX`]
    pub fn from_env() -> Result<AppConfig> {
        Self::from_env_with_prefix(ENV_PREFIX)
    }

    /// Load configuration from environment variables with custom prefix
    ///
    /// Variables take the form `PREFIX_SECTION__KEY`, for example
    /// `ANCHOR_PROOFS_BATCHING__MAX_TRANSACTIONS=500`.
    pub fn from_env_with_prefix(prefix: &str) -> Result<AppConfig> {
        Self::builder().add_env(prefix).build()
    }

    /// Merge two configurations, with overlay taking precedence
    ///
    /// Sections are replaced wholesale; chain maps are combined.
    pub fn merge(base: AppConfig, overlay: AppConfig) -> AppConfig {
        AppConfig {
            service: overlay.service,
            database: overlay.database,
            batching: overlay.batching,
            chains: {
                let mut chains = base.chains;
                chains.extend(overlay.chains);
                chains
            },
            retry: overlay.retry,
            intents: overlay.intents,
        }
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Individual keys set in the environment replace the file's values;
    /// everything else comes from the file.
    pub fn from_file_with_env(path: &Path, env_prefix: &str) -> Result<AppConfig> {
        Self::builder().add_file(path, true)?.add_env(env_prefix).build()
    }

    /// Build configuration using the config crate's builder pattern
    pub fn builder() -> ConfigLoaderBuilder {
        ConfigLoaderBuilder {
            builder: Config::builder(),
        }
    }
}

/// Builder for layered configuration sources, later sources win
pub struct ConfigLoaderBuilder {
    builder: ConfigBuilder<config::builder::DefaultState>,
}

impl ConfigLoaderBuilder {
    pub fn add_file(mut self, path: &Path, required: bool) -> Result<Self> {
        let format = file_format(path)?;
        self.builder = self
            .builder
            .add_source(File::from(path).format(format).required(required));
        Ok(self)
    }

    pub fn add_env(mut self, prefix: &str) -> Self {
        self.builder = self.builder.add_source(env_source(prefix));
        self
    }

    /// Set a default value for a dotted key such as `service.log_level`
    pub fn set_default(mut self, key: &str, value: &str) -> Result<Self> {
        self.builder = self.builder.set_default(key, value)?;
        Ok(self)
    }

    pub fn build(self) -> Result<AppConfig> {
        let config = self.builder.build()?;
        config.try_deserialize().map_err(ConfigError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Environment as Deployment;
    use std::io::Write;

    const TOML: &str = r#"
        [service]
        environment = "testnet"
        validator_id = "validator-7"
        log_level = "debug"

        [batching]
        max_transactions = 250

        [chains.ethereum]
        network_name = "sepolia"
        chain_id = 11155111
        required_confirmations = 3

        [chains.bitcoin]
        network_name = "testnet"
    "#;

    #[test]
    fn test_load_from_toml() {
        let config = ConfigLoader::from_toml(TOML).unwrap();
        assert_eq!(config.service.environment, Deployment::Testnet);
        assert_eq!(config.service.validator_id, "validator-7");
        assert_eq!(config.batching.max_transactions, 250);
        // untouched keys fall back to defaults
        assert_eq!(config.batching.max_batch_age_secs, 900);
        assert_eq!(config.chains["ethereum"].chain_id, Some(11155111));
        assert_eq!(config.chains["bitcoin"].required_confirmations, 6);
        assert_eq!(config.intents.default_deadline_secs, Some(3600));
    }

    #[test]
    fn test_load_from_yaml() {
        let yaml = r#"
service:
  validator_id: validator-7
chains:
  ethereum:
    network_name: mainnet
    required_confirmations: 12
retry:
  max_retries: 5
  multiplier: 1.5
        "#;

        let config = ConfigLoader::from_yaml(yaml).unwrap();
        assert_eq!(config.chains["ethereum"].required_confirmations, 12);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_backoff_ms, 100);
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"
{
  "service": { "validator_id": "validator-7", "proof_version": "2.0" },
  "database": { "url": "sqlite::memory:", "max_connections": 2 },
  "intents": { "default_max_retries": 1, "default_deadline_secs": null }
}
        "#;

        let config = ConfigLoader::from_json(json).unwrap();
        assert_eq!(config.service.proof_version, "2.0");
        assert_eq!(config.database.max_connections, 2);
        assert_eq!(config.intents.default_deadline_secs, None);
        assert!(config.chains.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(TOML.as_bytes()).unwrap();

        let config = ConfigLoader::from_file(file.path()).unwrap();
        assert_eq!(config.service.log_level, "debug");
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let file = tempfile::Builder::new()
            .suffix(".ini")
            .tempfile()
            .unwrap();
        let err = ConfigLoader::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_merge_configs() {
        let base = ConfigLoader::from_toml(TOML).unwrap();
        let mut overlay = AppConfig::default();
        overlay.service.validator_id = "validator-9".to_string();
        overlay.chains.insert(
            "ethereum".to_string(),
            crate::ChainConfig {
                network_name: "mainnet".to_string(),
                ..Default::default()
            },
        );

        let merged = ConfigLoader::merge(base, overlay);
        assert_eq!(merged.service.validator_id, "validator-9");
        assert_eq!(merged.chains.len(), 2);
        assert_eq!(merged.chains["ethereum"].network_name, "mainnet");
        assert_eq!(merged.chains["bitcoin"].network_name, "testnet");
    }
}
