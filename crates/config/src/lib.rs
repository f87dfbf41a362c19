//! Engine configuration
//!
//! An [`AppConfig`] is read from a TOML, YAML or JSON file (chosen by
//! extension), from `ANCHOR_PROOFS_*` environment variables, or from a file
//! overlaid with the environment. [`validate_config`] must pass before the
//! configuration is handed to any component.

mod config;
mod loader;
mod validation;

pub use config::*;
pub use loader::*;
pub use validation::*;

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot tell the format of {path}: expected .toml, .yaml, .yml or .json")]
    UnsupportedFormat { path: PathBuf },

    #[error("{} invalid setting(s): {}", .0.len(), describe(.0))]
    Invalid(Vec<ValidationError>),

    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("layered source: {0}")]
    Source(#[from] ::config::ConfigError),

    #[error("TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn describe(problems: &[ValidationError]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, ConfigError>;
