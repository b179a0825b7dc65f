//! Configuration management for ledgerbox
//!
//! Layered configuration loading:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use ledgerbox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Service listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the
//! pattern `LEDGERBOX__<section>__<key>`:
//!
//! - `LEDGERBOX__SERVER__BIND_ADDR=0.0.0.0:8081`
//! - `LEDGERBOX__SERVER__LEDGER_DIR=/var/lib/ledgerbox`
//! - `LEDGERBOX__LEDGER__MARK_LOCK=ocr_busy`
//!
//! # Configuration File
//!
//! By default the configuration is loaded from `config/ledgerbox.toml`;
//! override the location with the `LEDGERBOX_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use models::{ClientConfig, Config, LedgerConfig, ServerConfig};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "0.0.0.0:8081"

[ledger]
mark_lock = "migration_busy"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8081");
        assert_eq!(config.ledger.mark_lock, "migration_busy");
    }

    #[test]
    fn test_validation_catches_colliding_marks() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[ledger]
mark_open = "busy"
mark_lock = "busy"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result,
            Err(ConfigError::ValidationError(ValidationError::MarksCollide(_)))
        ));
    }
}
