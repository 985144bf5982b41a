//! Configuration management for keyring-engine
//!
//! Supports loading configuration from:
//! - Built-in defaults
//! - Config file (`--config path`, else `./keyring` or `/etc/keyring-engine/keyring`)
//! - Environment variables (`KEYRING__VAULT__PATH`, etc.)

use crate::errors::{KeyringError, Result};
use crate::keyring::hd::parse_derivation_path;
use crate::keyring::{KeyringConfigPatch, DEFAULT_HD_PATH, SECONDARY_HD_PATH};
use crate::vault::KdfParams;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Derivation settings
    pub keyring: KeyringSection,

    /// Vault file and encryption cost
    pub vault: VaultSection,

    /// Security configuration
    pub security: SecurityConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyringSection {
    /// Primary HD path, account index appended
    pub hd_path: String,

    /// Derive Tron addresses alongside every account
    pub secondary_chain_enabled: bool,

    pub secondary_hd_path: String,
}

impl Default for KeyringSection {
    fn default() -> Self {
        Self {
            hd_path: DEFAULT_HD_PATH.to_string(),
            secondary_chain_enabled: true,
            secondary_hd_path: SECONDARY_HD_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultSection {
    /// Path to the encrypted vault file
    pub path: PathBuf,

    /// Argon2id memory cost in KiB
    pub kdf_memory_kib: u32,

    /// Argon2id passes
    pub kdf_iterations: u32,

    /// Argon2id lanes
    pub kdf_parallelism: u32,
}

impl Default for VaultSection {
    fn default() -> Self {
        let kdf = KdfParams::default();
        Self {
            path: PathBuf::from("./data/vault.json"),
            kdf_memory_kib: kdf.memory_kib,
            kdf_iterations: kdf.iterations,
            kdf_parallelism: kdf.parallelism,
        }
    }
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Lock decrypted vault plaintext in memory
    pub enable_mlock: bool,

    /// Disable core dumps
    pub disable_core_dumps: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_mlock: true,
            disable_core_dumps: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

fn config_error(e: config::ConfigError) -> KeyringError {
    KeyringError::ConfigError(e.to_string())
}

impl Config {
    /// Load configuration from file and environment
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = config::Config::try_from(&Config::default()).map_err(config_error)?;
        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        } else {
            builder = builder
                .add_source(config::File::with_name("keyring").required(false))
                .add_source(config::File::with_name("/etc/keyring-engine/keyring").required(false));
        }

        // KEYRING__VAULT__PATH, KEYRING__LOGGING__LEVEL, ...
        builder = builder.add_source(
            config::Environment::with_prefix("KEYRING")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .map_err(config_error)?
            .try_deserialize()
            .map_err(config_error)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        parse_derivation_path(&self.keyring.hd_path).map_err(|e| {
            KeyringError::ConfigError(format!("keyring.hd_path: {}", e))
        })?;
        if self.keyring.secondary_chain_enabled {
            parse_derivation_path(&self.keyring.secondary_hd_path).map_err(|e| {
                KeyringError::ConfigError(format!("keyring.secondary_hd_path: {}", e))
            })?;
        }

        if self.vault.kdf_memory_kib == 0
            || self.vault.kdf_iterations == 0
            || self.vault.kdf_parallelism == 0
        {
            return Err(KeyringError::ConfigError(
                "vault KDF parameters must be non-zero".to_string(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            return Err(KeyringError::ConfigError(format!(
                "Unknown log format '{}'",
                self.logging.format
            )));
        }

        if !self.vault.path.exists() {
            info!("No vault at {:?} yet, one will be created", self.vault.path);
        }

        Ok(())
    }

    pub fn kdf_params(&self) -> KdfParams {
        KdfParams {
            memory_kib: self.vault.kdf_memory_kib,
            iterations: self.vault.kdf_iterations,
            parallelism: self.vault.kdf_parallelism,
        }
    }

    /// Keyring controller settings derived from the process config
    pub fn keyring_patch(&self) -> KeyringConfigPatch {
        KeyringConfigPatch {
            hd_path: Some(self.keyring.hd_path.clone()),
            secondary_enabled: Some(self.keyring.secondary_chain_enabled),
            secondary_hd_path: Some(self.keyring.secondary_hd_path.clone()),
            lock_memory: Some(self.security.enable_mlock),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.keyring.hd_path, "m/44'/60'/0'/0");
        assert!(config.keyring.secondary_chain_enabled);
        assert!(config.security.enable_mlock);
        config.validate().unwrap();
    }

    #[test]
    fn test_rejects_bad_derivation_path() {
        let mut config = Config::default();
        config.keyring.hd_path = "m/not/a/path".to_string();
        assert!(matches!(config.validate(), Err(KeyringError::ConfigError(_))));
    }

    #[test]
    fn test_rejects_zero_kdf_cost() {
        let mut config = Config::default();
        config.vault.kdf_iterations = 0;
        assert!(matches!(config.validate(), Err(KeyringError::ConfigError(_))));
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[keyring]\nsecondary_chain_enabled = false\n\n[vault]\nkdf_iterations = 7\n\n[logging]\nformat = \"json\""
        )
        .unwrap();

        let config = Config::load(file.path().to_str()).unwrap();
        assert!(!config.keyring.secondary_chain_enabled);
        assert_eq!(config.keyring.hd_path, DEFAULT_HD_PATH);
        assert_eq!(config.vault.kdf_iterations, 7);
        assert_eq!(config.logging.format, "json");

        let patch = config.keyring_patch();
        assert_eq!(patch.secondary_enabled, Some(false));
        assert_eq!(config.kdf_params().iterations, 7);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = Config::load(Some("/nonexistent/keyring-engine/config.toml"));
        assert!(matches!(result, Err(KeyringError::ConfigError(_))));
    }
}
