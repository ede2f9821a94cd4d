use anyhow::{Context, Result};
use serde::Deserialize;

use crate::crypto::MasterKey;

/// Complete credvault configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct VaultConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub encryption: EncryptionConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file (":memory:" for a throwaway store)
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    "credvault.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Encryption configuration.
///
/// The master key itself never lives in the config file, only the name of
/// the environment variable that carries it.
#[derive(Debug, Clone, Deserialize)]
pub struct EncryptionConfig {
    #[serde(default = "default_master_key_env")]
    pub master_key_env: String,
}

fn default_master_key_env() -> String {
    "CREDVAULT_MASTER_KEY".to_string()
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            master_key_env: default_master_key_env(),
        }
    }
}

impl EncryptionConfig {
    pub fn load_master_key(&self) -> Result<MasterKey> {
        MasterKey::from_env(&self.master_key_env)
    }
}

/// Credential lifecycle limits
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
    /// Window used when listing credentials that are about to expire
    #[serde(default = "default_expiry_warning_hours")]
    pub expiry_warning_hours: i64,
}

fn default_max_name_length() -> usize {
    255
}

fn default_expiry_warning_hours() -> i64 {
    72
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            max_name_length: default_max_name_length(),
            expiry_warning_hours: default_expiry_warning_hours(),
        }
    }
}

impl VaultConfig {
    /// Applies environment overrides on top of file or default values.
    pub fn from_env_overrides(mut self) -> Self {
        if let Ok(path) = std::env::var("CREDVAULT_DATABASE_PATH") {
            if !path.is_empty() {
                self.storage.database_path = path;
            }
        }
        self
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<VaultConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: VaultConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = VaultConfig::default();
        assert_eq!(config.storage.database_path, "credvault.db");
        assert_eq!(config.encryption.master_key_env, "CREDVAULT_MASTER_KEY");
        assert_eq!(config.credentials.max_name_length, 255);
        assert_eq!(config.credentials.expiry_warning_hours, 72);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [storage]
            database_path = "/var/lib/credvault/creds.db"

            [encryption]
            master_key_env = "VAULT_KEY"

            [credentials]
            max_name_length = 64
            expiry_warning_hours = 24
        "#;

        let config: VaultConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.storage.database_path, "/var/lib/credvault/creds.db");
        assert_eq!(config.encryption.master_key_env, "VAULT_KEY");
        assert_eq!(config.credentials.max_name_length, 64);
        assert_eq!(config.credentials.expiry_warning_hours, 24);
    }

    #[test]
    fn test_partial_config() {
        // Missing sections use defaults
        let toml = r#"
            [credentials]
            max_name_length = 32
        "#;

        let config: VaultConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.credentials.max_name_length, 32);
        assert_eq!(config.credentials.expiry_warning_hours, 72); // Default
        assert_eq!(config.storage.database_path, "credvault.db"); // Default
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credvault.toml");
        std::fs::write(&path, "[storage]\ndatabase_path = \"x.db\"\n").unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.storage.database_path, "x.db");

        assert!(load_config(dir.path().join("missing.toml").to_str().unwrap()).is_err());
    }

    #[test]
    fn test_master_key_from_env() {
        let encryption = EncryptionConfig {
            master_key_env: "CREDVAULT_TEST_MASTER_KEY_CONFIG".to_string(),
        };
        assert!(encryption.load_master_key().is_err());

        let key = MasterKey::generate();
        std::env::set_var("CREDVAULT_TEST_MASTER_KEY_CONFIG", key.to_base64());
        let loaded = encryption.load_master_key().unwrap();
        assert_eq!(loaded.to_base64(), key.to_base64());
        std::env::remove_var("CREDVAULT_TEST_MASTER_KEY_CONFIG");
    }
}
