//! Configuration for the ledger

use crate::types::Identity;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Writer mailbox capacity (pending mutations before callers wait)
    pub mailbox_capacity: usize,

    /// Genesis identity (hex public key) used by the server binary
    pub initializer: Option<String>,

    /// Input limits
    pub limits: LimitsConfig,

    /// Authorization policy
    pub policy: PolicyConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/document-ledger"),
            service_name: "document-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            mailbox_capacity: 1024,
            initializer: None,
            limits: LimitsConfig::default(),
            policy: PolicyConfig::default(),
            logging: LoggingConfig::default(),
            rocksdb: RocksDBConfig::default(),
        }
    }
}

/// Limits applied to `issue` arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum file name length (bytes)
    pub max_file_name_len: usize,

    /// Maximum content URI length (bytes)
    pub max_content_uri_len: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_name_len: 256,
            max_content_uri_len: 2048,
        }
    }
}

/// Who may revoke a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationScope {
    /// Any identity holding Issuer may revoke any document
    AnyIssuer,
    /// Only the issuer of record may revoke its document
    IssuerOfRecord,
}

/// Authorization policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Revocation authority
    pub revocation_scope: RevocationScope,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            revocation_scope: RevocationScope::AnyIssuer,
        }
    }
}

/// Logging configuration (consumed by the server binary)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Sync the WAL on every commit
    pub sync_writes: bool,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            sync_writes: true,
            enable_statistics: false,
        }
    }
}

impl RocksDBConfig {
    /// Write buffer size in bytes, `Config` error on overflow
    pub fn write_buffer_size_bytes(&self) -> crate::Result<usize> {
        self.write_buffer_size_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| {
                crate::Error::Config(format!(
                    "rocksdb.write_buffer_size_mb {} is too large",
                    self.write_buffer_size_mb
                ))
            })
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse from TOML text
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("DOCLEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(initializer) = std::env::var("DOCLEDGER_INITIALIZER") {
            config.initializer = Some(initializer);
        }

        if let Ok(filter) = std::env::var("DOCLEDGER_LOG_FILTER") {
            config.logging.filter = filter;
        }

        if let Ok(json) = std::env::var("DOCLEDGER_LOG_JSON") {
            config.logging.json = matches!(json.as_str(), "1" | "true" | "yes");
        }

        if let Ok(scope) = std::env::var("DOCLEDGER_REVOCATION_SCOPE") {
            config.policy.revocation_scope = match scope.as_str() {
                "any_issuer" => RevocationScope::AnyIssuer,
                "issuer_of_record" => RevocationScope::IssuerOfRecord,
                other => {
                    return Err(crate::Error::Config(format!(
                        "Unknown revocation scope: {}",
                        other
                    )))
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Check values that would otherwise fail later at runtime
    pub fn validate(&self) -> crate::Result<()> {
        if self.mailbox_capacity == 0 {
            return Err(crate::Error::Config(
                "mailbox_capacity must be greater than zero".to_string(),
            ));
        }
        if self.limits.max_file_name_len == 0 {
            return Err(crate::Error::Config(
                "limits.max_file_name_len must be greater than zero".to_string(),
            ));
        }
        self.rocksdb.write_buffer_size_bytes()?;
        if let Some(initializer) = &self.initializer {
            initializer
                .parse::<Identity>()
                .map_err(|e| crate::Error::Config(format!("initializer: {}", e)))?;
        }
        Ok(())
    }

    /// Parsed genesis identity, if configured
    pub fn initializer_identity(&self) -> crate::Result<Option<Identity>> {
        self.initializer
            .as_deref()
            .map(|s| s.parse::<Identity>())
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "document-ledger");
        assert_eq!(config.policy.revocation_scope, RevocationScope::AnyIssuer);
        assert!(config.initializer.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml(
            r#"
            data_dir = "/var/lib/docledger"
            initializer = "0x0101010101010101010101010101010101010101010101010101010101010101"

            [policy]
            revocation_scope = "issuer_of_record"
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/docledger"));
        assert_eq!(
            config.policy.revocation_scope,
            RevocationScope::IssuerOfRecord
        );
        assert_eq!(config.limits.max_file_name_len, 256);
        assert_eq!(
            config.initializer_identity().unwrap(),
            Some(Identity::from_bytes([1; 32]))
        );
    }

    #[test]
    fn test_invalid_initializer_rejected() {
        let err = Config::from_toml(r#"initializer = "0x1234""#).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn test_write_buffer_overflow_rejected() {
        let mut config = Config::default();
        config.rocksdb.write_buffer_size_mb = usize::MAX / 1024;
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));

        config.rocksdb.write_buffer_size_mb = 64;
        assert_eq!(config.rocksdb.write_buffer_size_bytes().unwrap(), 64 << 20);
    }

    #[test]
    fn test_zero_mailbox_rejected() {
        let err = Config::from_toml("mailbox_capacity = 0").unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }
}
