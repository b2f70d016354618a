//! Service configuration.
//!
//! Loaded from a YAML file, then adjusted by `NOVA_*` environment variables.
//! Every section is optional and falls back to its defaults.

use crate::storage::sqlite::DatabaseConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NovaConfig {
    /// Public host name.
    #[serde(rename = "FQDN")]
    pub fqdn: String,
    /// IPv4 listen address.
    #[serde(rename = "IPv4Addr")]
    pub ipv4_addr: String,
    /// IPv6 listen address.
    #[serde(rename = "IPv6Addr")]
    pub ipv6_addr: String,
    /// API port.
    #[serde(rename = "Port")]
    pub port: u16,
    /// Port for the metrics endpoint when debug is on.
    #[serde(rename = "DebugPort")]
    pub debug_port: u16,
    /// TLS settings.
    #[serde(rename = "TLSSettings")]
    pub tls: TlsSettings,
    /// Data cache settings.
    #[serde(rename = "Cache")]
    pub cache: CacheConfig,
    /// Database settings.
    #[serde(rename = "Database")]
    pub database: DatabaseSection,
    /// Logging settings.
    #[serde(rename = "Logging")]
    pub logging: LoggingConfig,
}

impl Default for NovaConfig {
    fn default() -> Self {
        Self {
            fqdn: "nova.local".to_string(),
            ipv4_addr: "0.0.0.0".to_string(),
            ipv6_addr: "::".to_string(),
            port: 8080,
            debug_port: 10080,
            tls: TlsSettings::default(),
            cache: CacheConfig::default(),
            database: DatabaseSection::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// TLS settings. Parsed and validated, not terminated by this build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TlsSettings {
    /// `non-tls`, `tls` or `mutual-tls`.
    pub tls_type: String,
    /// `1.2` or `1.3`.
    pub tls_version: String,
    /// Private key path.
    pub key_file: String,
    /// Certificate path.
    pub cert_file: String,
    /// CA bundle path for mutual TLS.
    pub ca_file: String,
}

impl Default for TlsSettings {
    fn default() -> Self {
        Self {
            tls_type: "non-tls".to_string(),
            tls_version: "1.3".to_string(),
            key_file: String::new(),
            cert_file: String::new(),
            ca_file: String::new(),
        }
    }
}

impl TlsSettings {
    /// Returns `true` unless `tlsType` is `non-tls`.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.tls_type != "non-tls"
    }

    /// Checks the type and version values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an unknown type or version.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.tls_type.as_str(), "non-tls" | "tls" | "mutual-tls") {
            return Err(Error::InvalidInput(format!(
                "unknown tlsType '{}'",
                self.tls_type
            )));
        }
        if !matches!(self.tls_version.as_str(), "1.2" | "1.3") {
            return Err(Error::InvalidInput(format!(
                "unsupported tlsVersion '{}'",
                self.tls_version
            )));
        }
        Ok(())
    }
}

/// Cache backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
    /// In-process map.
    #[default]
    Memory,
    /// Redis server (requires the `redis` feature).
    Redis,
}

/// Data cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Backend to use.
    pub cache_type: CacheType,
    /// Redis URL, used when `cache_type` is `redis`.
    pub redis_addr: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_type: CacheType::Memory,
            redis_addr: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

/// Database section of the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DatabaseSection {
    /// Database file path.
    pub path: PathBuf,
    /// Connection limit.
    pub max_open_conns: u32,
    /// Enables metrics and the pool sampler.
    pub debug: bool,
    /// Create the migrations ledger on open.
    pub auto_create_tables: bool,
    /// Use WAL journaling.
    pub wal_mode: bool,
    /// Page cache size.
    pub cache_size: i64,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
    /// Extensions loaded on every connection.
    pub extensions: Vec<PathBuf>,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        let adapter = DatabaseConfig::default();
        Self {
            path: PathBuf::from("nova.db"),
            max_open_conns: adapter.max_open_conns,
            debug: adapter.debug,
            auto_create_tables: adapter.auto_create_tables,
            wal_mode: adapter.wal_mode,
            cache_size: adapter.cache_size,
            busy_timeout_ms: adapter.busy_timeout_ms,
            extensions: adapter.extensions,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `nova=debug`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Append to this file instead of stdout.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

impl NovaConfig {
    /// Reads and parses the YAML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// TLS settings are invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        let config: Self =
            serde_yaml_ng::from_str(&contents).map_err(|e| Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;
        config.tls.validate()?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Writes the configuration as YAML to `path`.
    ///
    /// The document is serialized before the file is opened, so a failure
    /// leaves an existing file untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents = serde_yaml_ng::to_string(self).map_err(|e| Error::OperationFailed {
            operation: "serialize_config".to_string(),
            cause: e.to_string(),
        })?;
        std::fs::write(path, contents).map_err(|e| Error::OperationFailed {
            operation: "write_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })
    }

    /// Applies `NOVA_PORT`, `NOVA_DATABASE_PATH`, `NOVA_LOG_LEVEL` and
    /// `NOVA_DEBUG`. Unparseable values are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("NOVA_PORT") {
            if let Ok(parsed) = v.parse::<u16>() {
                self.port = parsed;
            }
        }
        if let Ok(v) = std::env::var("NOVA_DATABASE_PATH") {
            if !v.is_empty() {
                self.database.path = PathBuf::from(v);
            }
        }
        if let Ok(v) = std::env::var("NOVA_LOG_LEVEL") {
            if !v.is_empty() {
                self.logging.level = v;
            }
        }
        if let Ok(v) = std::env::var("NOVA_DEBUG") {
            if let Some(parsed) = parse_bool(&v) {
                self.database.debug = parsed;
            }
        }
        self
    }

    /// Converts the database section into adapter settings.
    #[must_use]
    pub fn database_config(&self) -> DatabaseConfig {
        let section = &self.database;
        DatabaseConfig {
            max_open_conns: section.max_open_conns,
            debug: section.debug,
            auto_create_tables: section.auto_create_tables,
            wal_mode: section.wal_mode,
            cache_size: section.cache_size,
            busy_timeout_ms: section.busy_timeout_ms,
            extensions: section.extensions.clone(),
            ..DatabaseConfig::default()
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_case::test_case;

    #[test]
    fn test_defaults() {
        let config = NovaConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.debug_port, 10080);
        assert_eq!(config.cache.cache_type, CacheType::Memory);
        assert!(!config.tls.enabled());
        assert_eq!(config.database_config(), DatabaseConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nova.yaml");
        std::fs::write(
            &path,
            "Port: 9090\nDatabase:\n  path: /tmp/x.db\n  maxOpenConns: 4\n  debug: true\nCache:\n  cacheType: redis\n",
        )
        .unwrap();

        let config = NovaConfig::load(&path).unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.debug_port, 10080);
        assert_eq!(config.database.path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.cache.cache_type, CacheType::Redis);

        let adapter = config.database_config();
        assert_eq!(adapter.max_open_conns, 4);
        assert!(adapter.debug);
        assert!(adapter.wal_mode);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nova.yaml");
        let mut config = NovaConfig::default();
        config.logging.format = LogFormat::Json;
        config.tls.tls_type = "tls".to_string();
        config.save(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("TLSSettings"));
        assert!(raw.contains("tlsType: tls"));
        assert_eq!(NovaConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        let err = NovaConfig::load("/nonexistent/nova.yaml").unwrap_err();
        assert!(
            matches!(err, Error::OperationFailed { ref operation, .. } if operation == "read_config_file")
        );
    }

    #[test]
    fn test_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nova.yaml");
        std::fs::write(&path, "Port: [not, a, port]\n").unwrap();
        let err = NovaConfig::load(&path).unwrap_err();
        assert!(
            matches!(err, Error::OperationFailed { ref operation, .. } if operation == "parse_config_file")
        );
    }

    #[test_case("non-tls", "1.3", true ; "plain")]
    #[test_case("mutual-tls", "1.2", true ; "mutual")]
    #[test_case("ssl", "1.3", false ; "unknown type")]
    #[test_case("tls", "1.1", false ; "old version")]
    fn test_tls_validation(tls_type: &str, version: &str, ok: bool) {
        let tls = TlsSettings {
            tls_type: tls_type.to_string(),
            tls_version: version.to_string(),
            ..TlsSettings::default()
        };
        assert_eq!(tls.validate().is_ok(), ok);
    }

    #[test_case("true", Some(true))]
    #[test_case("ON", Some(true))]
    #[test_case("0", Some(false))]
    #[test_case("maybe", None)]
    fn test_parse_bool(raw: &str, expected: Option<bool>) {
        assert_eq!(parse_bool(raw), expected);
    }
}
