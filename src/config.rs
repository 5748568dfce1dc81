// Seeder Configuration
// Layers built-in defaults, an optional TOML file, .env / SEEDER_* environment
// variables and command-line overrides into one SeederConfig

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::db::connection::{ConnectionConfig, ConnectionError, DriverCandidate};

/// Environment variable prefix (SEEDER_HOST, SEEDER_PASSWORD, ...)
pub const ENV_PREFIX: &str = "SEEDER_";

pub const DEFAULT_PORT: u16 = 1433;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse TOML from config file at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("{0} is required (set {1} or pass it on the command line)")]
    Missing(&'static str, String),

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Fully resolved configuration
#[derive(Clone)]
pub struct SeederConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub drivers: Vec<String>,
    pub trust_certificate: bool,
    pub legacy_fallback: bool,
    pub connect_timeout_secs: u64,
    pub connect_retries: u32,
    pub retry_backoff_ms: u64,
}

impl std::fmt::Debug for SeederConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeederConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("drivers", &self.drivers)
            .field("trust_certificate", &self.trust_certificate)
            .field("legacy_fallback", &self.legacy_fallback)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("connect_retries", &self.connect_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .finish()
    }
}

/// Partial config for layering; every field optional
#[derive(Deserialize, Default, Debug, Clone)]
pub struct PartialSeederConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub drivers: Option<Vec<String>>,
    pub trust_certificate: Option<bool>,
    pub legacy_fallback: Option<bool>,
    pub connect_timeout_secs: Option<u64>,
    pub connect_retries: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
}

impl PartialSeederConfig {
    /// Fields set in `self` win over `lower`
    pub fn or(self, lower: PartialSeederConfig) -> PartialSeederConfig {
        PartialSeederConfig {
            host: self.host.or(lower.host),
            port: self.port.or(lower.port),
            database: self.database.or(lower.database),
            username: self.username.or(lower.username),
            password: self.password.or(lower.password),
            drivers: self.drivers.filter(|d| !d.is_empty()).or(lower.drivers),
            trust_certificate: self.trust_certificate.or(lower.trust_certificate),
            legacy_fallback: self.legacy_fallback.or(lower.legacy_fallback),
            connect_timeout_secs: self.connect_timeout_secs.or(lower.connect_timeout_secs),
            connect_retries: self.connect_retries.or(lower.connect_retries),
            retry_backoff_ms: self.retry_backoff_ms.or(lower.retry_backoff_ms),
        }
    }

    pub fn from_toml_str(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// An absent file is not an error; the file layer is simply empty
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents, path)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(envy::prefixed(ENV_PREFIX).from_env::<PartialSeederConfig>()?)
    }
}

fn required(value: Option<String>, field: &'static str, env: &str) -> Result<String, ConfigError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::Missing(field, format!("{}{}", ENV_PREFIX, env)))
}

impl SeederConfig {
    /// Load: overrides > environment (.env included) > file > defaults
    pub fn load(
        config_path: Option<&Path>,
        overrides: PartialSeederConfig,
    ) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let file_config = match config_path {
            Some(path) => PartialSeederConfig::from_file(path)?,
            None => PartialSeederConfig::default(),
        };
        let env_config = PartialSeederConfig::from_env()?;

        Self::resolve(overrides.or(env_config).or(file_config))
    }

    /// Apply defaults and check required fields. Credentials have no defaults.
    pub fn resolve(merged: PartialSeederConfig) -> Result<Self, ConfigError> {
        Ok(SeederConfig {
            host: required(merged.host, "host", "HOST")?,
            port: merged.port.unwrap_or(DEFAULT_PORT),
            database: required(merged.database, "database", "DATABASE")?,
            username: required(merged.username, "username", "USERNAME")?,
            password: required(merged.password, "password", "PASSWORD")?,
            drivers: merged
                .drivers
                .filter(|d| !d.is_empty())
                .unwrap_or_else(DriverCandidate::default_names),
            trust_certificate: merged.trust_certificate.unwrap_or(true),
            legacy_fallback: merged.legacy_fallback.unwrap_or(true),
            connect_timeout_secs: merged
                .connect_timeout_secs
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            connect_retries: merged.connect_retries.unwrap_or(0),
            retry_backoff_ms: merged.retry_backoff_ms.unwrap_or(DEFAULT_RETRY_BACKOFF_MS),
        })
    }

    /// Build the validated runtime connection config
    pub fn connection_config(&self) -> Result<ConnectionConfig, ConfigError> {
        let drivers = self
            .drivers
            .iter()
            .map(|name| DriverCandidate::from_name(name, self.trust_certificate))
            .collect::<Result<Vec<_>, _>>()?;

        let config = ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            trust_certificate: self.trust_certificate,
            drivers,
            legacy_fallback: self.legacy_fallback,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            connect_retries: self.connect_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn complete() -> PartialSeederConfig {
        PartialSeederConfig {
            host: Some("db.example.net".to_string()),
            database: Some("fees".to_string()),
            username: Some("seeder".to_string()),
            password: Some("s3cret".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_applies_defaults() {
        let config = SeederConfig::resolve(complete()).unwrap();
        assert_eq!(config.port, 1433);
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.connect_retries, 0);
        assert!(config.trust_certificate);
        assert!(config.legacy_fallback);
        assert_eq!(config.drivers, DriverCandidate::default_names());
    }

    #[test]
    fn test_password_is_required() {
        let mut partial = complete();
        partial.password = None;
        let err = SeederConfig::resolve(partial).unwrap_err();
        assert!(err.to_string().contains("SEEDER_PASSWORD"));
    }

    #[test]
    fn test_higher_layer_wins() {
        let cli = PartialSeederConfig {
            host: Some("cli-host".to_string()),
            drivers: Some(vec![]),
            ..Default::default()
        };
        let env = PartialSeederConfig {
            host: Some("env-host".to_string()),
            port: Some(14330),
            drivers: Some(vec!["plaintext".to_string()]),
            ..Default::default()
        };
        let merged = cli.or(env).or(complete());
        let config = SeederConfig::resolve(merged).unwrap();
        assert_eq!(config.host, "cli-host");
        assert_eq!(config.port, 14330);
        // an empty list from a higher layer does not hide a lower one
        assert_eq!(config.drivers, vec!["plaintext".to_string()]);
        assert_eq!(config.database, "fees");
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = SeederConfig::resolve(complete()).unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "host = \"file-host\"\nport = 2433\ndrivers = [\"tls-required\", \"plaintext\"]\nconnect_retries = 2"
        )
        .unwrap();

        let partial = PartialSeederConfig::from_file(file.path()).unwrap();
        assert_eq!(partial.host.as_deref(), Some("file-host"));
        assert_eq!(partial.port, Some(2433));
        assert_eq!(partial.connect_retries, Some(2));
        assert_eq!(partial.drivers.map(|d| d.len()), Some(2));
    }

    #[test]
    fn test_missing_file_is_empty_layer() {
        let dir = tempfile::tempdir().unwrap();
        let partial = PartialSeederConfig::from_file(&dir.path().join("absent.toml")).unwrap();
        assert!(partial.host.is_none());
    }

    #[test]
    fn test_bad_toml_reports_path() {
        let err = PartialSeederConfig::from_toml_str("port = \"not a number\"", Path::new("seeder.toml"))
            .unwrap_err();
        assert!(err.to_string().contains("seeder.toml"));
    }

    #[test]
    fn test_unknown_driver_is_rejected() {
        let mut partial = complete();
        partial.drivers = Some(vec!["ODBC Driver 99".to_string()]);
        let config = SeederConfig::resolve(partial).unwrap();
        assert!(config.connection_config().is_err());
    }
}
