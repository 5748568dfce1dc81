// MS-SQL Connection Establishment
// Tries each configured driver candidate in order, then a legacy ADO.NET
// connection string, and aggregates every failure when nothing works

use std::time::Duration;
use thiserror::Error;
use tiberius::{AuthMethod, Config, EncryptionLevel};
use tracing::{info, warn};

use crate::db::traits::DatabaseError;

/// TLS behaviour of a driver candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMode {
    /// Whole session over TLS
    Required,
    /// Only the login packet is encrypted
    LoginOnly,
    /// No TLS at all
    Plaintext,
}

impl EncryptionMode {
    pub fn level(&self) -> EncryptionLevel {
        match self {
            EncryptionMode::Required => EncryptionLevel::Required,
            EncryptionMode::LoginOnly => EncryptionLevel::Off,
            EncryptionMode::Plaintext => EncryptionLevel::NotSupported,
        }
    }
}

/// A named transport profile tried by the establisher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverCandidate {
    pub name: String,
    pub encryption: EncryptionMode,
    pub trust_certificate: bool,
}

impl DriverCandidate {
    pub const TLS_REQUIRED: &'static str = "tls-required";
    pub const TLS_LOGIN_ONLY: &'static str = "tls-login-only";
    pub const PLAINTEXT: &'static str = "plaintext";

    /// Default try-list, strongest transport first
    pub fn default_names() -> Vec<String> {
        vec![
            Self::TLS_REQUIRED.to_string(),
            Self::TLS_LOGIN_ONLY.to_string(),
            Self::PLAINTEXT.to_string(),
        ]
    }

    pub fn from_name(name: &str, trust_certificate: bool) -> Result<Self, ConnectionError> {
        let encryption = match name.trim().to_ascii_lowercase().as_str() {
            Self::TLS_REQUIRED => EncryptionMode::Required,
            Self::TLS_LOGIN_ONLY => EncryptionMode::LoginOnly,
            Self::PLAINTEXT => EncryptionMode::Plaintext,
            other => {
                return Err(ConnectionError::ConfigError(format!(
                    "Unknown driver '{}' (expected one of: {})",
                    other,
                    Self::default_names().join(", ")
                )))
            }
        };
        Ok(Self {
            name: name.trim().to_ascii_lowercase(),
            encryption,
            trust_certificate,
        })
    }
}

/// One entry of the establisher's try-list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectAttempt {
    Driver(DriverCandidate),
    LegacyConnectionString,
}

impl ConnectAttempt {
    /// Human label; never contains credentials
    pub fn label(&self) -> String {
        match self {
            ConnectAttempt::Driver(candidate) => format!("driver {}", candidate.name),
            ConnectAttempt::LegacyConnectionString => "legacy connection string".to_string(),
        }
    }
}

/// A failed attempt and the error it produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub attempt: String,
    pub message: String,
    pub round: u32,
}

fn render_failures(failures: &[AttemptFailure]) -> String {
    failures
        .iter()
        .map(|f| {
            if f.round == 0 {
                format!("\n  - Failed with {}: {}", f.attempt, f.message)
            } else {
                format!("\n  - (retry {}) Failed with {}: {}", f.round, f.attempt, f.message)
            }
        })
        .collect()
}

/// Connection errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Could not connect with any of the attempted methods:{}", render_failures(.0))]
    AllAttemptsFailed(Vec<AttemptFailure>),
}

impl ConnectionError {
    pub fn failures(&self) -> &[AttemptFailure] {
        match self {
            ConnectionError::AllAttemptsFailed(failures) => failures,
            ConnectionError::ConfigError(_) => &[],
        }
    }
}

/// Validated runtime connection configuration
#[derive(Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub trust_certificate: bool,
    pub drivers: Vec<DriverCandidate>,
    pub legacy_fallback: bool,
    pub connect_timeout: Duration,
    pub connect_retries: u32,
    pub retry_backoff: Duration,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("drivers", &self.drivers)
            .field("legacy_fallback", &self.legacy_fallback)
            .finish_non_exhaustive()
    }
}

/// Quote an ADO.NET connection string value when it carries separators or quotes
fn ado_value(value: &str) -> String {
    let needs_quotes = value.contains([';', '=', '\'', '"'])
        || value.starts_with(' ')
        || value.ends_with(' ');
    if needs_quotes {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl ConnectionConfig {
    pub fn validate(&self) -> Result<(), ConnectionError> {
        if self.host.trim().is_empty() {
            return Err(ConnectionError::ConfigError("Host is required".to_string()));
        }
        if self.database.trim().is_empty() {
            return Err(ConnectionError::ConfigError("Database name is required".to_string()));
        }
        if self.username.trim().is_empty() {
            return Err(ConnectionError::ConfigError("Username is required".to_string()));
        }
        if self.drivers.is_empty() && !self.legacy_fallback {
            return Err(ConnectionError::ConfigError(
                "No driver candidates and legacy fallback disabled".to_string(),
            ));
        }
        Ok(())
    }

    /// Ordered try-list: every driver candidate, then the legacy string
    pub fn attempts(&self) -> Vec<ConnectAttempt> {
        let mut attempts: Vec<ConnectAttempt> = self
            .drivers
            .iter()
            .cloned()
            .map(ConnectAttempt::Driver)
            .collect();
        if self.legacy_fallback {
            attempts.push(ConnectAttempt::LegacyConnectionString);
        }
        attempts
    }

    /// Create a tiberius Config for one driver candidate
    pub fn to_tiberius_config(&self, candidate: &DriverCandidate) -> Config {
        let mut config = Config::new();
        config.host(&self.host);
        config.port(self.port);
        config.database(&self.database);
        config.application_name("fee-seeder");
        config.authentication(AuthMethod::sql_server(&self.username, &self.password));

        if candidate.trust_certificate {
            config.trust_cert();
        }
        config.encryption(candidate.encryption.level());
        config
    }

    /// The same target in ADO.NET syntax (User Id / Encrypt / MultipleActiveResultSets)
    pub fn legacy_connection_string(&self) -> String {
        format!(
            "Server=tcp:{},{};Database={};User Id={};Password={};Encrypt=True;TrustServerCertificate={};MultipleActiveResultSets=True;",
            self.host,
            self.port,
            ado_value(&self.database),
            ado_value(&self.username),
            ado_value(&self.password),
            if self.trust_certificate { "True" } else { "False" },
        )
    }

    /// Resolve an attempt into a tiberius Config
    pub fn config_for(&self, attempt: &ConnectAttempt) -> Result<Config, DatabaseError> {
        match attempt {
            ConnectAttempt::Driver(candidate) => Ok(self.to_tiberius_config(candidate)),
            ConnectAttempt::LegacyConnectionString => {
                Config::from_ado_string(&self.legacy_connection_string())
                    .map_err(|e| DatabaseError::InvalidConfig(e.to_string()))
            }
        }
    }
}

/// Opens one connection for one attempt
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    type Conn: Send;

    async fn open(
        &self,
        config: &ConnectionConfig,
        attempt: &ConnectAttempt,
    ) -> Result<Self::Conn, DatabaseError>;

    /// Release a connection opened by `open`
    async fn close(&self, conn: Self::Conn);
}

/// A successful connection and the attempts that failed before it
pub struct Established<T> {
    pub conn: T,
    pub attempt: ConnectAttempt,
    pub failures: Vec<AttemptFailure>,
}

/// Walks the try-list with a connector
pub struct ConnectionEstablisher<C: Connector> {
    connector: C,
    config: ConnectionConfig,
}

impl<C: Connector> ConnectionEstablisher<C> {
    pub fn new(connector: C, config: ConnectionConfig) -> Self {
        Self { connector, config }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// One pass over the try-list
    async fn connect_round(
        &self,
        round: u32,
        failures: &mut Vec<AttemptFailure>,
    ) -> Option<(C::Conn, ConnectAttempt)> {
        for attempt in self.config.attempts() {
            let label = attempt.label();
            info!("Trying connection with {}", label);
            match self.connector.open(&self.config, &attempt).await {
                Ok(conn) => {
                    info!("Connected successfully using {}", label);
                    return Some((conn, attempt));
                }
                Err(e) => {
                    warn!("Failed with {}: {}", label, e);
                    failures.push(AttemptFailure {
                        attempt: label,
                        message: e.to_string(),
                        round,
                    });
                }
            }
        }
        None
    }

    /// Connect, repeating the whole try-list up to `connect_retries` more
    /// times with doubling backoff
    pub async fn connect(&self) -> Result<Established<C::Conn>, ConnectionError> {
        self.config.validate()?;

        let mut failures = Vec::new();
        let mut backoff = self.config.retry_backoff;

        for round in 0..=self.config.connect_retries {
            if round > 0 {
                warn!(
                    "All connection attempts failed, retrying in {:?} ({}/{})",
                    backoff, round, self.config.connect_retries
                );
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }

            if let Some((conn, attempt)) = self.connect_round(round, &mut failures).await {
                return Ok(Established {
                    conn,
                    attempt,
                    failures,
                });
            }
        }

        Err(ConnectionError::AllAttemptsFailed(failures))
    }
}
