//! Connection descriptors built from per-request credentials.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::{Connector, Driver, SqlDatabase};

/// Status string returned by a successful connection test.
pub const CONNECTION_OK: &str = "Connection successful";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required connection parameter: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidField(&'static str, String),
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Unreachable(String),

    #[error("timed out after {0} seconds")]
    Timeout(u64),
}

/// Credentials supplied with a request. Lives for one request only.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &"***")
            .field("password", &"***")
            .finish()
    }
}

/// Validated connection target handed to a [`Connector`].
#[derive(Clone)]
pub struct ConnectionDescriptor {
    pub driver: Driver,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

impl ConnectionDescriptor {
    /// Connection URL with the password masked, safe for logs.
    pub fn redacted_url(&self) -> String {
        match self.driver {
            Driver::Postgres => format!(
                "postgres://***:***@{}:{}/{}",
                self.host, self.port, self.database
            ),
            Driver::Sqlite => format!("sqlite://{}", self.database),
        }
    }

    /// Remove credential values from text that is about to leave the db layer.
    /// Only whole-token occurrences are masked, so short credentials do not
    /// shred unrelated words.
    pub fn scrub(&self, text: &str) -> String {
        let mut cleaned = text.to_string();
        for secret in [&self.password, &self.username] {
            if !secret.is_empty() {
                cleaned = mask_token(&cleaned, secret);
            }
        }
        cleaned
    }
}

fn mask_token(text: &str, secret: &str) -> String {
    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    for (start, _) in text.match_indices(secret) {
        let end = start + secret.len();
        if is_word(text[..start].chars().next_back()) || is_word(text[end..].chars().next()) {
            continue;
        }
        out.push_str(&text[copied..start]);
        out.push_str("***");
        copied = end;
    }
    out.push_str(&text[copied..]);
    out
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted_url())
    }
}

/// Builds descriptors for the configured driver and opens connections.
#[derive(Clone)]
pub struct ConnectionFactory {
    driver: Driver,
    connector: Arc<dyn Connector>,
}

impl ConnectionFactory {
    pub fn new(driver: Driver, connector: Arc<dyn Connector>) -> Self {
        Self { driver, connector }
    }

    /// Assemble a descriptor. Pure: no network access.
    pub fn build(&self, params: &ConnectionParams) -> Result<ConnectionDescriptor, ConfigError> {
        let host = required("sql_server", &params.host)?;
        let port_raw = required("sql_port", &params.port)?;
        let database = required("sql_database", &params.database)?;
        let username = required("sql_username", &params.username)?;
        required("sql_password", &params.password)?;

        let port = port_raw
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidField("sql_port", e.to_string()))?;
        if port == 0 {
            return Err(ConfigError::InvalidField(
                "sql_port",
                "port must be non-zero".to_string(),
            ));
        }

        Ok(ConnectionDescriptor {
            driver: self.driver,
            host: host.to_string(),
            port,
            database: database.to_string(),
            username: username.to_string(),
            // Passwords may legitimately carry surrounding whitespace.
            password: params.password.clone(),
        })
    }

    /// Build a descriptor and open a connection. Dropping the handle closes it.
    pub async fn open(
        &self,
        params: &ConnectionParams,
    ) -> Result<Box<dyn SqlDatabase>, ConnectionError> {
        let descriptor = self.build(params)?;
        tracing::debug!("Opening connection to {}", descriptor.redacted_url());
        self.connector.connect(&descriptor).await
    }

    /// Open a connection, round-trip once and release it.
    pub async fn validate(&self, params: &ConnectionParams) -> Result<(), ConnectionError> {
        let descriptor = self.build(params)?;
        let db = self.connector.connect(&descriptor).await?;
        let outcome = db
            .ping()
            .await
            .map_err(|e| ConnectionError::Unreachable(descriptor.scrub(&e.to_string())));
        drop(db);
        outcome
    }

    /// Connection test for the HTTP surface. Never fails; reports a status line.
    pub async fn validation_status(&self, params: &ConnectionParams) -> String {
        match self.validate(params).await {
            Ok(()) => CONNECTION_OK.to_string(),
            Err(e) => {
                tracing::warn!("Connection test failed: {}", e);
                format!("Connection Error: {}", e)
            }
        }
    }
}

fn required<'a>(name: &'static str, value: &'a str) -> Result<&'a str, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ConfigError::MissingField(name))
    } else {
        Ok(trimmed)
    }
}
