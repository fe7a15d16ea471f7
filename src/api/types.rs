//! API request and response types.

use serde::{Deserialize, Serialize};

use crate::answer::{AnswerRequest, ValidationError};
use crate::db::ConnectionParams;

/// `sql_port` arrives as either a JSON number or a string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(u64),
    Text(String),
}

impl PortValue {
    fn into_string(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

/// Connection fields shared by both POST endpoints.
#[derive(Clone, Default, Deserialize)]
pub struct ConnectionFields {
    pub sql_server: Option<String>,
    pub sql_port: Option<PortValue>,
    pub sql_database: Option<String>,
    pub sql_username: Option<String>,
    pub sql_password: Option<String>,
}

impl std::fmt::Debug for ConnectionFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionFields")
            .field("sql_server", &self.sql_server)
            .field("sql_port", &self.sql_port)
            .field("sql_database", &self.sql_database)
            .field("sql_username", &self.sql_username.as_ref().map(|_| "***"))
            .field("sql_password", &self.sql_password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl ConnectionFields {
    /// Presence check only; empty values are rejected when the descriptor is built.
    pub fn into_params(self) -> Result<ConnectionParams, ValidationError> {
        Ok(ConnectionParams {
            host: self
                .sql_server
                .ok_or(ValidationError::MissingField("sql_server"))?,
            port: self
                .sql_port
                .map(PortValue::into_string)
                .ok_or(ValidationError::MissingField("sql_port"))?,
            database: self
                .sql_database
                .ok_or(ValidationError::MissingField("sql_database"))?,
            username: self
                .sql_username
                .ok_or(ValidationError::MissingField("sql_username"))?,
            password: self
                .sql_password
                .ok_or(ValidationError::MissingField("sql_password"))?,
        })
    }
}

/// Body of `POST /api/sqlanswer`.
#[derive(Debug, Clone, Deserialize)]
pub struct SqlAnswerRequest {
    pub question: Option<String>,

    #[serde(flatten)]
    pub connection: ConnectionFields,
}

impl SqlAnswerRequest {
    pub fn into_request(self) -> Result<AnswerRequest, ValidationError> {
        let question = self
            .question
            .ok_or(ValidationError::MissingField("question"))?;
        Ok(AnswerRequest {
            question,
            connection: self.connection.into_params()?,
        })
    }
}

/// Successful answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Any failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Result of a connection test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
