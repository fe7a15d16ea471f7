//! Database collaborator: connection factory and driver backends.
//!
//! The agent never talks to a driver directly. It receives a boxed
//! [`SqlDatabase`] from a [`Connector`]; dropping the box releases the
//! underlying connection, so every exit path (including cancellation of the
//! request future) gives the connection back.

mod connection;
mod postgres;
mod sqlite;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::DatabaseConfig;

pub use connection::{
    ConfigError, ConnectionDescriptor, ConnectionError, ConnectionFactory, ConnectionParams,
    CONNECTION_OK,
};
pub use postgres::{PostgresConnector, PostgresDatabase};
pub use sqlite::{SqliteConnector, SqliteDatabase};

/// Driver used for every request. Fixed by configuration, never by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Postgres,
    Sqlite,
}

impl Driver {
    pub fn dialect(self) -> Dialect {
        match self {
            Self::Postgres => Dialect::PostgreSql,
            Self::Sqlite => Dialect::Sqlite,
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => write!(f, "postgres"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl FromStr for Driver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            other => Err(format!("unsupported driver: {}", other)),
        }
    }
}

/// SQL dialect the prompt steers the model towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    PostgreSql,
    Sqlite,
}

impl Dialect {
    pub fn name(self) -> &'static str {
        match self {
            Self::PostgreSql => "PostgreSQL",
            Self::Sqlite => "SQLite",
        }
    }

    /// Syntax notes appended to the few-shot block.
    pub fn notes(self) -> &'static str {
        match self {
            Self::PostgreSql => {
                "Note the use of LIMIT at the end of the query to restrict rows, ILIKE for case-insensitive matching, and date literals such as DATE '2024-01-31'."
            }
            Self::Sqlite => {
                "Note the use of LIMIT at the end of the query to restrict rows, and that dates are stored as ISO-8601 text compared with BETWEEN or strftime()."
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("{0}")]
    Driver(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("statement is not read-only")]
    NotReadOnly,

    #[error("query timed out after {0} seconds")]
    Timeout(u64),
}

/// A single cell value, rendered the way the few-shot results are written.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    /// Numeric text from a driver that only reports textual values
    Numeric(String),
    Text(String),
    Blob(usize),
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "None"),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Real(v) => write!(f, "{}", v),
            Self::Numeric(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "'{}'", v.replace('\'', "\\'")),
            Self::Blob(len) => write!(f, "<{} bytes>", len),
        }
    }
}

/// Rows returned by a query, capped at the caller's row limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
    /// More rows were available than the cap allowed
    pub truncated: bool,
}

impl QueryResult {
    /// Tab-separated header plus rows, used for table samples.
    pub fn to_tsv(&self) -> String {
        let mut out = self.columns.join("\t");
        for row in &self.rows {
            out.push('\n');
            let cells: Vec<String> = row
                .iter()
                .map(|v| match v {
                    SqlValue::Text(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            out.push_str(&cells.join("\t"));
        }
        out
    }
}

/// Renders rows as a list of tuples: `[(1, 'John Doe'), (2, 'Jane Smith')]`.
impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "(")?;
            for (j, value) in row.iter().enumerate() {
                if j > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", value)?;
            }
            if row.len() == 1 {
                write!(f, ",")?;
            }
            write!(f, ")")?;
        }
        write!(f, "]")
    }
}

/// Schema and sample rows for one table.
#[derive(Debug, Clone)]
pub struct TableDescription {
    pub name: String,
    pub ddl: String,
    pub sample: QueryResult,
}

/// Operations the agent tools need from a live connection.
#[async_trait]
pub trait SqlDatabase: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Cheap round trip proving the connection works.
    async fn ping(&self) -> Result<(), DatabaseError>;

    async fn list_tables(&self) -> Result<Vec<String>, DatabaseError>;

    async fn describe_table(
        &self,
        table: &str,
        sample_rows: usize,
    ) -> Result<TableDescription, DatabaseError>;

    /// Prepare the statement without executing it.
    async fn check(&self, sql: &str) -> Result<(), DatabaseError>;

    /// Execute a read-only statement, returning at most `max_rows` rows.
    async fn query(&self, sql: &str, max_rows: usize) -> Result<QueryResult, DatabaseError>;
}

/// Opens connections. The returned handle owns the connection.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn SqlDatabase>, ConnectionError>;
}

/// Build the connector for the configured driver.
pub fn connector_for(config: &DatabaseConfig) -> Arc<dyn Connector> {
    match config.driver {
        Driver::Postgres => Arc::new(PostgresConnector::new(
            config.connect_timeout,
            config.query_timeout,
        )),
        Driver::Sqlite => Arc::new(SqliteConnector::new()),
    }
}

/// Quote an identifier for interpolation into generated SQL.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
