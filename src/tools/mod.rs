//! Tools the agent can call against the request's database connection.
//!
//! The set is closed: [`ToolKind`] names every tool, and a step naming
//! anything else never reaches [`ToolRegistry::invoke`].
//!
//! Tool failures are data. Every invocation yields an [`Observation`]; errors
//! become `Error: ...` text the model can react to.

mod query;
mod schema;
pub mod sql_guard;

use std::fmt;

use thiserror::Error;

use crate::config::AgentConfig;
use crate::db::{DatabaseError, SqlDatabase};

pub use sql_guard::{check_read_only, UnsafeQuery};

/// The fixed tool set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    ListTables,
    DescribeTable,
    CheckQuery,
    ExecuteQuery,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [
        ToolKind::ListTables,
        ToolKind::DescribeTable,
        ToolKind::CheckQuery,
        ToolKind::ExecuteQuery,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::ListTables => "list_tables",
            Self::DescribeTable => "describe_table",
            Self::CheckQuery => "check_query",
            Self::ExecuteQuery => "execute_query",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::ListTables => {
                "Input is an empty string, output is a comma-separated list of tables in the database."
            }
            Self::DescribeTable => {
                "Input is a comma-separated list of tables, output is the schema and sample rows for those tables. Be sure that the tables actually exist by calling list_tables first! Example Input: table1, table2, table3"
            }
            Self::CheckQuery => {
                "Use this tool to double check if your query is correct before executing it. Input is a SQL query; the query is validated against the database without being run. Always use this tool before executing a query with execute_query!"
            }
            Self::ExecuteQuery => {
                "Input is a detailed and correct read-only SQL query, output is a result from the database. If the query is not correct, an error message will be returned. If an error is returned, rewrite the query, check the query, and try again. If you encounter an issue with Unknown column 'xxxx' in 'field list', use describe_table to query the correct table fields."
            }
        }
    }

    /// Resolve a tool name as written by the model.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name
            .trim()
            .trim_matches(|c: char| c == '`' || c == '"' || c == '\'');
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(normalized))
    }

    /// Comma-separated tool names, as shown in format instructions.
    pub fn names() -> String {
        Self::ALL
            .iter()
            .map(|k| k.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A resolved action: always one of the registered tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub tool: ToolKind,
    pub argument: String,
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unsafe query rejected: {0}")]
    UnsafeQueryRejected(#[from] UnsafeQuery),

    #[error("{0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Execution(#[from] DatabaseError),
}

/// Bounded text fed back to the model after a tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation(String);

impl Observation {
    /// Wrap `text`, truncating it to `max_len` bytes on a char boundary.
    pub fn bounded(text: impl Into<String>, max_len: usize) -> Self {
        let mut text = text.into();
        if text.len() > max_len {
            let end = safe_truncate_index(&text, max_len);
            text.truncate(end);
            text.push_str("\n... [output truncated]");
        }
        Self(text)
    }

    pub fn error(err: &ToolError, max_len: usize) -> Self {
        Self::bounded(format!("Error: {}", err), max_len)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_error(&self) -> bool {
        self.0.starts_with("Error:")
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Limits applied by the tools.
#[derive(Debug, Clone)]
pub struct ToolLimits {
    pub max_result_rows: usize,
    pub max_observation_chars: usize,
    pub sample_rows: usize,
}

impl From<&AgentConfig> for ToolLimits {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_result_rows: config.max_result_rows,
            max_observation_chars: config.max_observation_chars,
            sample_rows: config.sample_rows,
        }
    }
}

/// Dispatches resolved tool calls against a connection.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    limits: ToolLimits,
}

impl ToolRegistry {
    pub fn new(limits: ToolLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &ToolLimits {
        &self.limits
    }

    /// Run one tool. Never fails: errors are returned as observation text.
    pub async fn invoke(&self, call: &ToolCall, db: &dyn SqlDatabase) -> Observation {
        tracing::info!(
            "Calling tool: {} with input: {}",
            call.tool,
            truncate_for_log(&call.argument, 200)
        );

        let argument = clean_argument(&call.argument);
        let outcome = match call.tool {
            ToolKind::ListTables => schema::list_tables(db).await,
            ToolKind::DescribeTable => {
                schema::describe_table(db, &argument, self.limits.sample_rows).await
            }
            ToolKind::CheckQuery => query::check_query(db, &argument).await,
            ToolKind::ExecuteQuery => {
                query::execute_query(db, &argument, self.limits.max_result_rows).await
            }
        };

        match outcome {
            Ok(text) => Observation::bounded(text, self.limits.max_observation_chars),
            Err(err) => {
                match &err {
                    ToolError::UnsafeQueryRejected(reason) => {
                        tracing::warn!("Rejected unsafe query from {}: {}", call.tool, reason)
                    }
                    other => tracing::debug!("Tool {} failed: {}", call.tool, other),
                }
                Observation::error(&err, self.limits.max_observation_chars)
            }
        }
    }
}

/// Strip code fences and wrapping quotes the model tends to add.
pub fn clean_argument(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        let rest = rest.strip_prefix("sql").unwrap_or(rest);
        text = rest.strip_suffix("```").unwrap_or(rest).trim();
    }
    for quote in ['"', '\'', '`'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            let inner = &text[1..text.len() - 1];
            // Only unwrap when the quote is not part of the SQL itself.
            if !inner.contains(quote) {
                text = inner.trim();
            }
        }
    }
    text.to_string()
}

/// Returns a safe index to truncate a string at, ensuring we don't cut UTF-8 characters.
pub(crate) fn safe_truncate_index(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    let mut idx = max;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Truncate a string for logging purposes.
pub(crate) fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}... [truncated]", &s[..safe_truncate_index(s, max_len)])
    }
}
