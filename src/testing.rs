//! Test doubles shared by unit tests across modules.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;

use crate::db::{
    ConnectionDescriptor, ConnectionError, Connector, DatabaseError, Dialect, QueryResult,
    SqlDatabase, SqliteDatabase, TableDescription,
};
use crate::llm::{ChatMessage, ChatResponse, CompletionOptions, LlmClient, LlmError};

/// LLM that replays canned turns, then repeats `fallback` forever (or fails).
#[derive(Default)]
pub struct ScriptedLlm {
    turns: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Option<String>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedLlm {
    pub fn new<I, S>(turns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            turns: Mutex::new(turns.into_iter().map(|t| Ok(t.into())).collect()),
            ..Self::default()
        }
    }

    pub fn repeating(text: impl Into<String>) -> Self {
        Self {
            fallback: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn push_error(self, err: LlmError) -> Self {
        self.turns.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The user message of every call, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter_map(|messages| messages.last().map(|m| m.content.clone()))
            .collect()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> Result<ChatResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(messages.to_vec());
        let next = self.turns.lock().unwrap().pop_front();
        let content = match next {
            Some(turn) => turn?,
            None => self.fallback.clone().ok_or(LlmError::Empty)?,
        };
        Ok(ChatResponse {
            content,
            model: Some(model.to_string()),
        })
    }
}

/// Temp SQLite file with three customers and two invoices.
pub fn seeded_sqlite() -> tempfile::NamedTempFile {
    let file = tempfile::NamedTempFile::new().unwrap();
    let conn = Connection::open(file.path()).unwrap();
    conn.execute_batch(
        "CREATE TABLE customer (customer_id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT);
         INSERT INTO customer VALUES (1, 'John Doe', 'john.doe@example.com');
         INSERT INTO customer VALUES (2, 'Jane Smith', 'jane.smith@example.com');
         INSERT INTO customer VALUES (3, 'Alice Johnson', 'alice.johnson@example.com');
         CREATE TABLE invoice (invoice_id INTEGER PRIMARY KEY, customer_id INTEGER, invoice_date TEXT, total_amount REAL);
         INSERT INTO invoice VALUES (1, 1, '2023-01-15', 120.5);
         INSERT INTO invoice VALUES (2, 2, '2023-02-03', 75.0);",
    )
    .unwrap();
    file
}

/// Read-only handle on a seeded file.
pub fn open_sqlite(file: &tempfile::NamedTempFile) -> SqliteDatabase {
    let conn = Connection::open_with_flags(
        file.path(),
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
    )
    .unwrap();
    SqliteDatabase::new(conn)
}

pub fn customer_count(file: &tempfile::NamedTempFile) -> i64 {
    let conn = Connection::open(file.path()).unwrap();
    conn.query_row("SELECT COUNT(*) FROM customer", [], |row| row.get(0))
        .unwrap()
}

/// Wraps a database and records every statement that reaches it.
pub struct RecordingDatabase<D> {
    inner: D,
    statements: Mutex<Vec<String>>,
}

impl<D> RecordingDatabase<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            statements: Mutex::new(Vec::new()),
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

#[async_trait]
impl<D: SqlDatabase> SqlDatabase for RecordingDatabase<D> {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        self.inner.ping().await
    }

    async fn list_tables(&self) -> Result<Vec<String>, DatabaseError> {
        self.inner.list_tables().await
    }

    async fn describe_table(
        &self,
        table: &str,
        sample_rows: usize,
    ) -> Result<TableDescription, DatabaseError> {
        self.inner.describe_table(table, sample_rows).await
    }

    async fn check(&self, sql: &str) -> Result<(), DatabaseError> {
        self.statements.lock().unwrap().push(sql.to_string());
        self.inner.check(sql).await
    }

    async fn query(&self, sql: &str, max_rows: usize) -> Result<QueryResult, DatabaseError> {
        self.statements.lock().unwrap().push(sql.to_string());
        self.inner.query(sql, max_rows).await
    }
}

/// Connector that counts connects and live handles; used to prove validation
/// never connects and that every handle is released.
#[derive(Default, Clone)]
pub struct CountingConnector {
    pub connects: Arc<AtomicUsize>,
    pub open: Arc<AtomicUsize>,
    pub reachable: bool,
}

impl CountingConnector {
    pub fn reachable() -> Self {
        Self {
            reachable: true,
            ..Self::default()
        }
    }

    pub fn unreachable() -> Self {
        Self::default()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn open(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for CountingConnector {
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn SqlDatabase>, ConnectionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.reachable {
            return Err(ConnectionError::Unreachable(format!(
                "could not reach {}",
                descriptor.redacted_url()
            )));
        }
        let conn = Connection::open_in_memory()
            .map_err(|e| ConnectionError::Unreachable(e.to_string()))?;
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountedDatabase {
            inner: SqliteDatabase::new(conn),
            open: Arc::clone(&self.open),
        }))
    }
}

/// Handle issued by [`CountingConnector`]; decrements the live count on drop.
struct CountedDatabase {
    inner: SqliteDatabase,
    open: Arc<AtomicUsize>,
}

impl Drop for CountedDatabase {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SqlDatabase for CountedDatabase {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        self.inner.ping().await
    }

    async fn list_tables(&self) -> Result<Vec<String>, DatabaseError> {
        self.inner.list_tables().await
    }

    async fn describe_table(
        &self,
        table: &str,
        sample_rows: usize,
    ) -> Result<TableDescription, DatabaseError> {
        self.inner.describe_table(table, sample_rows).await
    }

    async fn check(&self, sql: &str) -> Result<(), DatabaseError> {
        self.inner.check(sql).await
    }

    async fn query(&self, sql: &str, max_rows: usize) -> Result<QueryResult, DatabaseError> {
        self.inner.query(sql, max_rows).await
    }
}

/// LLM whose calls never complete.
pub struct StalledLlm;

#[async_trait]
impl LlmClient for StalledLlm {
    async fn chat_completion(
        &self,
        _model: &str,
        _messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> Result<ChatResponse, LlmError> {
        std::future::pending().await
    }
}
