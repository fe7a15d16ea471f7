//! PostgreSQL backend over `tokio-postgres`.
//!
//! Every statement the agent executes runs inside a `READ ONLY` transaction
//! that is rolled back afterwards, so the server itself refuses writes even if
//! a statement slips past the keyword guard.

use std::time::Duration;

use async_trait::async_trait;
use futures::{pin_mut, Stream, TryStreamExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls, SimpleQueryMessage, SimpleQueryRow};

use super::{
    quote_ident, ConnectionDescriptor, ConnectionError, Connector, DatabaseError, Dialect,
    QueryResult, SqlDatabase, SqlValue, TableDescription,
};

/// Opens one PostgreSQL connection per request.
pub struct PostgresConnector {
    connect_timeout: Duration,
    query_timeout: Duration,
}

impl PostgresConnector {
    pub fn new(connect_timeout: Duration, query_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            query_timeout,
        }
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn SqlDatabase>, ConnectionError> {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&descriptor.host)
            .port(descriptor.port)
            .dbname(&descriptor.database)
            .user(&descriptor.username)
            .password(&descriptor.password)
            .application_name("sql_answer")
            .connect_timeout(self.connect_timeout);

        let (client, connection) = tokio::time::timeout(self.connect_timeout, pg.connect(NoTls))
            .await
            .map_err(|_| ConnectionError::Timeout(self.connect_timeout.as_secs()))?
            .map_err(|e| ConnectionError::Unreachable(descriptor.scrub(&pg_message(&e))))?;

        let driver_task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!("PostgreSQL connection closed with error: {}", e);
            }
        });

        Ok(Box::new(PostgresDatabase {
            client: Mutex::new(client),
            driver_task,
            query_timeout: self.query_timeout,
        }))
    }
}

/// A live PostgreSQL connection. Dropping it closes the socket.
pub struct PostgresDatabase {
    client: Mutex<Client>,
    driver_task: JoinHandle<()>,
    query_timeout: Duration,
}

impl Drop for PostgresDatabase {
    fn drop(&mut self) {
        self.driver_task.abort();
    }
}

impl PostgresDatabase {
    /// Run `sql` through the simple-query protocol inside a read-only
    /// transaction, keeping at most `max_rows` rows. Rows are streamed, so a
    /// large result is never held in memory.
    async fn read_only_rows(&self, sql: &str, max_rows: usize) -> Result<QueryResult, DatabaseError> {
        let mut client = self.client.lock().await;
        let cancel = client.cancel_token();

        let run = async {
            let txn = client
                .build_transaction()
                .read_only(true)
                .start()
                .await
                .map_err(pg_error)?;
            txn.batch_execute(&format!(
                "SET LOCAL statement_timeout = {}",
                self.query_timeout.as_millis()
            ))
            .await
            .map_err(pg_error)?;
            let messages = txn.client().simple_query_raw(sql).await.map_err(pg_error)?;
            let rows = messages.try_filter_map(|message| async move {
                Ok(match message {
                    SimpleQueryMessage::Row(row) => Some(row),
                    _ => None,
                })
            });
            let result = collect_capped(rows, max_rows).await.map_err(pg_error)?;
            txn.rollback().await.map_err(pg_error)?;
            Ok::<_, DatabaseError>(result)
        };

        match tokio::time::timeout(self.query_timeout, run).await {
            Ok(result) => result,
            Err(_) => {
                if let Err(e) = cancel.cancel_query(NoTls).await {
                    tracing::warn!("Failed to cancel timed out query: {}", e);
                }
                Err(DatabaseError::Timeout(self.query_timeout.as_secs()))
            }
        }
    }
}

/// A result row whose values arrive as text.
trait TextRow {
    fn column_names(&self) -> Vec<String>;
    fn values(&self) -> Vec<SqlValue>;
}

impl TextRow for SimpleQueryRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn values(&self) -> Vec<SqlValue> {
        (0..self.len()).map(|i| text_value(self.get(i))).collect()
    }
}

/// Pull rows until the stream ends or one row past `max_rows` arrives. The
/// remainder of the result is never read.
async fn collect_capped<S, R, E>(rows: S, max_rows: usize) -> Result<QueryResult, E>
where
    S: Stream<Item = Result<R, E>>,
    R: TextRow,
{
    pin_mut!(rows);
    let mut result = QueryResult::default();
    while let Some(row) = rows.try_next().await? {
        if result.columns.is_empty() {
            result.columns = row.column_names();
        }
        if result.rows.len() == max_rows {
            result.truncated = true;
            break;
        }
        result.rows.push(row.values());
    }
    Ok(result)
}

#[async_trait]
impl SqlDatabase for PostgresDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::PostgreSql
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        let client = self.client.lock().await;
        client.simple_query("SELECT 1").await.map_err(pg_error)?;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>, DatabaseError> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT table_name::text FROM information_schema.tables \
                 WHERE table_schema = current_schema() \
                 AND table_type IN ('BASE TABLE', 'VIEW') \
                 ORDER BY table_name",
                &[],
            )
            .await
            .map_err(pg_error)?;
        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    async fn describe_table(
        &self,
        table: &str,
        sample_rows: usize,
    ) -> Result<TableDescription, DatabaseError> {
        let columns = {
            let client = self.client.lock().await;
            client
                .query(
                    "SELECT column_name::text, data_type::text, is_nullable::text \
                     FROM information_schema.columns \
                     WHERE table_schema = current_schema() AND table_name = $1 \
                     ORDER BY ordinal_position",
                    &[&table],
                )
                .await
                .map_err(pg_error)?
        };
        if columns.is_empty() {
            return Err(DatabaseError::TableNotFound(table.to_string()));
        }

        let definitions: Vec<String> = columns
            .iter()
            .map(|row| {
                let name: String = row.get(0);
                let data_type: String = row.get(1);
                let nullable: String = row.get(2);
                if nullable == "NO" {
                    format!("\t{} {} NOT NULL", name, data_type)
                } else {
                    format!("\t{} {}", name, data_type)
                }
            })
            .collect();
        let ddl = format!("CREATE TABLE {} (\n{}\n)", table, definitions.join(",\n"));

        let sample = self
            .read_only_rows(
                &format!("SELECT * FROM {} LIMIT {}", quote_ident(table), sample_rows),
                sample_rows,
            )
            .await?;

        Ok(TableDescription {
            name: table.to_string(),
            ddl,
            sample,
        })
    }

    async fn check(&self, sql: &str) -> Result<(), DatabaseError> {
        let client = self.client.lock().await;
        client.prepare(sql).await.map_err(pg_error)?;
        Ok(())
    }

    async fn query(&self, sql: &str, max_rows: usize) -> Result<QueryResult, DatabaseError> {
        self.read_only_rows(sql, max_rows).await
    }
}

/// The simple-query protocol reports every value as text.
fn text_value(raw: Option<&str>) -> SqlValue {
    match raw {
        None => SqlValue::Null,
        Some(text) => {
            if let Ok(v) = text.parse::<i64>() {
                SqlValue::Integer(v)
            } else if text.parse::<f64>().is_ok() && !text.contains(['e', 'E', 'n', 'N']) {
                SqlValue::Numeric(text.to_string())
            } else {
                SqlValue::Text(text.to_string())
            }
        }
    }
}

fn pg_message(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => db.message().to_string(),
        None => e.to_string(),
    }
}

fn pg_error(e: tokio_postgres::Error) -> DatabaseError {
    if let Some(db) = e.as_db_error() {
        if db.code() == &tokio_postgres::error::SqlState::READ_ONLY_SQL_TRANSACTION {
            return DatabaseError::NotReadOnly;
        }
    }
    DatabaseError::Driver(pg_message(&e))
}
