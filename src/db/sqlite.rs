//! SQLite backend over `rusqlite`, for local databases and tests.
//!
//! The file is opened with `SQLITE_OPEN_READ_ONLY` and every statement must
//! report `readonly()` before it is stepped.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension};

use super::{
    quote_ident, ConnectionDescriptor, ConnectionError, Connector, DatabaseError, Dialect,
    QueryResult, SqlDatabase, SqlValue, TableDescription,
};

/// Opens the database file named by the descriptor's `database` field.
/// Host, port and credentials are validated upstream but unused here.
#[derive(Debug, Default)]
pub struct SqliteConnector;

impl SqliteConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Box<dyn SqlDatabase>, ConnectionError> {
        let conn = Connection::open_with_flags(
            &descriptor.database,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| ConnectionError::Unreachable(descriptor.scrub(&e.to_string())))?;
        Ok(Box::new(SqliteDatabase::new(conn)))
    }
}

pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl SqliteDatabase {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn
            .lock()
            .map_err(|_| DatabaseError::Driver("connection lock poisoned".to_string()))
    }

    fn rows(conn: &Connection, sql: &str, max_rows: usize) -> Result<QueryResult, DatabaseError> {
        let mut stmt = conn.prepare(sql)?;
        if !stmt.readonly() {
            return Err(DatabaseError::NotReadOnly);
        }
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut result = QueryResult {
            columns,
            ..QueryResult::default()
        };
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            if result.rows.len() == max_rows {
                result.truncated = true;
                break;
            }
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(sqlite_value(row.get_ref(i)?));
            }
            result.rows.push(values);
        }
        Ok(result)
    }
}

#[async_trait]
impl SqlDatabase for SqliteDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>, DatabaseError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    async fn describe_table(
        &self,
        table: &str,
        sample_rows: usize,
    ) -> Result<TableDescription, DatabaseError> {
        let conn = self.lock()?;
        let ddl: Option<String> = conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .optional()?;
        let ddl = ddl.ok_or_else(|| DatabaseError::TableNotFound(table.to_string()))?;

        let sample = Self::rows(
            &conn,
            &format!("SELECT * FROM {} LIMIT {}", quote_ident(table), sample_rows),
            sample_rows,
        )?;

        Ok(TableDescription {
            name: table.to_string(),
            ddl,
            sample,
        })
    }

    async fn check(&self, sql: &str) -> Result<(), DatabaseError> {
        let conn = self.lock()?;
        conn.prepare(sql)?;
        Ok(())
    }

    async fn query(&self, sql: &str, max_rows: usize) -> Result<QueryResult, DatabaseError> {
        let conn = self.lock()?;
        Self::rows(&conn, sql, max_rows)
    }
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(e: rusqlite::Error) -> Self {
        DatabaseError::Driver(e.to_string())
    }
}

fn sqlite_value(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Integer(v),
        ValueRef::Real(v) => SqlValue::Real(v),
        ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => SqlValue::Blob(bytes.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Driver;

    fn seeded() -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        let conn = Connection::open(file.path()).expect("open");
        conn.execute_batch(
            "CREATE TABLE customer (customer_id INTEGER PRIMARY KEY, name TEXT, email TEXT);
             INSERT INTO customer VALUES (1, 'John Doe', 'john.doe@example.com');
             INSERT INTO customer VALUES (2, 'Jane Smith', 'jane.smith@example.com');
             INSERT INTO customer VALUES (3, 'Alice Johnson', NULL);
             CREATE TABLE invoice (invoice_id INTEGER PRIMARY KEY, customer_id INTEGER, total_amount REAL);",
        )
        .expect("seed");
        file
    }

    fn descriptor(path: &str) -> ConnectionDescriptor {
        ConnectionDescriptor {
            driver: Driver::Sqlite,
            host: "localhost".into(),
            port: 1,
            database: path.to_string(),
            username: "reader".into(),
            password: "pw".into(),
        }
    }

    async fn open(file: &tempfile::NamedTempFile) -> Box<dyn SqlDatabase> {
        match SqliteConnector::new()
            .connect(&descriptor(&file.path().to_string_lossy()))
            .await
        {
            Ok(db) => db,
            Err(e) => panic!("connect failed: {}", e),
        }
    }

    #[tokio::test]
    async fn lists_and_describes_tables() {
        let file = seeded();
        let db = open(&file).await;

        assert_eq!(db.list_tables().await.unwrap(), vec!["customer", "invoice"]);

        let description = db.describe_table("customer", 2).await.unwrap();
        assert!(description.ddl.starts_with("CREATE TABLE customer"));
        assert_eq!(description.sample.rows.len(), 2);

        let missing = db.describe_table("nope", 3).await.unwrap_err();
        assert!(matches!(missing, DatabaseError::TableNotFound(_)));
    }

    #[tokio::test]
    async fn query_caps_rows() {
        let file = seeded();
        let db = open(&file).await;

        let result = db
            .query("SELECT customer_id, name FROM customer ORDER BY customer_id", 2)
            .await
            .unwrap();
        assert_eq!(result.columns, vec!["customer_id", "name"]);
        assert_eq!(result.rows.len(), 2);
        assert!(result.truncated);
        assert_eq!(result.to_string(), "[(1, 'John Doe'), (2, 'Jane Smith')]");
    }

    #[tokio::test]
    async fn writes_are_refused_by_the_driver() {
        let file = seeded();
        let db = open(&file).await;

        let err = db.query("DELETE FROM customer", 5).await.unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::NotReadOnly | DatabaseError::Driver(_)
        ));
        let count = db.query("SELECT COUNT(*) FROM customer", 5).await.unwrap();
        assert_eq!(count.to_string(), "[(3,)]");
    }

    #[tokio::test]
    async fn check_prepares_without_running() {
        let file = seeded();
        let db = open(&file).await;

        assert!(db.check("SELECT name FROM customer").await.is_ok());
        assert!(db.check("SELECT nam FROM customer").await.is_err());
        assert!(db.check("SELEC name FROM customer").await.is_err());
    }

    #[tokio::test]
    async fn missing_file_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.db");
        let result = SqliteConnector::new()
            .connect(&descriptor(&path.to_string_lossy()))
            .await;
        assert!(matches!(result, Err(ConnectionError::Unreachable(_))));
    }
}
