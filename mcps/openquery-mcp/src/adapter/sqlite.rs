//! SQLite backend
//!
//! The connection string is a filesystem path (`database` parameter).
//! rusqlite is synchronous, so every call runs on the blocking pool; the
//! connection is opened there and dropped when the closure returns.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::Connection;

use crate::error::{OpenQueryError, Result};
use crate::types::{ColumnInfo, ConnectionConfig, Dialect, QueryResult, TableSchema};

use super::quote_ident;

pub struct SqliteAdapter {
    path: PathBuf,
    timeout: Duration,
}

impl SqliteAdapter {
    pub fn new(config: &ConnectionConfig, timeout: Duration) -> Result<Self> {
        let path = config.param("database")?;
        Ok(Self {
            path: PathBuf::from(path),
            timeout,
        })
    }

    /// Open a connection, run `f` on the blocking pool, close on return
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        let busy = self.timeout;
        let work = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path)?;
            conn.busy_timeout(busy)?;
            f(&conn)
        });

        match tokio::time::timeout(self.timeout, work).await {
            Err(_) => Err(OpenQueryError::QueryTimeout(self.timeout.as_secs())),
            Ok(joined) => {
                joined.map_err(|e| OpenQueryError::DataAccess(format!("worker failed: {}", e)))?
            }
        }
    }
}

/// Decode one rusqlite value into JSON
fn value_to_json(value: rusqlite::types::Value) -> serde_json::Value {
    match value {
        rusqlite::types::Value::Null => serde_json::Value::Null,
        rusqlite::types::Value::Integer(i) => serde_json::json!(i),
        rusqlite::types::Value::Real(f) => serde_json::json!(f),
        rusqlite::types::Value::Text(s) => serde_json::Value::String(s),
        rusqlite::types::Value::Blob(b) => {
            serde_json::Value::String(format!("<blob {} bytes>", b.len()))
        }
    }
}

fn run_query(conn: &Connection, sql: &str) -> Result<QueryResult> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let n = columns.len();

    let rows = stmt
        .query_map([], |row| {
            let mut values = Vec::with_capacity(n);
            for i in 0..n {
                let value: rusqlite::types::Value = row.get(i)?;
                values.push(value_to_json(value));
            }
            Ok(values)
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(QueryResult { columns, rows })
}

#[async_trait]
impl super::DatabaseAdapter for SqliteAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        let sql = sql.to_string();
        self.with_conn(move |conn| run_query(conn, &sql)).await
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master WHERE type = 'table' \
                 AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )?;
            let tables = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(tables)
        })
        .await
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let table = table.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "PRAGMA table_info('{}')",
                table.replace('\'', "''")
            ))?;
            let columns = stmt
                .query_map([], |row| {
                    Ok(ColumnInfo {
                        name: row.get(1)?,
                        data_type: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            if columns.is_empty() {
                return Err(OpenQueryError::DataAccess(format!(
                    "table '{}' not found",
                    table
                )));
            }
            Ok(columns)
        })
        .await
    }

    async fn sample_rows(&self, table: &str, limit: u32) -> Result<QueryResult> {
        let sql = format!("SELECT * FROM {} LIMIT {}", quote_ident(table), limit);
        self.with_conn(move |conn| run_query(conn, &sql)).await
    }

    async fn export_schema(&self) -> Result<Vec<TableSchema>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, sql FROM sqlite_master WHERE type = 'table' \
                 AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )?;
            let schemas = stmt
                .query_map([], |row| {
                    Ok(TableSchema {
                        table: row.get(0)?,
                        ddl: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(schemas)
        })
        .await
    }
}
