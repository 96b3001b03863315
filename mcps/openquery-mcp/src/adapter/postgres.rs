//! PostgreSQL backend
//!
//! The connection string assembles host/port/database/credentials/TLS mode
//! from the connection parameters. Introspection goes through the standard
//! `information_schema` views. Each call connects, runs, and drops the
//! client; dropping the client ends the connection task.

use std::time::Duration;

use async_trait::async_trait;
use tokio_postgres::types::Type;
use tokio_postgres::{Client, NoTls, Row};

use crate::error::{OpenQueryError, Result};
use crate::types::{ColumnInfo, ConnectionConfig, Dialect, QueryResult, TableSchema};

use super::quote_ident;

pub struct PostgresAdapter {
    conn_string: String,
    timeout: Duration,
}

impl PostgresAdapter {
    pub fn new(config: &ConnectionConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            conn_string: conn_string(config)?,
            timeout,
        })
    }

    /// Connect and spawn the connection driver; the client is dropped by
    /// the caller when the call completes, which terminates the driver.
    async fn client(&self) -> Result<Client> {
        let connect = tokio_postgres::connect(&self.conn_string, NoTls);
        let (client, connection) = tokio::time::timeout(self.timeout, connect)
            .await
            .map_err(|_| OpenQueryError::QueryTimeout(self.timeout.as_secs()))??;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!("postgres connection closed: {}", e);
            }
        });

        Ok(client)
    }

    async fn run(&self, sql: &str, params: &[&(dyn tokio_postgres::types::ToSql + Sync)]) -> Result<QueryResult> {
        let client = self.client().await?;

        let work = async {
            let stmt = client.prepare(sql).await?;
            let columns: Vec<String> = stmt.columns().iter().map(|c| c.name().to_string()).collect();
            let rows = client.query(&stmt, params).await?;
            let decoded = rows
                .iter()
                .map(row_to_json)
                .collect::<Result<Vec<_>>>()?;
            Ok::<_, OpenQueryError>(QueryResult {
                columns,
                rows: decoded,
            })
        };

        tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| OpenQueryError::QueryTimeout(self.timeout.as_secs()))?
    }
}

/// Assemble a key=value connection string from the directory entry
///
/// `host` and `database` are required; `port`, `username`, `password`, and
/// `sslmode` are optional (`sslmode` defaults to `prefer`, which lets the
/// server negotiate down to plaintext when TLS is not configured).
fn conn_string(config: &ConnectionConfig) -> Result<String> {
    let host = config.param("host")?;
    let database = config.param("database")?;
    let port = config.param_or("port", "5432");
    let sslmode = config.param_or("sslmode", "prefer");

    let mut parts = vec![
        format!("host={}", host),
        format!("port={}", port),
        format!("dbname={}", database),
        format!("sslmode={}", sslmode),
    ];
    if let Some(user) = config.params.get("username") {
        parts.push(format!("user={}", user));
    }
    if let Some(password) = config.params.get("password") {
        parts.push(format!("password={}", password));
    }
    Ok(parts.join(" "))
}

/// Decode one row into JSON values, dispatching on the column's type
fn row_to_json(row: &Row) -> Result<Vec<serde_json::Value>> {
    let mut values = Vec::with_capacity(row.columns().len());
    for (idx, col) in row.columns().iter().enumerate() {
        let value = match *col.type_() {
            Type::BOOL => row
                .try_get::<_, Option<bool>>(idx)?
                .map(|v| serde_json::json!(v)),
            Type::INT2 => row
                .try_get::<_, Option<i16>>(idx)?
                .map(|v| serde_json::json!(v)),
            Type::INT4 => row
                .try_get::<_, Option<i32>>(idx)?
                .map(|v| serde_json::json!(v)),
            Type::INT8 => row
                .try_get::<_, Option<i64>>(idx)?
                .map(|v| serde_json::json!(v)),
            Type::FLOAT4 => row
                .try_get::<_, Option<f32>>(idx)?
                .map(|v| serde_json::json!(v)),
            Type::FLOAT8 => row
                .try_get::<_, Option<f64>>(idx)?
                .map(|v| serde_json::json!(v)),
            Type::BYTEA => row
                .try_get::<_, Option<Vec<u8>>>(idx)?
                .map(|v| serde_json::Value::String(format!("<bytea {} bytes>", v.len()))),
            _ => row
                .try_get::<_, Option<String>>(idx)?
                .map(serde_json::Value::String),
        };
        values.push(value.unwrap_or(serde_json::Value::Null));
    }
    Ok(values)
}

#[async_trait]
impl super::DatabaseAdapter for PostgresAdapter {
    fn dialect(&self) -> Dialect {
        Dialect::Postgresql
    }

    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        self.run(sql, &[]).await
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let result = self
            .run(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
                 ORDER BY table_name",
                &[],
            )
            .await?;
        Ok(result
            .rows
            .into_iter()
            .filter_map(|mut row| match row.pop() {
                Some(serde_json::Value::String(name)) => Some(name),
                _ => None,
            })
            .collect())
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let result = self
            .run(
                "SELECT column_name, data_type FROM information_schema.columns \
                 WHERE table_schema = 'public' AND table_name = $1 \
                 ORDER BY ordinal_position",
                &[&table],
            )
            .await?;

        if result.rows.is_empty() {
            return Err(OpenQueryError::DataAccess(format!(
                "table '{}' not found",
                table
            )));
        }

        Ok(result
            .rows
            .into_iter()
            .map(|row| ColumnInfo {
                name: match row.first() {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    _ => String::new(),
                },
                data_type: match row.get(1) {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    _ => String::new(),
                },
            })
            .collect())
    }

    async fn sample_rows(&self, table: &str, limit: u32) -> Result<QueryResult> {
        let sql = format!("SELECT * FROM {} LIMIT {}", quote_ident(table), limit);
        self.run(&sql, &[]).await
    }

    async fn export_schema(&self) -> Result<Vec<TableSchema>> {
        // information_schema carries no CREATE statements; reconstruct a
        // readable column listing per table instead.
        let mut schemas = Vec::new();
        for table in self.list_tables().await? {
            let columns = self.list_columns(&table).await?;
            let body = columns
                .iter()
                .map(|c| format!("    {} {}", c.name, c.data_type))
                .collect::<Vec<_>>()
                .join(",\n");
            schemas.push(TableSchema {
                ddl: format!("CREATE TABLE {} (\n{}\n)", table, body),
                table,
            });
        }
        Ok(schemas)
    }
}
