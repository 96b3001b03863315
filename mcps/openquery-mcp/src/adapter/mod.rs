//! Database adapters
//!
//! Uniform interface over heterogeneous SQL backends. An adapter holds
//! connection *parameters*, not a live connection: every call opens a fresh
//! connection and releases it when the call returns (scoped acquisition,
//! no pooling, no retry). Each execution runs under a bounded timeout;
//! expiry surfaces as `QueryTimeout`, distinct from other data-access
//! failures.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ColumnInfo, ConnectionConfig, Dialect, QueryResult, TableSchema};

pub mod postgres;
pub mod sqlite;

use postgres::PostgresAdapter;
use sqlite::SqliteAdapter;

/// Capability set every database backend implements
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// The dialect this adapter speaks
    fn dialect(&self) -> Dialect;

    /// Execute a query and return `(rows, column_names)`
    async fn execute(&self, sql: &str) -> Result<QueryResult>;

    /// List table names
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// List a table's columns with their declared types
    async fn list_columns(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Fetch up to `limit` rows from a table
    async fn sample_rows(&self, table: &str, limit: u32) -> Result<QueryResult>;

    /// Export per-table DDL
    async fn export_schema(&self) -> Result<Vec<TableSchema>>;
}

/// Build an adapter for the given connection settings
///
/// Dispatches on the dialect tag. Parameter problems (a missing path or
/// host) fail here, before any connection attempt.
pub fn connect(config: &ConnectionConfig, timeout: Duration) -> Result<Box<dyn DatabaseAdapter>> {
    match config.dialect {
        Dialect::Sqlite => Ok(Box::new(SqliteAdapter::new(config, timeout)?)),
        Dialect::Postgresql => Ok(Box::new(PostgresAdapter::new(config, timeout)?)),
    }
}

/// Quote an identifier for interpolation into introspection SQL
///
/// Doubles embedded double quotes per the SQL standard. Introspection
/// statements (sample rows, pragma lookups) take table names from tool
/// callers and cannot use bind parameters for identifiers.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn quote_ident_doubles_quotes() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn connect_dispatches_on_dialect() {
        let config = ConnectionConfig {
            dialect: Dialect::Sqlite,
            params: BTreeMap::from([("database".to_string(), "x.db".to_string())]),
        };
        let adapter = connect(&config, Duration::from_secs(5)).unwrap();
        assert_eq!(adapter.dialect(), Dialect::Sqlite);
    }

    #[test]
    fn connect_fails_on_missing_params() {
        let config = ConnectionConfig {
            dialect: Dialect::Sqlite,
            params: BTreeMap::new(),
        };
        assert!(connect(&config, Duration::from_secs(5)).is_err());
    }
}
