//! Core data model: databases, plots, mediators, query results

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OpenQueryError, Result};

/// Database backend selector
///
/// Closed set: adding a dialect means adding an adapter. Unknown dialect
/// strings are rejected at deserialization time, before any connection
/// attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sqlite,
    Postgresql,
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::Sqlite => write!(f, "sqlite"),
            Dialect::Postgresql => write!(f, "postgresql"),
        }
    }
}

/// Connection settings for one database: the dialect tag plus free-form
/// parameters (path, host, credentials, TLS mode)
///
/// Parameters are a `BTreeMap` so serialization order is stable; plot
/// fingerprints depend on it. On the wire this flattens to a single object,
/// e.g. `{"dialect": "sqlite", "database": "inventory.db"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub dialect: Dialect,
    #[serde(flatten)]
    pub params: BTreeMap<String, String>,
}

impl ConnectionConfig {
    /// Required parameter lookup
    pub fn param(&self, key: &str) -> Result<&str> {
        self.params
            .get(key)
            .map(|s| s.as_str())
            .ok_or_else(|| OpenQueryError::MissingParam(key.to_string()))
    }

    /// Optional parameter with a fallback
    pub fn param_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.params.get(key).map(|s| s.as_str()).unwrap_or(default)
    }
}

/// A named entry in the database directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "config")]
    pub connection: ConnectionConfig,
}

/// Chart type for a registered plot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Line,
    Bar,
}

impl ChartType {
    /// Parse a user-supplied chart type string
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "line" => Ok(ChartType::Line),
            "bar" => Ok(ChartType::Bar),
            other => Err(OpenQueryError::InvalidChartType(other.to_string())),
        }
    }
}

impl std::fmt::Display for ChartType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChartType::Line => write!(f, "line"),
            ChartType::Bar => write!(f, "bar"),
        }
    }
}

/// A fully-specified plot request: the unit that gets fingerprinted
///
/// Embeds the connection settings (credentials included) rather than a
/// database name, so the plot keeps working if the directory entry is
/// renamed. A spec is never mutated in place; a changed query is a
/// different plot with a different id. Field order matters: the canonical
/// bytes hashed into the plot id are this struct's JSON encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotSpec {
    pub chart_type: ChartType,
    pub database: ConnectionConfig,
    pub query: String,
    pub x_column: String,
    pub y_column: String,
    pub row_limit: u32,
    pub refresh_interval_secs: u64,
    pub title: String,
}

impl PlotSpec {
    /// Redacted view safe to return across the system boundary
    ///
    /// Connection parameters may hold credentials and never leave the
    /// server; only the dialect tag survives.
    pub fn info(&self, plot_id: &str) -> PlotInfo {
        PlotInfo {
            plot_id: plot_id.to_string(),
            chart_type: self.chart_type,
            dialect: self.database.dialect,
            query: self.query.clone(),
            x_column: self.x_column.clone(),
            y_column: self.y_column.clone(),
            row_limit: self.row_limit,
            refresh_interval_secs: self.refresh_interval_secs,
            title: self.title.clone(),
        }
    }
}

/// Plot metadata with connection parameters redacted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotInfo {
    pub plot_id: String,
    pub chart_type: ChartType,
    pub dialect: Dialect,
    pub query: String,
    pub x_column: String,
    pub y_column: String,
    pub row_limit: u32,
    pub refresh_interval_secs: u64,
    pub title: String,
}

/// Result of one query execution
///
/// Ephemeral: produced fresh on every execution and never cached, so each
/// chart refresh tick sees the live database.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl QueryResult {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Bind two named columns as (x, y) series
    ///
    /// A missing column is a column-mismatch error, never an empty series.
    pub fn series(&self, x_column: &str, y_column: &str) -> Result<PlotData> {
        let xi = self
            .column_index(x_column)
            .ok_or_else(|| OpenQueryError::ColumnMismatch(x_column.to_string()))?;
        let yi = self
            .column_index(y_column)
            .ok_or_else(|| OpenQueryError::ColumnMismatch(y_column.to_string()))?;

        let mut x = Vec::with_capacity(self.rows.len());
        let mut y = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            x.push(row.get(xi).cloned().unwrap_or(serde_json::Value::Null));
            y.push(row.get(yi).cloned().unwrap_or(serde_json::Value::Null));
        }
        Ok(PlotData { x, y })
    }
}

/// x/y series handed to chart consumers; always equal length
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotData {
    pub x: Vec<serde_json::Value>,
    pub y: Vec<serde_json::Value>,
}

/// One column of a table, as reported by introspection
#[derive(Debug, Clone, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

/// A table's DDL, as reported by schema export
#[derive(Debug, Clone, Serialize)]
pub struct TableSchema {
    pub table: String,
    pub ddl: String,
}

/// A named, scheduled export of a query's result to an external file
///
/// Independent of the plotting pipeline: mediators are keyed by name, not
/// fingerprinted, and may be redefined in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediatorSpec {
    pub name: String,
    pub database: ConnectionConfig,
    pub query: String,
    pub row_limit: u32,
    pub interval_secs: u64,
    pub output_path: std::path::PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
}
