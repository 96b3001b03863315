//! Error types for the OpenQuery server
//!
//! Configuration problems (unknown database, bad parameters) are fatal to
//! the calling operation and never retried. Data-access failures are
//! propagated to the caller as text. Query execution is at-most-one-attempt
//! everywhere; timeouts get their own variant so callers can tell a slow
//! database from a broken one.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpenQueryError {
    #[error("unknown database: {0}")]
    UnknownDatabase(String),

    #[error("missing connection parameter: {0}")]
    MissingParam(String),

    #[error("unsupported chart type: {0} (expected 'line' or 'bar')")]
    InvalidChartType(String),

    #[error("database error: {0}")]
    DataAccess(String),

    #[error("query timed out after {0}s")]
    QueryTimeout(u64),

    #[error("column '{0}' not present in result set")]
    ColumnMismatch(String),

    #[error("plot not found: {0}")]
    PlotNotFound(String),

    #[error("mediator not found: {0}")]
    MediatorNotFound(String),

    #[error("a renderer is already running for plot {0}")]
    RendererActive(String),

    #[error("no renderer running for plot {0}")]
    RendererNotFound(String),

    #[error("an export loop is already running for mediator {0}")]
    ExportActive(String),

    #[error("store corrupted: {0}")]
    StoreCorrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OpenQueryError>;

impl From<rusqlite::Error> for OpenQueryError {
    fn from(e: rusqlite::Error) -> Self {
        OpenQueryError::DataAccess(e.to_string())
    }
}

impl From<tokio_postgres::Error> for OpenQueryError {
    fn from(e: tokio_postgres::Error) -> Self {
        OpenQueryError::DataAccess(e.to_string())
    }
}

impl From<OpenQueryError> for rmcp::ErrorData {
    fn from(e: OpenQueryError) -> Self {
        match &e {
            OpenQueryError::UnknownDatabase(_)
            | OpenQueryError::MissingParam(_)
            | OpenQueryError::InvalidChartType(_)
            | OpenQueryError::PlotNotFound(_)
            | OpenQueryError::MediatorNotFound(_) => mcp_common::invalid_params(e.to_string()),
            _ => mcp_common::internal_error(e.to_string()),
        }
    }
}
