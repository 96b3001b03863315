//! OpenQuery MCP Server implementation
//!
//! Tool surface consumed by the agent: database discovery, ad-hoc query
//! execution, and plot/mediator registration. Queries run read-only by
//! convention; the tool descriptions instruct the model to stick to SELECT
//! statements, and nothing here retries a failed execution.

use std::sync::Arc;

use mcp_common::{json_success, table_success, text_success, CallToolResult, McpError};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::adapter::{self, DatabaseAdapter};
use crate::config::ServerConfig;
use crate::directory::DatabaseDirectory;
use crate::mediator::MediatorStore;
use crate::normalize;
use crate::registry::PlotRegistry;
use crate::types::{ChartType, DatabaseConfig, MediatorSpec, PlotSpec};

// ============================================================================
// Parameter Types
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DescribeDatabaseParams {
    #[schemars(description = "Name of the configured database to describe")]
    pub database_name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RunQueryParams {
    #[schemars(description = "Name of the configured database to query")]
    pub database_name: String,

    #[schemars(description = "SQL query to execute. SELECT statements only; \
                              do not use this tool for INSERT, UPDATE or DELETE.")]
    pub query: String,

    #[schemars(description = "Maximum number of rows to return (default: 100)")]
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreatePlotParams {
    #[schemars(description = "Chart type: 'line' or 'bar'")]
    pub chart_type: String,

    #[schemars(description = "Name of the configured database to query")]
    pub database_name: String,

    #[schemars(description = "SQL query producing the chart data. Validate it with \
                              run_query first; it must return both axis columns.")]
    pub query: String,

    #[schemars(description = "Column to use for the x-axis")]
    pub x: String,

    #[schemars(description = "Column to use for the y-axis")]
    pub y: String,

    #[schemars(description = "Maximum number of rows to chart (default: 100)")]
    pub limit: Option<u32>,

    #[schemars(description = "Seconds between chart refreshes (default: 10)")]
    pub refresh_interval: Option<u64>,

    #[schemars(description = "Title shown above the chart")]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PlotIdParams {
    #[schemars(description = "Id returned by create_plot")]
    pub plot_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateMediatorParams {
    #[schemars(description = "Unique name for this export")]
    pub name: String,

    #[schemars(description = "Name of the configured database to query")]
    pub database_name: String,

    #[schemars(description = "SQL query whose result is exported")]
    pub query: String,

    #[schemars(description = "Seconds between exports (default: 300)")]
    pub interval: Option<u64>,

    #[schemars(description = "Path of the CSV file to write")]
    pub output_path: String,

    #[schemars(description = "Maximum number of rows to export (default: 100)")]
    pub limit: Option<u32>,
}

// ============================================================================
// Response Types
// ============================================================================

/// Response for create_plot
#[derive(Debug, Serialize)]
pub struct CreatePlotResponse {
    pub plot_id: String,
    pub message: String,
}

/// Response for create_mediator
#[derive(Debug, Serialize)]
pub struct CreateMediatorResponse {
    pub name: String,
    pub message: String,
}

// ============================================================================
// Server Implementation
// ============================================================================

/// The main OpenQuery MCP Server
#[derive(Clone)]
pub struct OpenQueryMcpServer {
    config: ServerConfig,
    directory: Arc<DatabaseDirectory>,
    registry: Arc<PlotRegistry>,
    mediators: Arc<MediatorStore>,
    tool_router: ToolRouter<Self>,
}

impl OpenQueryMcpServer {
    /// Create a server from the on-disk configuration
    pub fn new() -> Self {
        let config = ServerConfig::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load config: {}. Using defaults.", e);
            ServerConfig::default()
        });
        Self::with_config(config)
    }

    /// Create a server from an explicit configuration (used by tests)
    pub fn with_config(config: ServerConfig) -> Self {
        let directory = Arc::new(DatabaseDirectory::new(config.directory_path()));
        let registry = Arc::new(PlotRegistry::new(
            config.registry_path(),
            config.query_timeout(),
        ));
        let mediators = Arc::new(MediatorStore::new(config.mediators_path()));

        Self {
            config,
            directory,
            registry,
            mediators,
            tool_router: Self::tool_router(),
        }
    }

    /// The plot registry backing this server
    pub fn registry(&self) -> Arc<PlotRegistry> {
        self.registry.clone()
    }

    /// The database directory backing this server
    pub fn directory(&self) -> Arc<DatabaseDirectory> {
        self.directory.clone()
    }

    /// The mediator store backing this server
    pub fn mediators(&self) -> Arc<MediatorStore> {
        self.mediators.clone()
    }

    /// Text block describing one database: dialect, schema, sample rows
    async fn describe(&self, db: &DatabaseConfig) -> Result<String, McpError> {
        let adapter = adapter::connect(&db.connection, self.config.query_timeout())?;

        let mut out = format!("Database: {} ({})\n", db.name, db.connection.dialect);
        if !db.description.is_empty() {
            out.push_str(&format!("Description: {}\n", db.description));
        }

        let schemas = adapter.export_schema().await?;
        for schema in &schemas {
            out.push_str(&format!("\n{}\n", schema.ddl.trim_end()));
            let sample = adapter
                .sample_rows(&schema.table, self.config.query.sample_rows)
                .await?;
            if !sample.rows.is_empty() {
                out.push_str(&format!(
                    "Sample rows ({}):\n{}\n",
                    schema.table,
                    mcp_common::render_table(&sample.columns, &sample.rows)
                ));
            }
        }
        Ok(out)
    }
}

impl Default for OpenQueryMcpServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_router]
impl OpenQueryMcpServer {
    /// List all configured databases with schemas and sample data
    #[tool(description = "List all configured databases. Returns each database's name, \
                          dialect, schema, and a few sample rows per table.")]
    async fn list_databases(&self) -> Result<CallToolResult, McpError> {
        let databases = self.directory.list().await?;
        if databases.is_empty() {
            return Ok(text_success("No databases configured."));
        }

        let mut out = String::from("Databases available:\n");
        for db in &databases {
            out.push_str(&self.describe(db).await?);
            out.push_str("\n####\n");
        }
        Ok(text_success(out))
    }

    /// Describe one database's tables, columns, and sample rows
    #[tool(description = "Describe one database: its tables, columns with types, and \
                          sample rows.")]
    async fn describe_database(
        &self,
        Parameters(params): Parameters<DescribeDatabaseParams>,
    ) -> Result<CallToolResult, McpError> {
        let db = self.directory.get(&params.database_name).await?;
        let mut out = self.describe(&db).await?;

        let adapter = adapter::connect(&db.connection, self.config.query_timeout())?;
        for table in adapter.list_tables().await? {
            let columns = adapter.list_columns(&table).await?;
            let listing = columns
                .iter()
                .map(|c| format!("{} {}", c.name, c.data_type))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!("Columns of {}: {}\n", table, listing));
        }
        Ok(text_success(out))
    }

    /// Execute a query and return the rows as tabular text
    #[tool(description = "Execute a SQL query on a configured database and return the \
                          result as a table. Read-only by convention: SELECT queries only. \
                          Run this to validate a query before calling create_plot.")]
    async fn run_query(
        &self,
        Parameters(params): Parameters<RunQueryParams>,
    ) -> Result<CallToolResult, McpError> {
        let db = self.directory.get(&params.database_name).await?;

        let limit = params.limit.unwrap_or(self.config.query.default_row_limit);
        let sql = normalize::apply_limit(&params.query, limit);

        tracing::info!(database = %db.name, "running query");
        let adapter = adapter::connect(&db.connection, self.config.query_timeout())?;
        let result = adapter.execute(&sql).await?;

        Ok(table_success(&result.columns, &result.rows))
    }

    /// Register a live chart for a query
    #[tool(description = "Create a live line or bar chart from a SQL query. The query must \
                          return both the x and y columns; validate it with run_query \
                          first. Returns a plot id; the chart is rendered in the UI and \
                          refreshed on the given interval.")]
    async fn create_plot(
        &self,
        Parameters(params): Parameters<CreatePlotParams>,
    ) -> Result<CallToolResult, McpError> {
        let db = self.directory.get(&params.database_name).await?;
        let chart_type = ChartType::parse(&params.chart_type)?;

        let spec = PlotSpec {
            chart_type,
            database: db.connection,
            query: normalize::sanitize(&params.query),
            x_column: params.x,
            y_column: params.y,
            row_limit: params.limit.unwrap_or(self.config.query.default_row_limit),
            refresh_interval_secs: params.refresh_interval.unwrap_or(10),
            title: params
                .title
                .unwrap_or_else(|| "Graph requested to AI".to_string()),
        };

        let plot_id = self.registry.register(spec).await?;
        let response = CreatePlotResponse {
            message: format!(
                "Plot created with id {}. This plot will be visible in the UI.",
                plot_id
            ),
            plot_id,
        };
        json_success(&response)
    }

    /// Fetch the current data series of a registered plot
    #[tool(description = "Fetch the current x/y data for a registered plot. Re-executes \
                          the plot's query against the live database.")]
    async fn get_plot_data(
        &self,
        Parameters(params): Parameters<PlotIdParams>,
    ) -> Result<CallToolResult, McpError> {
        let data = self.registry.get_data(&params.plot_id).await?;
        json_success(&data)
    }

    /// Fetch a registered plot's metadata (connection credentials redacted)
    #[tool(description = "Fetch a registered plot's metadata: chart type, query, axes, \
                          refresh interval, and title. Connection credentials are never \
                          included.")]
    async fn get_plot_info(
        &self,
        Parameters(params): Parameters<PlotIdParams>,
    ) -> Result<CallToolResult, McpError> {
        let info = self.registry.get_metadata(&params.plot_id).await?;
        json_success(&info)
    }

    /// Define a scheduled CSV export of a query's result
    #[tool(description = "Define a mediator: a named, scheduled export of a query's result \
                          to a CSV file, independent of any chart.")]
    async fn create_mediator(
        &self,
        Parameters(params): Parameters<CreateMediatorParams>,
    ) -> Result<CallToolResult, McpError> {
        let db = self.directory.get(&params.database_name).await?;

        let spec = MediatorSpec {
            name: params.name.clone(),
            database: db.connection,
            query: normalize::sanitize(&params.query),
            row_limit: params.limit.unwrap_or(self.config.query.default_row_limit),
            interval_secs: params.interval.unwrap_or(300),
            output_path: std::path::PathBuf::from(params.output_path),
            last_run: None,
        };
        self.mediators.define(spec).await?;

        let response = CreateMediatorResponse {
            message: format!("Mediator '{}' defined.", params.name),
            name: params.name,
        };
        json_success(&response)
    }

    /// List defined mediators
    #[tool(description = "List defined mediators with their schedules and last run times. \
                          Connection credentials are never included.")]
    async fn list_mediators(&self) -> Result<CallToolResult, McpError> {
        #[derive(Serialize)]
        struct MediatorSummary {
            name: String,
            query: String,
            interval_secs: u64,
            output_path: String,
            last_run: Option<chrono::DateTime<chrono::Utc>>,
        }

        let mediators = self.mediators.list().await?;
        let summaries: Vec<MediatorSummary> = mediators
            .into_iter()
            .map(|m| MediatorSummary {
                name: m.name,
                query: m.query,
                interval_secs: m.interval_secs,
                output_path: m.output_path.to_string_lossy().to_string(),
                last_run: m.last_run,
            })
            .collect();
        json_success(&summaries)
    }
}

#[tool_handler]
impl rmcp::ServerHandler for OpenQueryMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "OpenQuery MCP server - exposes configured SQL databases (SQLite, \
                 Postgres) for exploration and live charting. Use list_databases to \
                 discover schemas, run_query to validate SELECT queries (read-only by \
                 convention), create_plot to register a live chart, and get_plot_data / \
                 get_plot_info to poll a registered plot."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
