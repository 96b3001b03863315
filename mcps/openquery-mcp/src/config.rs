//! Configuration for the OpenQuery MCP server
//!
//! Every component receives its settings from this struct at construction;
//! there is no process-wide state and no path derived from the executable's
//! own location.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Directory holding the persisted stores (databases.json, plots.json,
    /// mediators.json)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Query execution settings
    #[serde(default)]
    pub query: QueryConfig,

    /// Renderer supervision settings
    #[serde(default)]
    pub renderer: RendererConfig,
}

/// Query execution settings
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Maximum query execution time in seconds
    /// Default: 30
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Row limit applied when a query carries none of its own
    /// Default: 100
    #[serde(default = "default_row_limit")]
    pub default_row_limit: u32,

    /// Rows shown per table in database summaries
    /// Default: 3
    #[serde(default = "default_sample_rows")]
    pub sample_rows: u32,
}

/// Renderer supervision settings
#[derive(Debug, Clone, Deserialize)]
pub struct RendererConfig {
    /// Consecutive failed ticks tolerated before a renderer gives up
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// Seconds to wait before retrying after a failed tick
    #[serde(default = "default_restart_backoff")]
    pub restart_backoff_secs: u64,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".openquery")
}

fn default_timeout() -> u64 {
    30
}

fn default_row_limit() -> u32 {
    100
}

fn default_sample_rows() -> u32 {
    3
}

fn default_max_restarts() -> u32 {
    3
}

fn default_restart_backoff() -> u64 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            query: QueryConfig::default(),
            renderer: RendererConfig::default(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            default_row_limit: default_row_limit(),
            sample_rows: default_sample_rows(),
        }
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            max_restarts: default_max_restarts(),
            restart_backoff_secs: default_restart_backoff(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from file or use defaults
    ///
    /// Looks for config in:
    /// 1. `OPENQUERY_CONFIG_PATH` environment variable
    /// 2. `~/.openquery/config.toml`
    ///
    /// A missing file is not an error; the server starts with defaults.
    pub fn load() -> Result<Self> {
        let config_path = if let Ok(path) = std::env::var("OPENQUERY_CONFIG_PATH") {
            PathBuf::from(path)
        } else {
            default_data_dir().join("config.toml")
        };

        if !config_path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config from {:?}", config_path))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {:?}", config_path))
    }

    /// Path of the database directory file
    pub fn directory_path(&self) -> PathBuf {
        self.data_dir.join("databases.json")
    }

    /// Path of the plot registry file
    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join("plots.json")
    }

    /// Path of the mediator store file
    pub fn mediators_path(&self) -> PathBuf {
        self.data_dir.join("mediators.json")
    }

    /// Query timeout as a `Duration`
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ServerConfig::default();
        assert_eq!(config.query.timeout_secs, 30);
        assert_eq!(config.query.default_row_limit, 100);
        assert_eq!(config.query.sample_rows, 3);
        assert!(config.registry_path().ends_with("plots.json"));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            data_dir = "/tmp/oq"

            [query]
            timeout_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/oq"));
        assert_eq!(config.query.timeout_secs, 5);
        assert_eq!(config.query.default_row_limit, 100);
        assert_eq!(config.renderer.max_restarts, 3);
    }
}
