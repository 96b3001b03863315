//! Plot registry - content-addressed persisted plot specs
//!
//! A plot id is the SHA-256 of the spec's canonical JSON encoding (struct
//! field order plus sorted connection params), so field-for-field identical
//! specs always map to the same id regardless of arrival order.
//! Registration is insert-if-absent: re-registering an existing spec
//! returns its id without touching the file. The whole read-decide-write
//! sequence runs under one lock; persistence is temp-file + rename.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::adapter::{self, DatabaseAdapter};
use crate::error::{OpenQueryError, Result};
use crate::normalize;
use crate::types::{PlotData, PlotInfo, PlotSpec};

/// Compute the content-addressed id of a plot spec
///
/// Deterministic digest of the canonical serialization; any single field
/// change (query, axes, limits, title, chart type, connection params)
/// yields a different id.
pub fn plot_id(spec: &PlotSpec) -> Result<String> {
    let canonical = serde_json::to_vec(spec)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(hex::encode(hasher.finalize()))
}

pub struct PlotRegistry {
    path: PathBuf,
    query_timeout: Duration,
    write_lock: Mutex<()>,
}

impl PlotRegistry {
    pub fn new(path: PathBuf, query_timeout: Duration) -> Self {
        Self {
            path,
            query_timeout,
            write_lock: Mutex::new(()),
        }
    }

    /// Register a plot spec, returning its id
    ///
    /// Idempotent: a spec whose id is already present returns that id with
    /// no write. The same id mapping to a *different* stored spec means the
    /// store (or the hash) is corrupt and is fatal, never an overwrite.
    pub async fn register(&self, spec: PlotSpec) -> Result<String> {
        let id = plot_id(&spec)?;

        let _guard = self.write_lock.lock().await;
        let mut plots: BTreeMap<String, PlotSpec> =
            crate::store::read_json_or_default(&self.path).await?;

        if let Some(existing) = plots.get(&id) {
            if *existing != spec {
                return Err(OpenQueryError::StoreCorrupt(format!(
                    "plot {} maps to a different spec",
                    id
                )));
            }
            tracing::debug!(plot_id = %id, "plot already registered");
            return Ok(id);
        }

        plots.insert(id.clone(), spec);
        crate::store::write_json_atomic(&self.path, &plots).await?;
        tracing::info!(plot_id = %id, "registered plot");
        Ok(id)
    }

    /// Fetch a registered spec (credentials included - internal use only)
    pub async fn get(&self, id: &str) -> Result<PlotSpec> {
        let plots: BTreeMap<String, PlotSpec> =
            crate::store::read_json_or_default(&self.path).await?;
        plots
            .get(id)
            .cloned()
            .ok_or_else(|| OpenQueryError::PlotNotFound(id.to_string()))
    }

    /// Re-execute a registered plot's query and bind its axes
    pub async fn get_data(&self, id: &str) -> Result<PlotData> {
        let spec = self.get(id).await?;
        self.fetch_data(&spec).await
    }

    /// Execute a spec's query against its embedded connection settings
    ///
    /// Used by `get_data` and by each renderer tick; results are never
    /// cached, every call sees the live database.
    pub async fn fetch_data(&self, spec: &PlotSpec) -> Result<PlotData> {
        let adapter = adapter::connect(&spec.database, self.query_timeout)?;
        let sql = normalize::apply_limit(&spec.query, spec.row_limit);
        let result = adapter.execute(&sql).await?;
        result.series(&spec.x_column, &spec.y_column)
    }

    /// Redacted metadata for external callers
    pub async fn get_metadata(&self, id: &str) -> Result<PlotInfo> {
        Ok(self.get(id).await?.info(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChartType, ConnectionConfig, Dialect};
    use tempfile::tempdir;

    fn spec(query: &str) -> PlotSpec {
        PlotSpec {
            chart_type: ChartType::Line,
            database: ConnectionConfig {
                dialect: Dialect::Sqlite,
                params: BTreeMap::from([("database".to_string(), "metrics.db".to_string())]),
            },
            query: query.to_string(),
            x_column: "ts".to_string(),
            y_column: "value".to_string(),
            row_limit: 100,
            refresh_interval_secs: 10,
            title: "Graph requested to AI".to_string(),
        }
    }

    #[test]
    fn identical_specs_hash_identically() {
        let a = spec("SELECT ts, value FROM metrics");
        let b = spec("SELECT ts, value FROM metrics");
        assert_eq!(plot_id(&a).unwrap(), plot_id(&b).unwrap());
    }

    #[test]
    fn any_field_change_changes_the_id() {
        let base = spec("SELECT ts, value FROM metrics");
        let base_id = plot_id(&base).unwrap();

        let variants = [
            PlotSpec {
                chart_type: ChartType::Bar,
                ..base.clone()
            },
            PlotSpec {
                query: "SELECT ts, value FROM other".to_string(),
                ..base.clone()
            },
            PlotSpec {
                x_column: "t".to_string(),
                ..base.clone()
            },
            PlotSpec {
                y_column: "v".to_string(),
                ..base.clone()
            },
            PlotSpec {
                row_limit: 50,
                ..base.clone()
            },
            PlotSpec {
                refresh_interval_secs: 60,
                ..base.clone()
            },
            PlotSpec {
                title: "Other".to_string(),
                ..base.clone()
            },
            PlotSpec {
                database: ConnectionConfig {
                    dialect: Dialect::Sqlite,
                    params: BTreeMap::from([(
                        "database".to_string(),
                        "other.db".to_string(),
                    )]),
                },
                ..base.clone()
            },
        ];

        for variant in variants {
            assert_ne!(plot_id(&variant).unwrap(), base_id);
        }
    }

    #[tokio::test]
    async fn register_is_idempotent() {
        let dir = tempdir().unwrap();
        let registry = PlotRegistry::new(dir.path().join("plots.json"), Duration::from_secs(5));

        let first = registry.register(spec("SELECT ts, value FROM m")).await.unwrap();
        let second = registry.register(spec("SELECT ts, value FROM m")).await.unwrap();
        assert_eq!(first, second);

        // One persisted entry, not two
        let content = std::fs::read_to_string(dir.path().join("plots.json")).unwrap();
        let plots: BTreeMap<String, PlotSpec> = serde_json::from_str(&content).unwrap();
        assert_eq!(plots.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_registration_keeps_one_entry() {
        let dir = tempdir().unwrap();
        let registry = std::sync::Arc::new(PlotRegistry::new(
            dir.path().join("plots.json"),
            Duration::from_secs(5),
        ));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.register(spec("SELECT ts, value FROM m")).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let content = std::fs::read_to_string(dir.path().join("plots.json")).unwrap();
        let plots: BTreeMap<String, PlotSpec> = serde_json::from_str(&content).unwrap();
        assert_eq!(plots.len(), 1);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let dir = tempdir().unwrap();
        let registry = PlotRegistry::new(dir.path().join("plots.json"), Duration::from_secs(5));

        let err = registry.get_data("deadbeef").await.unwrap_err();
        assert!(matches!(err, OpenQueryError::PlotNotFound(_)));

        let err = registry.get_metadata("deadbeef").await.unwrap_err();
        assert!(matches!(err, OpenQueryError::PlotNotFound(_)));
    }

    #[tokio::test]
    async fn colliding_id_with_different_spec_is_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plots.json");
        let registry = PlotRegistry::new(path.clone(), Duration::from_secs(5));

        // Seed the store with a spec filed under the wrong id
        let stored = spec("SELECT ts, value FROM other");
        let id = registry.register(spec("SELECT ts, value FROM m")).await.unwrap();
        let mut plots: BTreeMap<String, PlotSpec> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        plots.insert(id, stored);
        std::fs::write(&path, serde_json::to_string(&plots).unwrap()).unwrap();

        let err = registry.register(spec("SELECT ts, value FROM m")).await.unwrap_err();
        assert!(matches!(err, OpenQueryError::StoreCorrupt(_)));
    }

    #[tokio::test]
    async fn metadata_never_exposes_credentials() {
        let dir = tempdir().unwrap();
        let registry = PlotRegistry::new(dir.path().join("plots.json"), Duration::from_secs(5));

        let mut s = spec("SELECT ts, value FROM m");
        s.database.params.insert("password".to_string(), "s3cret".to_string());
        let id = registry.register(s).await.unwrap();

        let info = registry.get_metadata(&id).await.unwrap();
        let json = serde_json::to_string(&info).unwrap();
        assert!(!json.contains("s3cret"));
        assert_eq!(info.plot_id, id);
    }
}
