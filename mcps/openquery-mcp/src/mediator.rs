//! Mediator exports
//!
//! A mediator is a named, scheduled export of a query's result to an
//! external CSV file, independent of the plotting pipeline. Mediators are
//! keyed by name (not fingerprinted) and may be redefined in place; the
//! store is the same whole-file JSON idiom as the plot registry.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::adapter::{self, DatabaseAdapter};
use crate::error::{OpenQueryError, Result};
use crate::normalize;
use crate::store;
use crate::types::{MediatorSpec, QueryResult};

pub struct MediatorStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl MediatorStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// Create or replace a mediator definition (name-keyed upsert)
    pub async fn define(&self, spec: MediatorSpec) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut mediators: BTreeMap<String, MediatorSpec> =
            store::read_json_or_default(&self.path).await?;
        mediators.insert(spec.name.clone(), spec);
        store::write_json_atomic(&self.path, &mediators).await
    }

    pub async fn get(&self, name: &str) -> Result<MediatorSpec> {
        let mediators: BTreeMap<String, MediatorSpec> =
            store::read_json_or_default(&self.path).await?;
        mediators
            .get(name)
            .cloned()
            .ok_or_else(|| OpenQueryError::MediatorNotFound(name.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<MediatorSpec>> {
        let mediators: BTreeMap<String, MediatorSpec> =
            store::read_json_or_default(&self.path).await?;
        Ok(mediators.into_values().collect())
    }

    pub async fn remove(&self, name: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut mediators: BTreeMap<String, MediatorSpec> =
            store::read_json_or_default(&self.path).await?;
        if mediators.remove(name).is_none() {
            return Err(OpenQueryError::MediatorNotFound(name.to_string()));
        }
        store::write_json_atomic(&self.path, &mediators).await
    }

    /// Record a completed export run
    async fn touch(&self, name: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut mediators: BTreeMap<String, MediatorSpec> =
            store::read_json_or_default(&self.path).await?;
        if let Some(spec) = mediators.get_mut(name) {
            spec.last_run = Some(Utc::now());
            store::write_json_atomic(&self.path, &mediators).await?;
        }
        Ok(())
    }
}

/// Execute a mediator's query once and write the result as CSV
///
/// Returns the number of data rows written. One attempt, no retry; the
/// scheduler treats a failure as a skipped run.
pub async fn run_export(spec: &MediatorSpec, timeout: Duration) -> Result<usize> {
    let adapter = adapter::connect(&spec.database, timeout)?;
    let sql = normalize::apply_limit(&spec.query, spec.row_limit);
    let result = adapter.execute(&sql).await?;
    let rows = result.rows.len();

    if let Some(parent) = spec.output_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(&spec.output_path, to_csv(&result)).await?;
    Ok(rows)
}

/// Render a query result as CSV with a header row
///
/// Fields containing commas, quotes, or newlines are double-quoted with
/// embedded quotes doubled.
fn to_csv(result: &QueryResult) -> String {
    fn field(value: &str) -> String {
        if value.contains([',', '"', '\n', '\r']) {
            format!("\"{}\"", value.replace('"', "\"\""))
        } else {
            value.to_string()
        }
    }

    fn cell(value: &serde_json::Value) -> String {
        match value {
            serde_json::Value::String(s) => field(s),
            serde_json::Value::Null => String::new(),
            other => field(&other.to_string()),
        }
    }

    let mut out = String::new();
    out.push_str(
        &result
            .columns
            .iter()
            .map(|c| field(c))
            .collect::<Vec<_>>()
            .join(","),
    );
    out.push('\n');
    for row in &result.rows {
        out.push_str(&row.iter().map(cell).collect::<Vec<_>>().join(","));
        out.push('\n');
    }
    out
}

struct ExportJob {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Runs defined mediators on their intervals
///
/// Same lifecycle shape as the renderer supervisor: one task per mediator
/// name, cancellable, one job per name at a time.
pub struct ExportScheduler {
    mediators: Arc<MediatorStore>,
    query_timeout: Duration,
    jobs: Mutex<HashMap<String, ExportJob>>,
}

impl ExportScheduler {
    pub fn new(mediators: Arc<MediatorStore>, query_timeout: Duration) -> Self {
        Self {
            mediators,
            query_timeout,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Start the export loop for a defined mediator
    pub async fn start(&self, name: &str) -> Result<()> {
        let spec = self.mediators.get(name).await?;

        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get(name) {
            if !job.task.is_finished() {
                return Err(OpenQueryError::ExportActive(name.to_string()));
            }
            jobs.remove(name);
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(run_scheduled(
            spec,
            self.mediators.clone(),
            self.query_timeout,
            cancel_rx,
        ));
        jobs.insert(
            name.to_string(),
            ExportJob {
                cancel: cancel_tx,
                task,
            },
        );
        Ok(())
    }

    /// Stop a running export loop
    pub async fn stop(&self, name: &str) -> Result<()> {
        let job = {
            let mut jobs = self.jobs.lock().await;
            jobs.remove(name)
                .ok_or_else(|| OpenQueryError::MediatorNotFound(name.to_string()))?
        };
        let _ = job.cancel.send(true);
        let _ = job.task.await;
        Ok(())
    }

    /// Cancel every export loop and wait for them to finish
    pub async fn shutdown(&self) {
        let jobs: Vec<ExportJob> = {
            let mut jobs = self.jobs.lock().await;
            jobs.drain().map(|(_, job)| job).collect()
        };
        for job in &jobs {
            let _ = job.cancel.send(true);
        }
        for job in jobs {
            let _ = job.task.await;
        }
    }
}

async fn run_scheduled(
    spec: MediatorSpec,
    mediators: Arc<MediatorStore>,
    timeout: Duration,
    mut cancel: watch::Receiver<bool>,
) {
    let interval = Duration::from_secs(spec.interval_secs);
    loop {
        match run_export(&spec, timeout).await {
            Ok(rows) => {
                tracing::info!(mediator = %spec.name, rows, "export written");
                if let Err(e) = mediators.touch(&spec.name).await {
                    tracing::warn!(mediator = %spec.name, error = %e, "failed to record run");
                }
            }
            Err(e) => {
                tracing::warn!(mediator = %spec.name, error = %e, "export failed, skipping run");
            }
        }

        let cancelled = tokio::select! {
            _ = tokio::time::sleep(interval) => false,
            changed = cancel.changed() => changed.map(|_| *cancel.borrow()).unwrap_or(true),
        };
        if cancelled {
            tracing::debug!(mediator = %spec.name, "export loop cancelled");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConnectionConfig, Dialect};
    use serde_json::json;
    use tempfile::tempdir;

    fn seeded_db(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("sales.db");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE sales (region TEXT, total REAL);
            INSERT INTO sales VALUES ('north', 10.5), ('south, east', 3.0);
            "#,
        )
        .unwrap();
        path
    }

    fn mediator(dir: &std::path::Path) -> MediatorSpec {
        MediatorSpec {
            name: "sales-export".to_string(),
            database: ConnectionConfig {
                dialect: Dialect::Sqlite,
                params: BTreeMap::from([(
                    "database".to_string(),
                    seeded_db(dir).to_string_lossy().to_string(),
                )]),
            },
            query: "SELECT region, total FROM sales ORDER BY total DESC".to_string(),
            row_limit: 100,
            interval_secs: 60,
            output_path: dir.join("out").join("sales.csv"),
            last_run: None,
        }
    }

    #[test]
    fn csv_quotes_awkward_fields() {
        let result = QueryResult {
            columns: vec!["region".to_string(), "total".to_string()],
            rows: vec![
                vec![json!("south, east"), json!(3.0)],
                vec![json!("say \"hi\""), json!(null)],
            ],
        };
        let csv = to_csv(&result);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "region,total");
        assert_eq!(lines[1], "\"south, east\",3.0");
        assert_eq!(lines[2], "\"say \"\"hi\"\"\",");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_export_writes_csv_with_header() {
        let dir = tempdir().unwrap();
        let spec = mediator(dir.path());

        let rows = run_export(&spec, Duration::from_secs(5)).await.unwrap();
        assert_eq!(rows, 2);

        let content = std::fs::read_to_string(&spec.output_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "region,total");
        assert_eq!(lines.len(), 3);
        assert!(lines[2].starts_with("\"south, east\""));
    }

    #[tokio::test]
    async fn store_define_get_remove() {
        let dir = tempdir().unwrap();
        let store = MediatorStore::new(dir.path().join("mediators.json"));

        let err = store.get("sales-export").await.unwrap_err();
        assert!(matches!(err, OpenQueryError::MediatorNotFound(_)));

        store.define(mediator(dir.path())).await.unwrap();
        assert_eq!(store.get("sales-export").await.unwrap().row_limit, 100);
        assert_eq!(store.list().await.unwrap().len(), 1);

        store.remove("sales-export").await.unwrap();
        let err = store.remove("sales-export").await.unwrap_err();
        assert!(matches!(err, OpenQueryError::MediatorNotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn scheduler_runs_and_records() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MediatorStore::new(dir.path().join("mediators.json")));
        store.define(mediator(dir.path())).await.unwrap();

        let scheduler = ExportScheduler::new(store.clone(), Duration::from_secs(5));
        scheduler.start("sales-export").await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        scheduler.stop("sales-export").await.unwrap();

        let spec = store.get("sales-export").await.unwrap();
        assert!(spec.last_run.is_some());
        assert!(spec.output_path.exists());
    }
}
