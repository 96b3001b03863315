//! Live chart renderer
//!
//! One loop per plot id: execute the query, bind the axes, hand the frame
//! to the chart surface, sleep for the refresh interval, repeat. Ticks
//! within a renderer are strictly sequential - a new query never starts
//! before the previous frame is drawn.
//!
//! Renderers run as supervised in-process tasks addressable by plot id,
//! cancellable through a watch channel. A failed tick is retried after a
//! backoff, up to a bounded budget; a column mismatch is fatal immediately
//! (the result set will not grow the missing column on its own).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::RendererConfig;
use crate::error::{OpenQueryError, Result};
use crate::registry::PlotRegistry;
use crate::types::{ChartType, PlotSpec};

/// Seam to the chart widget collaborating from outside this crate
///
/// The hosting process supplies the drawing implementation; the renderer
/// only produces frames.
pub trait ChartSurface: Send + Sync {
    fn draw(&self, frame: &ChartFrame);
}

/// One drawn frame: the (x, y) series plus enough metadata to key the
/// widget
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChartFrame {
    pub plot_id: String,
    pub chart_type: ChartType,
    pub title: String,
    pub x: Vec<serde_json::Value>,
    pub y: Vec<serde_json::Value>,
}

/// Execute one Loading -> Rendering pass for a spec
pub async fn tick(
    registry: &PlotRegistry,
    plot_id: &str,
    spec: &PlotSpec,
    surface: &dyn ChartSurface,
) -> Result<()> {
    let data = registry.fetch_data(spec).await?;
    surface.draw(&ChartFrame {
        plot_id: plot_id.to_string(),
        chart_type: spec.chart_type,
        title: spec.title.clone(),
        x: data.x,
        y: data.y,
    });
    Ok(())
}

struct RendererHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owns the renderer task per plot id
///
/// Policy: one live renderer per plot id. Registration is idempotent;
/// rendering is not - starting a second renderer for a plot that already
/// has one is a caller error and is rejected.
pub struct RendererSupervisor {
    registry: Arc<PlotRegistry>,
    surface: Arc<dyn ChartSurface>,
    config: RendererConfig,
    renderers: Mutex<HashMap<String, RendererHandle>>,
}

impl RendererSupervisor {
    pub fn new(
        registry: Arc<PlotRegistry>,
        surface: Arc<dyn ChartSurface>,
        config: RendererConfig,
    ) -> Self {
        Self {
            registry,
            surface,
            config,
            renderers: Mutex::new(HashMap::new()),
        }
    }

    /// Start a renderer for a registered plot
    pub async fn start(&self, plot_id: &str) -> Result<()> {
        let spec = self.registry.get(plot_id).await?;

        let mut renderers = self.renderers.lock().await;
        if let Some(handle) = renderers.get(plot_id) {
            if !handle.task.is_finished() {
                return Err(OpenQueryError::RendererActive(plot_id.to_string()));
            }
            renderers.remove(plot_id);
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(run_renderer(
            plot_id.to_string(),
            spec,
            self.registry.clone(),
            self.surface.clone(),
            self.config.clone(),
            cancel_rx,
        ));
        renderers.insert(
            plot_id.to_string(),
            RendererHandle {
                cancel: cancel_tx,
                task,
            },
        );
        tracing::info!(plot_id, "renderer started");
        Ok(())
    }

    /// Stop a running renderer and wait for its loop to wind down
    pub async fn stop(&self, plot_id: &str) -> Result<()> {
        let handle = {
            let mut renderers = self.renderers.lock().await;
            renderers
                .remove(plot_id)
                .ok_or_else(|| OpenQueryError::RendererNotFound(plot_id.to_string()))?
        };
        let _ = handle.cancel.send(true);
        let _ = handle.task.await;
        tracing::info!(plot_id, "renderer stopped");
        Ok(())
    }

    /// Plot ids with a live renderer
    pub async fn running(&self) -> Vec<String> {
        let mut renderers = self.renderers.lock().await;
        renderers.retain(|_, handle| !handle.task.is_finished());
        let mut ids: Vec<String> = renderers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Cancel every renderer and wait for them to finish
    pub async fn shutdown(&self) {
        let handles: Vec<RendererHandle> = {
            let mut renderers = self.renderers.lock().await;
            renderers.drain().map(|(_, handle)| handle).collect()
        };
        for handle in &handles {
            let _ = handle.cancel.send(true);
        }
        for handle in handles {
            let _ = handle.task.await;
        }
    }
}

/// The refresh loop for one plot
async fn run_renderer(
    plot_id: String,
    spec: PlotSpec,
    registry: Arc<PlotRegistry>,
    surface: Arc<dyn ChartSurface>,
    config: RendererConfig,
    mut cancel: watch::Receiver<bool>,
) {
    let interval = Duration::from_secs(spec.refresh_interval_secs);
    let backoff = Duration::from_secs(config.restart_backoff_secs);
    let mut failures: u32 = 0;

    loop {
        match tick(&registry, &plot_id, &spec, surface.as_ref()).await {
            Ok(()) => {
                failures = 0;
            }
            Err(e @ OpenQueryError::ColumnMismatch(_)) => {
                tracing::error!(plot_id = %plot_id, error = %e, "renderer terminated");
                return;
            }
            Err(e) => {
                failures += 1;
                if failures > config.max_restarts {
                    tracing::error!(
                        plot_id = %plot_id,
                        error = %e,
                        failures,
                        "renderer giving up after repeated failures"
                    );
                    return;
                }
                tracing::warn!(plot_id = %plot_id, error = %e, failures, "renderer tick failed, backing off");
                if sleep_or_cancel(&mut cancel, backoff).await {
                    return;
                }
                continue;
            }
        }

        if sleep_or_cancel(&mut cancel, interval).await {
            tracing::debug!(plot_id = %plot_id, "renderer cancelled");
            return;
        }
    }
}

/// Sleep for `duration`, waking early on cancellation; true means cancelled
async fn sleep_or_cancel(cancel: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        changed = cancel.changed() => match changed {
            Ok(()) => *cancel.borrow(),
            // Sender gone: the supervisor dropped us, stop quietly
            Err(_) => true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConnectionConfig, Dialect};
    use std::collections::BTreeMap;
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;

    /// Test double that records every frame it is asked to draw
    #[derive(Default)]
    struct CollectingSurface {
        frames: StdMutex<Vec<ChartFrame>>,
    }

    impl ChartSurface for CollectingSurface {
        fn draw(&self, frame: &ChartFrame) {
            self.frames.lock().unwrap().push(frame.clone());
        }
    }

    fn seeded_db(dir: &std::path::Path) -> std::path::PathBuf {
        let path = dir.join("metrics.db");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE metrics (ts INTEGER, value REAL);
            INSERT INTO metrics VALUES (1, 0.5), (2, 0.7), (3, 0.9);
            "#,
        )
        .unwrap();
        path
    }

    fn spec(db_path: &std::path::Path, y_column: &str) -> PlotSpec {
        PlotSpec {
            chart_type: ChartType::Line,
            database: ConnectionConfig {
                dialect: Dialect::Sqlite,
                params: BTreeMap::from([(
                    "database".to_string(),
                    db_path.to_string_lossy().to_string(),
                )]),
            },
            query: "SELECT ts, value FROM metrics ORDER BY ts".to_string(),
            x_column: "ts".to_string(),
            y_column: y_column.to_string(),
            row_limit: 100,
            refresh_interval_secs: 1,
            title: "metrics".to_string(),
        }
    }

    fn registry(dir: &std::path::Path) -> Arc<PlotRegistry> {
        Arc::new(PlotRegistry::new(
            dir.join("plots.json"),
            Duration::from_secs(5),
        ))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tick_draws_a_frame() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path());
        let spec = spec(&seeded_db(dir.path()), "value");
        let id = registry.register(spec.clone()).await.unwrap();
        let surface = CollectingSurface::default();

        tick(&registry, &id, &spec, &surface).await.unwrap();

        let frames = surface.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].x.len(), 3);
        assert_eq!(frames[0].y.len(), 3);
        assert_eq!(frames[0].title, "metrics");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_column_fails_before_drawing() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path());
        let spec = spec(&seeded_db(dir.path()), "nope");
        let id = registry.register(spec.clone()).await.unwrap();
        let surface = CollectingSurface::default();

        let err = tick(&registry, &id, &spec, &surface).await.unwrap_err();
        assert!(matches!(err, OpenQueryError::ColumnMismatch(c) if c == "nope"));
        assert!(surface.frames.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn one_renderer_per_plot_id() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path());
        let id = registry
            .register(spec(&seeded_db(dir.path()), "value"))
            .await
            .unwrap();

        let supervisor = RendererSupervisor::new(
            registry,
            Arc::new(CollectingSurface::default()),
            RendererConfig::default(),
        );

        supervisor.start(&id).await.unwrap();
        let err = supervisor.start(&id).await.unwrap_err();
        assert!(matches!(err, OpenQueryError::RendererActive(_)));

        supervisor.stop(&id).await.unwrap();
        // Stopped renderers free the slot
        supervisor.start(&id).await.unwrap();
        supervisor.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_cancels_the_loop() {
        let dir = tempdir().unwrap();
        let registry = registry(dir.path());
        let id = registry
            .register(spec(&seeded_db(dir.path()), "value"))
            .await
            .unwrap();

        let surface = Arc::new(CollectingSurface::default());
        let supervisor = RendererSupervisor::new(
            registry,
            surface.clone(),
            RendererConfig::default(),
        );

        supervisor.start(&id).await.unwrap();
        // Let the first tick land
        tokio::time::sleep(Duration::from_millis(200)).await;
        supervisor.stop(&id).await.unwrap();

        let drawn = surface.frames.lock().unwrap().len();
        assert!(drawn >= 1);
        assert!(supervisor.running().await.is_empty());

        let err = supervisor.stop(&id).await.unwrap_err();
        assert!(matches!(err, OpenQueryError::RendererNotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unregistered_plot_cannot_start() {
        let dir = tempdir().unwrap();
        let supervisor = RendererSupervisor::new(
            registry(dir.path()),
            Arc::new(CollectingSurface::default()),
            RendererConfig::default(),
        );
        let err = supervisor.start("deadbeef").await.unwrap_err();
        assert!(matches!(err, OpenQueryError::PlotNotFound(_)));
    }
}
