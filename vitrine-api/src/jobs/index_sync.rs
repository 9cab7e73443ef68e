//! Index Sync Background Task
//!
//! Owns the sync worker pool for the lifetime of the server. Workers drain
//! the propagation queue into the search index; this task additionally
//! logs the queue depth and refreshes the Prometheus gauges on a fixed
//! interval, and joins the workers on shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use vitrine_sync::{
    IndexSynchronizer, PropagationQueue, SyncMetrics, SyncMetricsSnapshot, SyncWorkerConfig,
    WorkerPool,
};

use crate::config::SyncSettings;
use crate::constants::DEFAULT_SYNC_REPORT_INTERVAL_SECS;
use crate::telemetry::metrics;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the index sync background task.
#[derive(Debug, Clone)]
pub struct IndexSyncJobConfig {
    /// Worker count, retry policy and poll interval
    pub worker: SyncWorkerConfig,
    /// How often queue depth is logged and exported (default: 30 seconds)
    pub report_interval: Duration,
}

impl Default for IndexSyncJobConfig {
    fn default() -> Self {
        Self {
            worker: SyncWorkerConfig::default(),
            report_interval: Duration::from_secs(DEFAULT_SYNC_REPORT_INTERVAL_SECS),
        }
    }
}

impl IndexSyncJobConfig {
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            worker: settings.worker_config(),
            report_interval: settings.report_interval,
        }
    }

    /// See [`SyncSettings::from_env`] for the variables read.
    pub fn from_env() -> Self {
        Self::from_settings(&SyncSettings::from_env())
    }
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Run the worker pool until the shutdown signal flips to `true` (or its
/// sender is dropped), then wait for the workers and return their final
/// counters.
pub async fn index_sync_task(
    sync: Arc<IndexSynchronizer>,
    queue: Arc<dyn PropagationQueue>,
    sync_metrics: Arc<SyncMetrics>,
    config: IndexSyncJobConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> SyncMetricsSnapshot {
    let pool = WorkerPool::spawn_with_metrics(
        sync,
        Arc::clone(&queue),
        config.worker.clone(),
        sync_metrics,
        shutdown_rx.clone(),
    );

    let mut report_interval = interval(config.report_interval);
    report_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        workers = pool.size(),
        max_attempts = config.worker.retry.max_attempts,
        report_interval_secs = config.report_interval.as_secs(),
        "Index sync task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Index sync task shutting down");
                    break;
                }
            }

            _ = report_interval.tick() => {
                report(queue.as_ref(), pool.metrics()).await;
            }
        }
    }

    let snapshot = pool.join().await;
    if let Some(m) = metrics() {
        m.observe_sync(&snapshot);
    }
    tracing::info!(
        applied = snapshot.applied,
        retried = snapshot.retried,
        parked = snapshot.parked,
        converted = snapshot.converted,
        queue_errors = snapshot.queue_errors,
        "Index sync task completed"
    );
    snapshot
}

async fn report(queue: &dyn PropagationQueue, sync_metrics: &SyncMetrics) {
    let snapshot = sync_metrics.snapshot();
    match queue.depth().await {
        Ok(depth) => {
            if let Some(m) = metrics() {
                m.set_queue_depth(&depth);
                m.observe_sync(&snapshot);
            }
            if depth.parked > 0 {
                tracing::warn!(
                    parked = depth.parked,
                    pending = depth.pending(),
                    "propagation tasks parked; requeue with POST /api/sync/parked/requeue"
                );
            } else {
                tracing::debug!(
                    ready = depth.ready,
                    delayed = depth.delayed,
                    in_flight = depth.in_flight,
                    applied = snapshot.applied,
                    "propagation queue status"
                );
            }
        }
        Err(e) => tracing::error!(error = %e, "propagation queue status unavailable"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::Components;
    use vitrine_core::{NewRecord, Price, RecordStatus, VitrineResult};

    #[tokio::test]
    async fn test_workers_apply_until_shutdown() -> VitrineResult<()> {
        let components = Components::in_memory();
        let state = components.app_state();
        let config = IndexSyncJobConfig {
            worker: SyncWorkerConfig::default()
                .with_workers(2)
                .with_poll_interval(Duration::from_millis(10)),
            report_interval: Duration::from_millis(20),
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(index_sync_task(
            Arc::new(components.synchronizer()),
            components.queue.clone(),
            components.sync_metrics.clone(),
            config,
            shutdown_rx,
        ));

        state
            .catalog
            .create(NewRecord {
                sku: "W-1".to_string(),
                name: "Widget".to_string(),
                description: None,
                price: Price::from_cents(999)?,
                category: "tools".to_string(),
                status: RecordStatus::Active,
                image_path: None,
            })
            .await?;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while components.sync_metrics.snapshot().applied < 1 {
            assert!(tokio::time::Instant::now() < deadline, "task was not applied in time");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let _ = shutdown_tx.send(true);
        let snapshot = handle.await.expect("sync task panicked");
        assert_eq!(snapshot.applied, 1);
        assert_eq!(components.queue.depth().await?.pending(), 0);
        Ok(())
    }

    #[test]
    fn test_config_from_settings() {
        let settings = SyncSettings {
            workers: 4,
            report_interval: Duration::from_secs(5),
            ..SyncSettings::default()
        };
        let config = IndexSyncJobConfig::from_settings(&settings);
        assert_eq!(config.worker.workers, 4);
        assert_eq!(config.report_interval, Duration::from_secs(5));
    }
}
