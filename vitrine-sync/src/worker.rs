//! Background consumers of the propagation queue.
//!
//! Each worker loops: reserve a task, apply it, then acknowledge, schedule
//! a retry with backoff, or park it. A parked task never blocks the tasks
//! behind it.
//!
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let pool = WorkerPool::spawn(sync, queue, SyncWorkerConfig::default(), shutdown_rx);
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! pool.join().await;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use vitrine_core::{RetryConfig, VitrineResult};

use crate::queue::{Delivery, PropagationQueue, QueueDepth};
use crate::synchronizer::{Applied, IndexSynchronizer};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the sync worker pool.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncWorkerConfig {
    /// Number of concurrent workers (default: 2)
    pub workers: usize,
    /// Retry policy for failed tasks
    pub retry: RetryConfig,
    /// How long an idle worker waits on the queue before re-checking the
    /// shutdown signal (default: 500 ms)
    pub poll_interval: Duration,
}

impl Default for SyncWorkerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            retry: RetryConfig::default(),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl SyncWorkerConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for task processing.
#[derive(Debug, Default)]
pub struct SyncMetrics {
    /// Tasks applied and acknowledged
    pub applied: AtomicU64,
    /// Failed attempts scheduled for retry
    pub retried: AtomicU64,
    /// Tasks parked after permanent failure or exhausted retries
    pub parked: AtomicU64,
    /// Applied tasks whose action differed from their kind
    pub converted: AtomicU64,
    /// Queue operations that failed
    pub queue_errors: AtomicU64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SyncMetricsSnapshot {
        SyncMetricsSnapshot {
            applied: self.applied.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            parked: self.parked.load(Ordering::Relaxed),
            converted: self.converted.load(Ordering::Relaxed),
            queue_errors: self.queue_errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of sync metrics at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SyncMetricsSnapshot {
    pub applied: u64,
    pub retried: u64,
    pub parked: u64,
    pub converted: u64,
    pub queue_errors: u64,
}

// ============================================================================
// PROCESSING
// ============================================================================

/// What happened to a delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskDisposition {
    Acked(Applied),
    Retried { delay: Duration },
    Parked { reason: String },
}

/// Apply one delivery and settle it with the queue.
pub async fn process_delivery(
    sync: &IndexSynchronizer,
    queue: &dyn PropagationQueue,
    retry: &RetryConfig,
    metrics: &SyncMetrics,
    delivery: &Delivery,
) -> VitrineResult<TaskDisposition> {
    match sync.apply(&delivery.task).await {
        Ok(applied) => {
            queue.ack(delivery).await?;
            metrics.applied.fetch_add(1, Ordering::Relaxed);
            if applied.converted {
                metrics.converted.fetch_add(1, Ordering::Relaxed);
            }
            tracing::debug!(
                task = %delivery.task,
                attempt = delivery.attempt,
                outcome = ?applied.outcome,
                "propagation task applied"
            );
            Ok(TaskDisposition::Acked(applied))
        }
        Err(e) if e.is_retryable() && retry.allows_retry_after(delivery.attempt) => {
            let delay = retry.backoff_for(delivery.attempt);
            queue.retry(delivery, delay).await?;
            metrics.retried.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                task = %delivery.task,
                attempt = delivery.attempt,
                delay_ms = delay.as_millis() as u64,
                error = %e,
                "propagation task failed, retrying"
            );
            Ok(TaskDisposition::Retried { delay })
        }
        Err(e) => {
            let reason = e.to_string();
            queue.park(delivery, &reason).await?;
            metrics.parked.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                task = %delivery.task,
                attempt = delivery.attempt,
                error = %e,
                "propagation task parked"
            );
            Ok(TaskDisposition::Parked { reason })
        }
    }
}

/// Reserve and process at most one task.
pub async fn process_next(
    sync: &IndexSynchronizer,
    queue: &dyn PropagationQueue,
    retry: &RetryConfig,
    metrics: &SyncMetrics,
    wait: Duration,
) -> VitrineResult<Option<TaskDisposition>> {
    match queue.reserve(wait).await? {
        Some(delivery) => process_delivery(sync, queue, retry, metrics, &delivery)
            .await
            .map(Some),
        None => Ok(None),
    }
}

/// Summary of a drain run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub applied: u64,
    pub retried: u64,
    pub parked: u64,
}

/// Process tasks until nothing is ready, delayed or in flight.
///
/// Retries scheduled along the way are waited for, so the call returns only
/// once every task was acknowledged or parked.
pub async fn drain_until_idle(
    sync: &IndexSynchronizer,
    queue: &dyn PropagationQueue,
    retry: &RetryConfig,
    metrics: &SyncMetrics,
) -> VitrineResult<DrainReport> {
    const IDLE_WAIT: Duration = Duration::from_millis(50);
    let mut report = DrainReport::default();
    loop {
        match process_next(sync, queue, retry, metrics, IDLE_WAIT).await? {
            Some(TaskDisposition::Acked(_)) => report.applied += 1,
            Some(TaskDisposition::Retried { .. }) => report.retried += 1,
            Some(TaskDisposition::Parked { .. }) => report.parked += 1,
            None => {
                if queue.depth().await?.pending() == 0 {
                    return Ok(report);
                }
            }
        }
    }
}

/// Wait, without consuming, until the queue holds nothing ready, delayed
/// or in flight. Returns the final depth.
pub async fn wait_until_settled(
    queue: &dyn PropagationQueue,
    poll: Duration,
) -> VitrineResult<QueueDepth> {
    loop {
        let depth = queue.depth().await?;
        if depth.pending() == 0 {
            return Ok(depth);
        }
        tokio::time::sleep(poll).await;
    }
}

/// One worker loop. Runs until the shutdown signal flips to `true`.
///
/// Shutdown is observed only while waiting for a task. A reserved task is
/// always applied and settled before the loop exits.
pub async fn run_worker(
    worker_id: usize,
    sync: Arc<IndexSynchronizer>,
    queue: Arc<dyn PropagationQueue>,
    config: SyncWorkerConfig,
    metrics: Arc<SyncMetrics>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tracing::info!(worker_id, "sync worker started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        let reserved = tokio::select! {
            changed = shutdown_rx.changed() => {
                // A dropped sender also means shutdown.
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
                continue;
            }

            reserved = queue.reserve(config.poll_interval) => reserved,
        };

        let settled = match reserved {
            Ok(Some(delivery)) => {
                process_delivery(&sync, queue.as_ref(), &config.retry, &metrics, &delivery)
                    .await
                    .map(|_| ())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = settled {
            metrics.queue_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(worker_id, error = %e, "sync worker queue error");
            tokio::time::sleep(config.poll_interval).await;
        }
    }

    tracing::info!(worker_id, "sync worker stopped");
}

/// A set of spawned workers sharing one metrics instance.
#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    metrics: Arc<SyncMetrics>,
}

impl WorkerPool {
    pub fn spawn(
        sync: Arc<IndexSynchronizer>,
        queue: Arc<dyn PropagationQueue>,
        config: SyncWorkerConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self::spawn_with_metrics(sync, queue, config, Arc::new(SyncMetrics::new()), shutdown_rx)
    }

    pub fn spawn_with_metrics(
        sync: Arc<IndexSynchronizer>,
        queue: Arc<dyn PropagationQueue>,
        config: SyncWorkerConfig,
        metrics: Arc<SyncMetrics>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let handles = (0..config.workers.max(1))
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&sync),
                    Arc::clone(&queue),
                    config.clone(),
                    Arc::clone(&metrics),
                    shutdown_rx.clone(),
                ))
            })
            .collect();
        Self { handles, metrics }
    }

    pub fn metrics(&self) -> &Arc<SyncMetrics> {
        &self.metrics
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to stop.
    pub async fn join(self) -> SyncMetricsSnapshot {
        for result in join_all(self.handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "sync worker panicked");
            }
        }
        self.metrics.snapshot()
    }
}
