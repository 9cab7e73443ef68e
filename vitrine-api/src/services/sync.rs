//! Sync Service
//!
//! Read-only view of the propagation queue and worker counters, plus the
//! operator action that gives parked tasks another run.

use std::sync::Arc;

use vitrine_core::VitrineResult;
use vitrine_sync::{PropagationQueue, SyncMetrics};

use crate::types::SyncStatusResponse;

#[derive(Clone)]
pub struct SyncService {
    queue: Arc<dyn PropagationQueue>,
    metrics: Arc<SyncMetrics>,
}

impl SyncService {
    pub fn new(queue: Arc<dyn PropagationQueue>, metrics: Arc<SyncMetrics>) -> Self {
        Self { queue, metrics }
    }

    pub fn queue(&self) -> &Arc<dyn PropagationQueue> {
        &self.queue
    }

    /// Counters shared with the worker pool.
    pub fn metrics(&self) -> &Arc<SyncMetrics> {
        &self.metrics
    }

    pub async fn status(&self) -> VitrineResult<SyncStatusResponse> {
        Ok(SyncStatusResponse {
            depth: self.queue.depth().await?,
            parked: self.queue.parked().await?,
            metrics: self.metrics.snapshot(),
        })
    }

    pub async fn requeue_parked(&self) -> VitrineResult<usize> {
        let moved = self.queue.requeue_parked().await?;
        tracing::info!(requeued = moved, "parked propagation tasks requeued");
        Ok(moved)
    }
}
