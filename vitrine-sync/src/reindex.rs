//! Bulk reindex: enqueue an upsert for every live record.
//!
//! Submission applies back-pressure: when the queue is full the walk waits
//! for consumers to make room instead of dropping records.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use vitrine_core::{PropagationTask, QueueError, RecordId, TaskHandle, VitrineResult};
use vitrine_search::{CreateOutcome, IndexClient, IndexMapping};
use vitrine_storage::RecordStore;

use crate::queue::PropagationQueue;

/// Default number of ids read from the record store per batch.
pub const DEFAULT_REINDEX_BATCH_SIZE: usize = 500;

/// Default time a submission waits for room in a full queue.
pub const DEFAULT_CAPACITY_WAIT: Duration = Duration::from_secs(60);

const MAX_FULL_BACKOFF: Duration = Duration::from_millis(500);

/// Settings of a reindex run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReindexOptions {
    /// Ids read from the record store per batch.
    pub batch_size: usize,
    /// How long one submission waits for the queue to drain below capacity
    /// before it is counted as failed.
    pub capacity_wait: Duration,
}

impl Default for ReindexOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_REINDEX_BATCH_SIZE,
            capacity_wait: DEFAULT_CAPACITY_WAIT,
        }
    }
}

impl ReindexOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_capacity_wait(mut self, wait: Duration) -> Self {
        self.capacity_wait = wait;
        self
    }
}

/// Counts of a reindex run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ReindexReport {
    pub submitted: u64,
    pub failed: u64,
}

/// Submit `task`, retrying while the queue reports `Full` until `wait`
/// has passed.
pub async fn submit_with_backpressure(
    queue: &dyn PropagationQueue,
    task: PropagationTask,
    wait: Duration,
) -> Result<TaskHandle, QueueError> {
    let deadline = Instant::now() + wait;
    let mut backoff = Duration::from_millis(10);
    loop {
        match queue.submit(task).await {
            Err(QueueError::Full { capacity }) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(QueueError::Full { capacity });
                }
                tracing::trace!(task = %task, capacity, "queue full, waiting for room");
                tokio::time::sleep(backoff.min(deadline - now)).await;
                backoff = (backoff * 2).min(MAX_FULL_BACKOFF);
            }
            other => return other,
        }
    }
}

/// Walk live record ids in ascending batches and submit one upsert each.
///
/// A full queue holds the walk back until consumers free a slot; only a
/// submission still rejected after `capacity_wait`, or rejected for another
/// reason, is counted as failed. The walk continues past failures.
pub async fn reindex_all(
    store: &dyn RecordStore,
    queue: &dyn PropagationQueue,
    options: &ReindexOptions,
) -> VitrineResult<ReindexReport> {
    let batch_size = options.batch_size.max(1);
    let mut report = ReindexReport::default();
    let mut after: Option<RecordId> = None;

    loop {
        let ids = store.live_ids_after(after, batch_size).await?;
        let Some(last) = ids.last().copied() else {
            break;
        };
        for id in &ids {
            let task = PropagationTask::Upsert(*id);
            match submit_with_backpressure(queue, task, options.capacity_wait).await {
                Ok(_) => report.submitted += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(record_id = %id, error = %e, "reindex submission failed");
                }
            }
        }
        tracing::debug!(batch = ids.len(), last_id = %last, "reindex batch submitted");
        if ids.len() < batch_size {
            break;
        }
        after = Some(last);
    }

    tracing::info!(
        submitted = report.submitted,
        failed = report.failed,
        "reindex enqueued"
    );
    Ok(report)
}

/// Drop the index and create it again with `mapping`.
pub async fn recreate_index(index: &dyn IndexClient, mapping: &IndexMapping) -> VitrineResult<()> {
    let existed = index.delete_index().await?;
    let outcome = index.create_index(mapping).await?;
    tracing::info!(
        index = index.index_name(),
        existed,
        created = outcome == CreateOutcome::Created,
        "search index recreated"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryPropagationQueue;
    use std::sync::Arc;
    use vitrine_core::{NewRecord, Price, RecordStatus};
    use vitrine_search::InMemoryIndex;
    use vitrine_storage::InMemoryRecordStore;

    async fn store_with(count: usize) -> VitrineResult<InMemoryRecordStore> {
        let store = InMemoryRecordStore::new();
        for n in 0..count {
            store
                .insert(NewRecord {
                    sku: format!("SKU{}", n),
                    name: format!("Item {}", n),
                    description: None,
                    price: Price::from_cents(100 + n as i64).expect("valid price"),
                    category: "tools".into(),
                    status: RecordStatus::Active,
                    image_path: None,
                })
                .await?;
        }
        Ok(store)
    }

    #[tokio::test]
    async fn test_submits_every_live_record_once() -> VitrineResult<()> {
        let store = store_with(7).await?;
        store.soft_delete(RecordId::new(3)).await?;
        let queue = InMemoryPropagationQueue::default();

        let options = ReindexOptions::default().with_batch_size(2);
        let report = reindex_all(&store, &queue, &options).await?;
        assert_eq!(report, ReindexReport { submitted: 6, failed: 0 });

        let mut ids = Vec::new();
        while let Some(delivery) = queue.reserve(Duration::ZERO).await? {
            ids.push(delivery.task.record_id().get());
            queue.ack(&delivery).await?;
        }
        assert_eq!(ids, vec![1, 2, 4, 5, 6, 7]);
        Ok(())
    }

    #[tokio::test]
    async fn test_catalog_larger_than_queue_waits_for_room() -> VitrineResult<()> {
        let store = store_with(12).await?;
        let queue = Arc::new(InMemoryPropagationQueue::new(10));

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                let mut ids = Vec::new();
                while ids.len() < 12 {
                    if let Some(delivery) = queue.reserve(Duration::from_secs(5)).await? {
                        ids.push(delivery.task.record_id().get());
                        queue.ack(&delivery).await?;
                    }
                }
                VitrineResult::Ok(ids)
            })
        };

        let options = ReindexOptions::default()
            .with_batch_size(5)
            .with_capacity_wait(Duration::from_secs(5));
        let report = reindex_all(&store, queue.as_ref(), &options).await?;
        assert_eq!(report, ReindexReport { submitted: 12, failed: 0 });

        let ids = consumer.await.expect("consumer joined")?;
        assert_eq!(ids, (1..=12).collect::<Vec<i64>>());
        Ok(())
    }

    #[tokio::test]
    async fn test_full_queue_without_consumer_counts_failures() -> VitrineResult<()> {
        let store = store_with(4).await?;
        let queue = InMemoryPropagationQueue::new(3);
        let options = ReindexOptions::default()
            .with_batch_size(10)
            .with_capacity_wait(Duration::from_millis(30));
        let report = reindex_all(&store, &queue, &options).await?;
        assert_eq!(report, ReindexReport { submitted: 3, failed: 1 });
        Ok(())
    }

    #[tokio::test]
    async fn test_closed_queue_is_not_waited_on() -> VitrineResult<()> {
        let queue = InMemoryPropagationQueue::default();
        queue.close().await;
        let started = Instant::now();
        let result = submit_with_backpressure(
            &queue,
            PropagationTask::Upsert(RecordId::new(1)),
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(result, Err(QueueError::Closed));
        assert!(started.elapsed() < Duration::from_secs(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_recreate_index() -> VitrineResult<()> {
        let index = InMemoryIndex::created("products");
        recreate_index(&index, &IndexMapping::catalog()).await?;
        assert!(index.exists().await?);
        assert!(index.is_empty());
        Ok(())
    }
}
