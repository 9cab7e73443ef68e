//! Lifecycle handlers that start propagation of a committed mutation.
//!
//! [`ChangeNotifier`] enqueues the propagation task; [`CacheInvalidator`]
//! drops the affected cache entries. Both are registered on the
//! [`LifecycleBus`](crate::bus::LifecycleBus).

use std::sync::Arc;

use async_trait::async_trait;
use vitrine_core::{LifecycleEvent, TaskHandle, VitrineResult};
use vitrine_storage::CacheCoordinator;

use crate::bus::LifecycleHandler;
use crate::queue::PropagationQueue;

/// Emits one propagation task per lifecycle event.
#[derive(Clone)]
pub struct ChangeNotifier {
    queue: Arc<dyn PropagationQueue>,
}

impl ChangeNotifier {
    pub fn new(queue: Arc<dyn PropagationQueue>) -> Self {
        Self { queue }
    }

    /// Submit the task for `event`.
    pub async fn notify(&self, event: &LifecycleEvent) -> VitrineResult<TaskHandle> {
        let task = event.propagation_task();
        let handle = self.queue.submit(task).await?;
        tracing::debug!(event = %event, task = %task, handle = %handle, "propagation task enqueued");
        Ok(handle)
    }
}

#[async_trait]
impl LifecycleHandler for ChangeNotifier {
    fn name(&self) -> &'static str {
        "change_notifier"
    }

    async fn handle(&self, event: &LifecycleEvent) -> VitrineResult<()> {
        self.notify(event).await.map(|_| ())
    }
}

/// Invalidates the record's cache entry and the search tag group.
#[derive(Debug, Clone)]
pub struct CacheInvalidator {
    cache: CacheCoordinator,
}

impl CacheInvalidator {
    pub fn new(cache: CacheCoordinator) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl LifecycleHandler for CacheInvalidator {
    fn name(&self) -> &'static str {
        "cache_invalidator"
    }

    async fn handle(&self, event: &LifecycleEvent) -> VitrineResult<()> {
        self.cache.invalidate_for(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LifecycleBus;
    use crate::queue::InMemoryPropagationQueue;
    use std::time::Duration;
    use vitrine_core::{PropagationTask, RecordId};
    use vitrine_storage::{CacheConfig, InMemoryCacheStore};

    #[tokio::test]
    async fn test_each_event_emits_its_task() -> VitrineResult<()> {
        let queue = Arc::new(InMemoryPropagationQueue::default());
        let notifier = ChangeNotifier::new(queue.clone());
        let id = RecordId::new(5);

        for event in [
            LifecycleEvent::Created(id),
            LifecycleEvent::Updated(id),
            LifecycleEvent::SoftDeleted(id),
            LifecycleEvent::Restored(id),
            LifecycleEvent::HardDeleted(id),
        ] {
            notifier.notify(&event).await?;
        }

        let mut tasks = Vec::new();
        while let Some(delivery) = queue.reserve(Duration::ZERO).await? {
            tasks.push(delivery.task);
            queue.ack(&delivery).await?;
        }
        assert_eq!(
            tasks,
            vec![
                PropagationTask::Upsert(id),
                PropagationTask::Upsert(id),
                PropagationTask::Delete(id),
                PropagationTask::Upsert(id),
                PropagationTask::Delete(id),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_enqueue_failure_is_reported_not_fatal() {
        let queue = Arc::new(InMemoryPropagationQueue::default());
        queue.close().await;
        let cache = CacheCoordinator::new(Arc::new(InMemoryCacheStore::new()), CacheConfig::default());
        let bus = LifecycleBus::new()
            .with_handler(Arc::new(CacheInvalidator::new(cache)))
            .with_handler(Arc::new(ChangeNotifier::new(queue)));

        let report = bus.publish(LifecycleEvent::Created(RecordId::new(1))).await;
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].handler, "change_notifier");
    }
}
