//! Propagation queue: at-least-once delivery of propagation tasks.
//!
//! A task is reserved by one consumer at a time and stays in flight until
//! it is acknowledged, scheduled for retry or parked, or until its lease
//! expires. An expired lease makes the task deliverable again, so a
//! consumer that stops mid-task never strands it. Parked tasks never block
//! the tasks behind them.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::time::Instant;
use vitrine_core::{PropagationTask, QueueError, TaskHandle, Timestamp, VitrineResult};

/// Default bound on tasks held by a queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Default time a reserved task stays invisible to other consumers.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(300);

/// A reserved task.
///
/// `attempt` doubles as the lease token: once a lease expires and the task
/// is reserved again, settling the older delivery fails with
/// `QueueError::UnknownDelivery`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub handle: TaskHandle,
    pub task: PropagationTask,
    /// 1-based delivery attempt.
    pub attempt: u32,
    pub enqueued_at: Timestamp,
    /// When the task becomes deliverable again if left unsettled.
    pub leased_until: Timestamp,
}

/// A task that exhausted its retries or failed permanently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ParkedTask {
    pub handle: TaskHandle,
    pub task: PropagationTask,
    pub attempts: u32,
    pub reason: String,
    pub parked_at: chrono::DateTime<Utc>,
}

/// Task counts by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct QueueDepth {
    pub ready: usize,
    /// Waiting for a retry delay to elapse.
    pub delayed: usize,
    pub in_flight: usize,
    pub parked: usize,
}

impl QueueDepth {
    /// Tasks that will still be delivered.
    pub fn pending(&self) -> usize {
        self.ready + self.delayed + self.in_flight
    }
}

/// Propagation queue trait.
#[async_trait]
pub trait PropagationQueue: Send + Sync {
    /// Enqueue a task.
    async fn submit(&self, task: PropagationTask) -> Result<TaskHandle, QueueError>;

    /// Reserve the next ready task, waiting up to `wait` for one.
    async fn reserve(&self, wait: Duration) -> VitrineResult<Option<Delivery>>;

    /// Acknowledge successful processing.
    async fn ack(&self, delivery: &Delivery) -> VitrineResult<()>;

    /// Make the task deliverable again after `delay`.
    async fn retry(&self, delivery: &Delivery, delay: Duration) -> VitrineResult<()>;

    /// Move the task to the parked set.
    async fn park(&self, delivery: &Delivery, reason: &str) -> VitrineResult<()>;

    async fn depth(&self) -> VitrineResult<QueueDepth>;

    async fn parked(&self) -> VitrineResult<Vec<ParkedTask>>;

    /// Move every parked task back to the ready queue with a fresh attempt
    /// count. Returns how many were moved.
    async fn requeue_parked(&self) -> VitrineResult<usize>;

    /// Reject further submissions and wake waiting consumers.
    async fn close(&self);
}

// ============================================================================
// IN-MEMORY QUEUE
// ============================================================================

#[derive(Debug, Clone)]
struct Pending {
    handle: TaskHandle,
    task: PropagationTask,
    attempts: u32,
    enqueued_at: Timestamp,
}

#[derive(Debug, Default)]
struct Inner {
    ready: VecDeque<Pending>,
    delayed: Vec<(Instant, Pending)>,
    in_flight: HashMap<TaskHandle, (Instant, Pending)>,
    parked: Vec<ParkedTask>,
    closed: bool,
}

impl Inner {
    fn held(&self) -> usize {
        self.ready.len() + self.delayed.len() + self.in_flight.len()
    }

    /// Return tasks with expired leases to the front of the ready queue,
    /// then move due delayed tasks behind them, oldest deadline first.
    fn promote_due(&mut self, now: Instant) {
        let mut expired: Vec<TaskHandle> = self
            .in_flight
            .iter()
            .filter(|(_, (lease_end, _))| *lease_end <= now)
            .map(|(handle, _)| *handle)
            .collect();
        // Handles are time-ordered, so this restores submission order.
        expired.sort();
        for handle in expired.into_iter().rev() {
            if let Some((_, pending)) = self.in_flight.remove(&handle) {
                tracing::warn!(
                    handle = %handle,
                    task = %pending.task,
                    attempts = pending.attempts,
                    "propagation task lease expired, redelivering"
                );
                self.ready.push_front(pending);
            }
        }

        if self.delayed.is_empty() {
            return;
        }
        self.delayed.sort_by_key(|(due, _)| *due);
        let due_count = self.delayed.iter().take_while(|(due, _)| *due <= now).count();
        for (_, pending) in self.delayed.drain(..due_count) {
            self.ready.push_back(pending);
        }
    }

    fn next_due(&self) -> Option<Instant> {
        let delayed = self.delayed.iter().map(|(due, _)| *due);
        let leases = self.in_flight.values().map(|(lease_end, _)| *lease_end);
        delayed.chain(leases).min()
    }

    /// Remove the in-flight entry a delivery refers to. A delivery whose
    /// lease was taken over by a later reservation no longer matches.
    fn take_in_flight(&mut self, delivery: &Delivery) -> Result<Pending, QueueError> {
        let current = matches!(
            self.in_flight.get(&delivery.handle),
            Some((_, pending)) if pending.attempts == delivery.attempt
        );
        let removed = if current {
            self.in_flight.remove(&delivery.handle)
        } else {
            None
        };
        removed
            .map(|(_, pending)| pending)
            .ok_or_else(|| QueueError::UnknownDelivery {
                handle: delivery.handle.to_string(),
            })
    }
}

/// Bounded in-process propagation queue.
///
/// Tasks do not survive the process. Production wiring uses the
/// PostgreSQL-backed queue; this one serves tests and single-process tools.
#[derive(Debug)]
pub struct InMemoryPropagationQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
    lease: Duration,
}

impl Default for InMemoryPropagationQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl InMemoryPropagationQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            capacity,
            lease: DEFAULT_LEASE,
        }
    }

    /// Set how long a reserved task stays in flight before it is
    /// redelivered.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, QueueError> {
        self.inner.lock().map_err(|_| QueueError::Unavailable {
            reason: "queue lock poisoned".to_string(),
        })
    }
}

fn lease_deadline(lease: Duration) -> Timestamp {
    chrono::Duration::from_std(lease)
        .ok()
        .and_then(|lease| Utc::now().checked_add_signed(lease))
        .unwrap_or(chrono::DateTime::<Utc>::MAX_UTC)
}

#[async_trait]
impl PropagationQueue for InMemoryPropagationQueue {
    async fn submit(&self, task: PropagationTask) -> Result<TaskHandle, QueueError> {
        let handle = {
            let mut inner = self.lock()?;
            if inner.closed {
                return Err(QueueError::Closed);
            }
            if inner.held() >= self.capacity {
                return Err(QueueError::Full {
                    capacity: self.capacity,
                });
            }
            let handle = TaskHandle::new();
            inner.ready.push_back(Pending {
                handle,
                task,
                attempts: 0,
                enqueued_at: Utc::now(),
            });
            handle
        };
        self.notify.notify_one();
        tracing::trace!(task = %task, handle = %handle, "propagation task submitted");
        Ok(handle)
    }

    async fn reserve(&self, wait: Duration) -> VitrineResult<Option<Delivery>> {
        let deadline = Instant::now() + wait;
        loop {
            // Register interest before inspecting state so a submit between
            // the check and the wait is not lost.
            let notified = self.notify.notified();

            let next_due = {
                let mut inner = self.lock()?;
                let now = Instant::now();
                inner.promote_due(now);
                if let Some(mut pending) = inner.ready.pop_front() {
                    pending.attempts += 1;
                    let delivery = Delivery {
                        handle: pending.handle,
                        task: pending.task,
                        attempt: pending.attempts,
                        enqueued_at: pending.enqueued_at,
                        leased_until: lease_deadline(self.lease),
                    };
                    inner.in_flight.insert(pending.handle, (now + self.lease, pending));
                    return Ok(Some(delivery));
                }
                if inner.closed || now >= deadline {
                    return Ok(None);
                }
                inner.next_due()
            };

            let wake_at = next_due.map_or(deadline, |due| due.min(deadline));
            let _ = tokio::time::timeout_at(wake_at, notified).await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> VitrineResult<()> {
        let mut inner = self.lock()?;
        inner.take_in_flight(delivery)?;
        Ok(())
    }

    async fn retry(&self, delivery: &Delivery, delay: Duration) -> VitrineResult<()> {
        {
            let mut inner = self.lock()?;
            let pending = inner.take_in_flight(delivery)?;
            inner.delayed.push((Instant::now() + delay, pending));
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn park(&self, delivery: &Delivery, reason: &str) -> VitrineResult<()> {
        let mut inner = self.lock()?;
        let pending = inner.take_in_flight(delivery)?;
        inner.parked.push(ParkedTask {
            handle: pending.handle,
            task: pending.task,
            attempts: pending.attempts,
            reason: reason.to_string(),
            parked_at: Utc::now(),
        });
        Ok(())
    }

    async fn depth(&self) -> VitrineResult<QueueDepth> {
        let mut inner = self.lock()?;
        inner.promote_due(Instant::now());
        Ok(QueueDepth {
            ready: inner.ready.len(),
            delayed: inner.delayed.len(),
            in_flight: inner.in_flight.len(),
            parked: inner.parked.len(),
        })
    }

    async fn parked(&self) -> VitrineResult<Vec<ParkedTask>> {
        let inner = self.lock()?;
        Ok(inner.parked.clone())
    }

    async fn requeue_parked(&self) -> VitrineResult<usize> {
        let moved = {
            let mut inner = self.lock()?;
            let parked: Vec<ParkedTask> = inner.parked.drain(..).collect();
            let moved = parked.len();
            for task in parked {
                inner.ready.push_back(Pending {
                    handle: task.handle,
                    task: task.task,
                    attempts: 0,
                    enqueued_at: Utc::now(),
                });
            }
            moved
        };
        if moved > 0 {
            self.notify.notify_waiters();
        }
        Ok(moved)
    }

    async fn close(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.closed = true;
        }
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vitrine_core::RecordId;

    const NO_WAIT: Duration = Duration::ZERO;

    fn upsert(id: i64) -> PropagationTask {
        PropagationTask::Upsert(RecordId::new(id))
    }

    #[tokio::test]
    async fn test_fifo_delivery_and_ack() -> VitrineResult<()> {
        let queue = InMemoryPropagationQueue::default();
        queue.submit(upsert(1)).await?;
        queue.submit(upsert(2)).await?;

        let first = queue.reserve(NO_WAIT).await?.expect("first task");
        assert_eq!(first.task, upsert(1));
        assert_eq!(first.attempt, 1);
        assert_eq!(queue.depth().await?.in_flight, 1);

        queue.ack(&first).await?;
        let second = queue.reserve(NO_WAIT).await?.expect("second task");
        assert_eq!(second.task, upsert(2));
        queue.ack(&second).await?;

        assert!(queue.reserve(NO_WAIT).await?.is_none());
        assert_eq!(queue.depth().await?.pending(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_capacity_and_close() -> VitrineResult<()> {
        let queue = InMemoryPropagationQueue::new(1);
        queue.submit(upsert(1)).await?;
        assert_eq!(
            queue.submit(upsert(2)).await,
            Err(QueueError::Full { capacity: 1 })
        );

        queue.close().await;
        let delivery = queue.reserve(NO_WAIT).await?.expect("queued before close");
        queue.ack(&delivery).await?;
        assert_eq!(queue.submit(upsert(3)).await, Err(QueueError::Closed));
        Ok(())
    }

    #[tokio::test]
    async fn test_delayed_retry_does_not_block_ready_tasks() -> VitrineResult<()> {
        let queue = InMemoryPropagationQueue::default();
        queue.submit(upsert(1)).await?;
        queue.submit(upsert(2)).await?;

        let failing = queue.reserve(NO_WAIT).await?.expect("task 1");
        queue.retry(&failing, Duration::from_millis(50)).await?;

        let next = queue.reserve(NO_WAIT).await?.expect("task 2 is not blocked");
        assert_eq!(next.task, upsert(2));
        queue.ack(&next).await?;

        let retried = queue
            .reserve(Duration::from_secs(1))
            .await?
            .expect("task 1 after its delay");
        assert_eq!(retried.task, upsert(1));
        assert_eq!(retried.attempt, 2);
        assert_eq!(retried.handle, failing.handle);
        Ok(())
    }

    #[tokio::test]
    async fn test_park_and_requeue() -> VitrineResult<()> {
        let queue = InMemoryPropagationQueue::default();
        queue.submit(PropagationTask::Delete(RecordId::new(9))).await?;
        let delivery = queue.reserve(NO_WAIT).await?.expect("task");
        queue.park(&delivery, "index rejected document").await?;

        let parked = queue.parked().await?;
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].reason, "index rejected document");
        assert_eq!(queue.depth().await?.pending(), 0);

        assert_eq!(queue.requeue_parked().await?, 1);
        let again = queue.reserve(NO_WAIT).await?.expect("requeued task");
        assert_eq!(again.attempt, 1);
        assert!(queue.parked().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_delivery_is_rejected() -> VitrineResult<()> {
        let queue = InMemoryPropagationQueue::default();
        queue.submit(upsert(1)).await?;
        let delivery = queue.reserve(NO_WAIT).await?.expect("task");
        queue.ack(&delivery).await?;
        assert!(queue.ack(&delivery).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_waiting_consumer_wakes_on_submit() -> VitrineResult<()> {
        let queue = Arc::new(InMemoryPropagationQueue::default());
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.reserve(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.submit(upsert(4)).await?;

        let delivery = consumer.await.expect("join")?.expect("woken by submit");
        assert_eq!(delivery.task, upsert(4));
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_lease_redelivers_task() -> VitrineResult<()> {
        let queue = InMemoryPropagationQueue::default().with_lease(Duration::from_millis(20));
        queue.submit(upsert(5)).await?;

        let abandoned = queue.reserve(NO_WAIT).await?.expect("task");
        assert_eq!(queue.depth().await?.in_flight, 1);
        assert!(queue.reserve(NO_WAIT).await?.is_none());

        let redelivered = queue
            .reserve(Duration::from_secs(1))
            .await?
            .expect("redelivered after the lease expired");
        assert_eq!(redelivered.handle, abandoned.handle);
        assert_eq!(redelivered.attempt, 2);

        // The stale delivery can no longer settle the task.
        assert!(queue.ack(&abandoned).await.is_err());
        queue.ack(&redelivered).await?;
        assert_eq!(queue.depth().await?.pending(), 0);
        Ok(())
    }
}
