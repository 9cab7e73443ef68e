//! PostgreSQL Propagation Queue
//!
//! Durable implementation of [`PropagationQueue`] over the
//! `propagation_tasks` table. Tasks survive restarts; a reserved task is
//! leased and returns to the ready set when the lease runs out, so a worker
//! that dies mid-task delays its task instead of losing it.
//!
//! Consumers in any number of processes may share the table: `reserve`
//! claims rows with `FOR UPDATE SKIP LOCKED`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Pool, PoolError};
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_postgres::Row;
use uuid::Uuid;
use vitrine_core::{PropagationTask, QueueError, RecordId, TaskHandle, VitrineResult};
use vitrine_sync::{
    Delivery, ParkedTask, PropagationQueue, QueueDepth, DEFAULT_LEASE, DEFAULT_QUEUE_CAPACITY,
};

/// How often an idle `reserve` re-checks the table for due tasks.
const DEFAULT_QUEUE_POLL: Duration = Duration::from_millis(200);

const RESERVE_SQL: &str = "\
    UPDATE propagation_tasks \
    SET attempts = attempts + 1, leased_until = now() + make_interval(secs => $1) \
    WHERE handle = ( \
        SELECT handle FROM propagation_tasks \
        WHERE state = 'pending' AND available_at <= now() \
          AND (leased_until IS NULL OR leased_until <= now()) \
        ORDER BY available_at, handle \
        FOR UPDATE SKIP LOCKED \
        LIMIT 1 \
    ) \
    RETURNING handle, op, record_id, attempts, enqueued_at, leased_until";

const DEPTH_SQL: &str = "\
    SELECT \
        COUNT(*) FILTER (WHERE state = 'pending' AND leased_until > now()) AS in_flight, \
        COUNT(*) FILTER (WHERE state = 'pending' AND (leased_until IS NULL OR leased_until <= now()) \
                         AND available_at > now()) AS delayed, \
        COUNT(*) FILTER (WHERE state = 'pending' AND (leased_until IS NULL OR leased_until <= now()) \
                         AND available_at <= now()) AS ready, \
        COUNT(*) FILTER (WHERE state = 'parked') AS parked \
    FROM propagation_tasks";

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn pool_error(err: PoolError) -> QueueError {
    tracing::error!("Queue connection pool error: {:?}", err);
    QueueError::Unavailable {
        reason: format!("failed to acquire connection: {}", err),
    }
}

fn query_error(err: tokio_postgres::Error) -> QueueError {
    tracing::error!("Queue database error: {:?}", err);
    QueueError::Unavailable {
        reason: "queue database operation failed".to_string(),
    }
}

fn attempt_token(delivery: &Delivery) -> i32 {
    i32::try_from(delivery.attempt).unwrap_or(i32::MAX)
}

fn count(row: &Row, column: &str) -> usize {
    usize::try_from(row.get::<_, i64>(column)).unwrap_or(0)
}

fn task_from_row(row: &Row) -> Result<PropagationTask, QueueError> {
    let op: String = row.get("op");
    let id = RecordId::new(row.get("record_id"));
    PropagationTask::from_kind(&op, id).ok_or_else(|| QueueError::Unavailable {
        reason: format!("unknown propagation op '{}'", op),
    })
}

fn delivery_from_row(row: &Row) -> Result<Delivery, QueueError> {
    let handle: Uuid = row.get("handle");
    let attempts: i32 = row.get("attempts");
    Ok(Delivery {
        handle: TaskHandle::from_uuid(handle),
        task: task_from_row(row)?,
        attempt: u32::try_from(attempts).unwrap_or(0),
        enqueued_at: row.get("enqueued_at"),
        leased_until: row.get("leased_until"),
    })
}

fn parked_from_row(row: &Row) -> Result<ParkedTask, QueueError> {
    let handle: Uuid = row.get("handle");
    let attempts: i32 = row.get("attempts");
    let reason: Option<String> = row.get("reason");
    Ok(ParkedTask {
        handle: TaskHandle::from_uuid(handle),
        task: task_from_row(row)?,
        attempts: u32::try_from(attempts).unwrap_or(0),
        reason: reason.unwrap_or_default(),
        parked_at: row.get("parked_at"),
    })
}

// ============================================================================
// POSTGRES QUEUE
// ============================================================================

/// Propagation queue backed by the `propagation_tasks` table.
///
/// `capacity` bounds the pending rows; parked rows do not count against it.
pub struct PgPropagationQueue {
    pool: Pool,
    capacity: usize,
    lease: Duration,
    poll: Duration,
    closed: AtomicBool,
    notify: Notify,
}

impl PgPropagationQueue {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            capacity: DEFAULT_QUEUE_CAPACITY,
            lease: DEFAULT_LEASE,
            poll: DEFAULT_QUEUE_POLL,
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// How long a reserved task stays invisible to other consumers.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// How often an idle consumer polls the table.
    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    async fn get_conn(&self) -> Result<deadpool_postgres::Object, QueueError> {
        self.pool.get().await.map_err(pool_error)
    }

    async fn try_reserve(&self) -> Result<Option<Delivery>, QueueError> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(RESERVE_SQL, &[&self.lease.as_secs_f64()])
            .await
            .map_err(query_error)?;
        row.as_ref().map(delivery_from_row).transpose()
    }

    /// Run a statement that settles one leased delivery. Zero affected rows
    /// means the lease was lost to another reservation.
    async fn settle(
        &self,
        delivery: &Delivery,
        sql: &str,
        extra: &(dyn tokio_postgres::types::ToSql + Sync),
    ) -> Result<(), QueueError> {
        let conn = self.get_conn().await?;
        let settled = conn
            .execute(
                sql,
                &[&delivery.handle.as_uuid(), &attempt_token(delivery), extra],
            )
            .await
            .map_err(query_error)?;
        if settled == 0 {
            return Err(QueueError::UnknownDelivery {
                handle: delivery.handle.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PropagationQueue for PgPropagationQueue {
    async fn submit(&self, task: PropagationTask) -> Result<TaskHandle, QueueError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }
        let conn = self.get_conn().await?;
        let handle = TaskHandle::new();
        let capacity = i64::try_from(self.capacity).unwrap_or(i64::MAX);
        let inserted = conn
            .execute(
                "INSERT INTO propagation_tasks (handle, op, record_id) \
                 SELECT $1::UUID, $2::VARCHAR, $3::BIGINT \
                 WHERE (SELECT COUNT(*) FROM propagation_tasks WHERE state = 'pending') < $4",
                &[
                    &handle.as_uuid(),
                    &task.kind(),
                    &task.record_id().get(),
                    &capacity,
                ],
            )
            .await
            .map_err(query_error)?;
        if inserted == 0 {
            return Err(QueueError::Full {
                capacity: self.capacity,
            });
        }
        self.notify.notify_one();
        tracing::trace!(task = %task, handle = %handle, "propagation task persisted");
        Ok(handle)
    }

    async fn reserve(&self, wait: Duration) -> VitrineResult<Option<Delivery>> {
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.notify.notified();
            if let Some(delivery) = self.try_reserve().await? {
                return Ok(Some(delivery));
            }
            let now = Instant::now();
            if self.closed.load(Ordering::Acquire) || now >= deadline {
                return Ok(None);
            }
            let nap = self.poll.min(deadline - now);
            let _ = tokio::time::timeout(nap, notified).await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> VitrineResult<()> {
        let conn = self.get_conn().await?;
        let removed = conn
            .execute(
                "DELETE FROM propagation_tasks \
                 WHERE handle = $1 AND attempts = $2 AND state = 'pending'",
                &[&delivery.handle.as_uuid(), &attempt_token(delivery)],
            )
            .await
            .map_err(query_error)?;
        if removed == 0 {
            return Err(QueueError::UnknownDelivery {
                handle: delivery.handle.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn retry(&self, delivery: &Delivery, delay: Duration) -> VitrineResult<()> {
        self.settle(
            delivery,
            "UPDATE propagation_tasks \
             SET leased_until = NULL, available_at = now() + make_interval(secs => $3) \
             WHERE handle = $1 AND attempts = $2 AND state = 'pending'",
            &delay.as_secs_f64(),
        )
        .await?;
        Ok(())
    }

    async fn park(&self, delivery: &Delivery, reason: &str) -> VitrineResult<()> {
        self.settle(
            delivery,
            "UPDATE propagation_tasks \
             SET state = 'parked', leased_until = NULL, reason = $3, parked_at = now() \
             WHERE handle = $1 AND attempts = $2 AND state = 'pending'",
            &reason,
        )
        .await?;
        Ok(())
    }

    async fn depth(&self) -> VitrineResult<QueueDepth> {
        let conn = self.get_conn().await?;
        let row = conn.query_one(DEPTH_SQL, &[]).await.map_err(query_error)?;
        Ok(QueueDepth {
            ready: count(&row, "ready"),
            delayed: count(&row, "delayed"),
            in_flight: count(&row, "in_flight"),
            parked: count(&row, "parked"),
        })
    }

    async fn parked(&self) -> VitrineResult<Vec<ParkedTask>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT handle, op, record_id, attempts, reason, parked_at \
                 FROM propagation_tasks WHERE state = 'parked' \
                 ORDER BY parked_at, handle",
                &[],
            )
            .await
            .map_err(query_error)?;
        let parked = rows
            .iter()
            .map(parked_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parked)
    }

    async fn requeue_parked(&self) -> VitrineResult<usize> {
        let conn = self.get_conn().await?;
        let moved = conn
            .execute(
                "UPDATE propagation_tasks \
                 SET state = 'pending', attempts = 0, available_at = now(), \
                     reason = NULL, parked_at = NULL \
                 WHERE state = 'parked'",
                &[],
            )
            .await
            .map_err(query_error)?;
        if moved > 0 {
            self.notify.notify_waiters();
        }
        Ok(usize::try_from(moved).unwrap_or(usize::MAX))
    }

    /// Stops this handle from accepting submissions. Persisted tasks stay in
    /// the table for the next process.
    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbConfig;

    #[test]
    fn test_reserve_claims_with_skip_locked() {
        assert!(RESERVE_SQL.contains("FOR UPDATE SKIP LOCKED"));
        assert!(RESERVE_SQL.contains("leased_until <= now()"));
    }

    #[test]
    fn test_attempt_token_saturates() {
        let delivery = Delivery {
            handle: TaskHandle::new(),
            task: PropagationTask::Upsert(RecordId::new(1)),
            attempt: u32::MAX,
            enqueued_at: chrono::Utc::now(),
            leased_until: chrono::Utc::now(),
        };
        assert_eq!(attempt_token(&delivery), i32::MAX);
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_without_connecting() -> Result<(), Box<dyn std::error::Error>> {
        // deadpool connects lazily; a closed queue never checks out.
        let config = DbConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..DbConfig::default()
        };
        let queue = PgPropagationQueue::new(config.create_pool()?);
        queue.close().await;
        assert_eq!(
            queue.submit(PropagationTask::Delete(RecordId::new(2))).await,
            Err(QueueError::Closed)
        );
        Ok(())
    }
}
