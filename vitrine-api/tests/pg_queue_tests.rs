//! PostgreSQL propagation queue tests.
//!
//! Run with `--features db-tests`. The scenarios share the
//! `propagation_tasks` table, so they run in one test body.

#![cfg(feature = "db-tests")]

use std::time::Duration;

use vitrine_api::{DbConfig, PgPropagationQueue, PgRecordStore};
use vitrine_core::*;
use vitrine_sync::{PropagationQueue, QueueDepth};

const NO_WAIT: Duration = Duration::ZERO;

async fn fresh_store() -> VitrineResult<PgRecordStore> {
    let store = PgRecordStore::from_config(&DbConfig::from_env())?;
    store.migrate().await?;
    let conn = store
        .pool()
        .get()
        .await
        .map_err(|e| QueueError::Unavailable { reason: e.to_string() })?;
    conn.batch_execute("TRUNCATE propagation_tasks")
        .await
        .map_err(|e| QueueError::Unavailable { reason: e.to_string() })?;
    Ok(store)
}

fn queue_on(store: &PgRecordStore) -> PgPropagationQueue {
    PgPropagationQueue::new(store.pool().clone()).with_poll_interval(Duration::from_millis(10))
}

#[tokio::test]
async fn pg_queue_is_durable_and_leased() -> VitrineResult<()> {
    let store = fresh_store().await?;

    // Tasks outlive the queue handle that accepted them.
    let first = queue_on(&store);
    let handle = first.submit(PropagationTask::Upsert(RecordId::new(1))).await?;
    first.submit(PropagationTask::Delete(RecordId::new(2))).await?;
    first.close().await;
    assert_eq!(
        first.submit(PropagationTask::Upsert(RecordId::new(3))).await,
        Err(QueueError::Closed)
    );
    drop(first);

    let queue = queue_on(&store).with_lease(Duration::from_millis(200));
    assert_eq!(queue.depth().await?.ready, 2);

    // Concurrent reservations never claim the same row.
    let other = queue_on(&store).with_lease(Duration::from_millis(200));
    let (a, b) = tokio::join!(queue.reserve(NO_WAIT), other.reserve(NO_WAIT));
    let (a, b) = (a?.expect("first row"), b?.expect("second row"));
    assert_ne!(a.handle, b.handle);
    assert_eq!(queue.depth().await?.in_flight, 2);

    // An unsettled lease expires and the task is redelivered.
    let (abandoned, settled) = if a.handle == handle { (a, b) } else { (b, a) };
    queue.ack(&settled).await?;
    let redelivered = queue
        .reserve(Duration::from_secs(2))
        .await?
        .expect("redelivered after lease expiry");
    assert_eq!(redelivered.handle, abandoned.handle);
    assert_eq!(redelivered.attempt, 2);
    assert!(queue.ack(&abandoned).await.is_err());

    // Retry hides the task until its delay passes, park moves it aside.
    queue.retry(&redelivered, Duration::from_millis(50)).await?;
    assert_eq!(queue.depth().await?.delayed, 1);
    let retried = queue
        .reserve(Duration::from_secs(2))
        .await?
        .expect("due after retry delay");
    assert_eq!(retried.attempt, 3);
    queue.park(&retried, "index rejected document").await?;

    let parked = queue.parked().await?;
    assert_eq!(parked.len(), 1);
    assert_eq!(parked[0].handle, handle);
    assert_eq!(parked[0].reason, "index rejected document");
    assert_eq!(queue.depth().await?.pending(), 0);

    assert_eq!(queue.requeue_parked().await?, 1);
    let again = queue.reserve(NO_WAIT).await?.expect("requeued task");
    assert_eq!(again.attempt, 1);
    queue.ack(&again).await?;
    assert_eq!(queue.depth().await?, QueueDepth::default());

    // The capacity counts pending rows only.
    let bounded = queue_on(&store).with_capacity(1);
    bounded.submit(PropagationTask::Upsert(RecordId::new(4))).await?;
    assert_eq!(
        bounded.submit(PropagationTask::Upsert(RecordId::new(5))).await,
        Err(QueueError::Full { capacity: 1 })
    );
    Ok(())
}
