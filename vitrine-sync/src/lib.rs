//! Vitrine Sync - Lifecycle Propagation
//!
//! Carries committed record mutations to the search index:
//!
//! ```text
//! RecordStore ──event──▶ LifecycleBus ──▶ ChangeNotifier ──task──▶ PropagationQueue
//!                              │                                        │
//!                              ▼                                        ▼
//!                      CacheInvalidator                     WorkerPool ─▶ IndexSynchronizer ─▶ IndexClient
//! ```
//!
//! Delivery is at-least-once. Every task re-reads the record when it runs,
//! so duplicates and reordering converge to the record's current state.

pub mod bus;
pub mod notifier;
pub mod queue;
pub mod reindex;
pub mod synchronizer;
pub mod worker;

pub use bus::{HandlerFailure, LifecycleBus, LifecycleHandler, PublishReport};
pub use notifier::{CacheInvalidator, ChangeNotifier};
pub use queue::{
    Delivery, InMemoryPropagationQueue, ParkedTask, PropagationQueue, QueueDepth,
    DEFAULT_LEASE, DEFAULT_QUEUE_CAPACITY,
};
pub use reindex::{
    recreate_index, reindex_all, submit_with_backpressure, ReindexOptions, ReindexReport,
    DEFAULT_CAPACITY_WAIT, DEFAULT_REINDEX_BATCH_SIZE,
};
pub use synchronizer::{Applied, IndexSynchronizer, SearchInvalidator, SyncOutcome};
pub use worker::{
    drain_until_idle, process_delivery, process_next, run_worker, wait_until_settled, DrainReport,
    SyncMetrics, SyncMetricsSnapshot, SyncWorkerConfig, TaskDisposition, WorkerPool,
};
