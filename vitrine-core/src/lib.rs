//! Vitrine Core - Catalog Types
//!
//! Pure data structures shared by every Vitrine crate: catalog records and
//! their index projection, lifecycle events and propagation tasks, the
//! search request model and the error taxonomy. No I/O lives here.

use chrono::{DateTime, Utc};

pub mod config;
pub mod error;
pub mod event;
pub mod record;
pub mod search;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

pub use config::RetryConfig;
pub use error::{
    CacheError, ConfigError, FailureKind, IndexError, QueueError, StorageError, ValidationError,
    VitrineError, VitrineResult,
};
pub use event::{LifecycleEvent, PropagationTask, TaskHandle};
pub use record::{
    CatalogRecord, IndexDocument, NewRecord, Price, RecordId, RecordPatch, RecordStatus,
    MAX_PRICE_CENTS,
};
pub use search::{
    SearchFilters, SearchHit, SearchPage, SearchRequest, SortField, SortOrder, DEFAULT_PAGE,
    DEFAULT_PER_PAGE, MAX_PER_PAGE, MAX_RESULT_WINDOW,
};
