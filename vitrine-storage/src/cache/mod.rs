//! Read-through cache for catalog records and search pages.
//!
//! The [`CacheCoordinator`] owns both cache regions and the invalidation
//! rules; [`CacheStore`] implementations only provide byte storage with TTLs
//! and versioned tag groups.
//!
//! # Example
//!
//! ```ignore
//! let cache = CacheCoordinator::new(Arc::new(InMemoryCacheStore::new()), CacheConfig::default());
//!
//! let read = cache.record(id, &*record_store).await?;
//! if read.is_hit() {
//!     tracing::debug!("served from cache");
//! }
//!
//! // After any committed mutation:
//! cache.invalidate_for(&LifecycleEvent::Updated(id)).await?;
//! ```

pub mod coordinator;
pub mod keys;
pub mod lmdb_backend;
pub mod memory;
pub mod read;
pub mod traits;

pub use coordinator::{
    CacheConfig, CacheCoordinator, RecordFetcher, SearchFetcher, DEFAULT_SEARCH_TAG,
};
pub use keys::{record_key, record_tag, search_key};
pub use lmdb_backend::{LmdbCacheError, LmdbCacheStore};
pub use memory::InMemoryCacheStore;
pub use read::{CacheRead, ReadSource};
pub use traits::{CacheStats, CacheStore, TagStamp};
