//! Vitrine Storage - Record Store Adapter and Cache Layer
//!
//! Defines the record store abstraction the rest of Vitrine depends on,
//! an in-memory implementation for tests and local runs, and the cache
//! coordinator that fronts single-record and search reads.
//! The Postgres implementation lives in vitrine-api.

pub mod cache;
pub mod memory;
pub mod record_store;

pub use memory::InMemoryRecordStore;
pub use record_store::{Committed, RecordPage, RecordStore};

pub use cache::{
    CacheConfig, CacheCoordinator, CacheRead, CacheStats, CacheStore, InMemoryCacheStore,
    LmdbCacheError, LmdbCacheStore, ReadSource, RecordFetcher, SearchFetcher, TagStamp,
    DEFAULT_SEARCH_TAG,
};
