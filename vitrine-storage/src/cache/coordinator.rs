//! Cache coordinator: read-through access to single records and search
//! pages, and the invalidation rules tying them to record mutations.
//!
//! Two regions share one [`CacheStore`]:
//!
//! - single-record entries under [`record_key`], stamped with the record's
//!   own tag so an invalidation always wins over a concurrent reload;
//! - search pages under [`search_key`], all stamped with one shared tag.
//!   Any mutation flushes the whole tag group, because a relevance-ranked
//!   page cannot be patched for a single record.
//!
//! Deep pages bypass the search region in both directions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use vitrine_core::{
    CatalogRecord, ConfigError, LifecycleEvent, RecordId, SearchPage, SearchRequest,
    VitrineResult,
};

use super::keys::{record_key, record_tag, search_key};
use super::read::CacheRead;
use super::traits::{CacheStats, CacheStore, TagStamp};
use crate::record_store::RecordStore;

/// Tag shared by every search-result entry.
pub const DEFAULT_SEARCH_TAG: &str = "products_search";

/// Configuration for the cache coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// TTL of single-record entries.
    pub record_ttl: Duration,
    /// TTL of search-result entries.
    pub search_ttl: Duration,
    /// Tag grouping all search-result entries.
    pub search_tag: String,
    /// Pages beyond this number are neither read from nor written to the cache.
    pub max_cached_page: u32,
    /// When false every read goes to the origin.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            record_ttl: Duration::from_secs(120),
            search_ttl: Duration::from_secs(120),
            search_tag: DEFAULT_SEARCH_TAG.to_string(),
            max_cached_page: 50,
            enabled: true,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record_ttl(mut self, ttl: Duration) -> Self {
        self.record_ttl = ttl;
        self
    }

    pub fn with_search_ttl(mut self, ttl: Duration) -> Self {
        self.search_ttl = ttl;
        self
    }

    pub fn with_search_tag(mut self, tag: impl Into<String>) -> Self {
        self.search_tag = tag.into();
        self
    }

    pub fn with_max_cached_page(mut self, page: u32) -> Self {
        self.max_cached_page = page;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search_tag.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "search_tag".to_string(),
            });
        }
        for (field, ttl) in [("record_ttl", self.record_ttl), ("search_ttl", self.search_ttl)] {
            if ttl.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: "0".to_string(),
                    reason: "TTL must be positive".to_string(),
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// ORIGINS
// ============================================================================

/// Origin of single-record reads.
#[async_trait]
pub trait RecordFetcher: Send + Sync {
    async fn fetch_record(&self, id: RecordId) -> VitrineResult<Option<CatalogRecord>>;
}

/// Single-record reads include soft-deleted records.
#[async_trait]
impl<T: RecordStore + ?Sized> RecordFetcher for T {
    async fn fetch_record(&self, id: RecordId) -> VitrineResult<Option<CatalogRecord>> {
        self.get(id, true).await
    }
}

/// Origin of search pages.
#[async_trait]
pub trait SearchFetcher: Send + Sync {
    async fn fetch_page(&self, request: &SearchRequest) -> VitrineResult<SearchPage>;
}

// ============================================================================
// COORDINATOR
// ============================================================================

/// Mediates reads through the cache and owns invalidation scoping.
#[derive(Clone)]
pub struct CacheCoordinator {
    store: Arc<dyn CacheStore>,
    config: CacheConfig,
}

impl std::fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("config", &self.config)
            .finish()
    }
}

impl CacheCoordinator {
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Whether `request` skips the search region entirely.
    pub fn bypasses(&self, request: &SearchRequest) -> bool {
        !self.config.enabled || request.page > self.config.max_cached_page
    }

    /// Read a record by id, including soft-deleted records.
    pub async fn record<F>(
        &self,
        id: RecordId,
        origin: &F,
    ) -> VitrineResult<CacheRead<Option<CatalogRecord>>>
    where
        F: RecordFetcher + ?Sized,
    {
        if !self.config.enabled {
            return Ok(CacheRead::bypassed(origin.fetch_record(id).await?));
        }

        let key = record_key(id);
        let tag = record_tag(id);
        let version = self.observe_version(&tag).await;

        if let Some(record) = self.lookup::<CatalogRecord>(&key).await {
            tracing::debug!(record_id = %id, "record cache hit");
            return Ok(CacheRead::from_cache(Some(record)));
        }

        let loaded = origin.fetch_record(id).await?;
        if let (Some(record), Some(version)) = (&loaded, version) {
            self.populate(&key, record, self.config.record_ttl, TagStamp::new(tag, version))
                .await;
        }
        Ok(CacheRead::from_origin(loaded))
    }

    /// Run a search through the tagged search region.
    pub async fn search<F>(
        &self,
        request: &SearchRequest,
        origin: &F,
    ) -> VitrineResult<CacheRead<SearchPage>>
    where
        F: SearchFetcher + ?Sized,
    {
        if self.bypasses(request) {
            return Ok(CacheRead::bypassed(origin.fetch_page(request).await?));
        }

        let key = search_key(request);
        let version = self.observe_version(&self.config.search_tag).await;

        if let Some(page) = self.lookup::<SearchPage>(&key).await {
            tracing::debug!(page = request.page, "search cache hit");
            return Ok(CacheRead::from_cache(page));
        }

        let page = origin.fetch_page(request).await?;
        if let Some(version) = version {
            let stamp = TagStamp::new(self.config.search_tag.clone(), version);
            self.populate(&key, &page, self.config.search_ttl, stamp).await;
        }
        Ok(CacheRead::from_origin(page))
    }

    /// Drop the single-record entry of `id`.
    pub async fn invalidate_record(&self, id: RecordId) -> VitrineResult<()> {
        self.store.flush_tag(&record_tag(id)).await?;
        self.store.delete(&record_key(id)).await?;
        Ok(())
    }

    /// Invalidate every cached search page.
    pub async fn flush_search(&self) -> VitrineResult<u64> {
        let removed = self.store.flush_tag(&self.config.search_tag).await?;
        tracing::debug!(tag = %self.config.search_tag, removed, "search cache flushed");
        Ok(removed)
    }

    /// Invalidation required by a committed lifecycle event: the record's
    /// own entry and the whole search tag group. Both steps are attempted;
    /// the first failure is returned.
    pub async fn invalidate_for(&self, event: &LifecycleEvent) -> VitrineResult<()> {
        let record = self.invalidate_record(event.record_id()).await;
        let search = self.flush_search().await.map(|_| ());
        record.and(search)
    }

    pub async fn stats(&self) -> VitrineResult<CacheStats> {
        self.store.stats().await
    }

    /// Tag version before an origin load. `None` means the cache is
    /// unreachable and the loaded value must not be written back.
    async fn observe_version(&self, tag: &str) -> Option<u64> {
        match self.store.tag_version(tag).await {
            Ok(version) => Some(version),
            Err(e) => {
                tracing::warn!(tag, error = %e, "cache unavailable, reading from origin");
                None
            }
        }
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(key, error = %e, "discarding undecodable cache entry");
                    if let Err(e) = self.store.delete(key).await {
                        tracing::warn!(key, error = %e, "failed to discard cache entry");
                    }
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed, falling back to origin");
                None
            }
        }
    }

    async fn populate<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        stamp: TagStamp,
    ) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to encode cache entry");
                return;
            }
        };
        if let Err(e) = self.store.put(key, bytes, ttl, Some(stamp)).await {
            tracing::warn!(key, error = %e, "cache populate failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::InMemoryCacheStore;
    use crate::cache::read::ReadSource;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;
    use vitrine_core::{CacheError, Price, RecordStatus};

    struct FakeRecords {
        record: Mutex<Option<CatalogRecord>>,
        calls: AtomicU64,
    }

    impl FakeRecords {
        fn with_name(name: &str) -> Self {
            let now = chrono::Utc::now();
            Self {
                record: Mutex::new(Some(CatalogRecord {
                    id: RecordId::new(1),
                    sku: "SKU1".to_string(),
                    name: name.to_string(),
                    description: None,
                    price: Price::from_cents(1000).expect("valid price"),
                    category: "tools".to_string(),
                    status: RecordStatus::Active,
                    image_path: None,
                    created_at: now,
                    updated_at: now,
                    deleted_at: None,
                })),
                calls: AtomicU64::new(0),
            }
        }

        fn rename(&self, name: &str) {
            if let Some(record) = self.record.lock().expect("lock").as_mut() {
                record.name = name.to_string();
            }
        }
    }

    #[async_trait]
    impl RecordFetcher for FakeRecords {
        async fn fetch_record(&self, _id: RecordId) -> VitrineResult<Option<CatalogRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.record.lock().expect("lock").clone())
        }
    }

    struct CountingSearch {
        calls: AtomicU64,
    }

    #[async_trait]
    impl SearchFetcher for CountingSearch {
        async fn fetch_page(&self, _request: &SearchRequest) -> VitrineResult<SearchPage> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SearchPage {
                total: n,
                hits: vec![],
            })
        }
    }

    /// Cache store that fails every operation.
    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get(&self, _key: &str) -> VitrineResult<Option<Vec<u8>>> {
            Err(CacheError::Backend { reason: "down".into() }.into())
        }
        async fn put(
            &self,
            _key: &str,
            _value: Vec<u8>,
            _ttl: Duration,
            _stamp: Option<TagStamp>,
        ) -> VitrineResult<()> {
            Err(CacheError::Backend { reason: "down".into() }.into())
        }
        async fn delete(&self, _key: &str) -> VitrineResult<bool> {
            Err(CacheError::Backend { reason: "down".into() }.into())
        }
        async fn tag_version(&self, _tag: &str) -> VitrineResult<u64> {
            Err(CacheError::Backend { reason: "down".into() }.into())
        }
        async fn flush_tag(&self, _tag: &str) -> VitrineResult<u64> {
            Err(CacheError::Backend { reason: "down".into() }.into())
        }
        async fn stats(&self) -> VitrineResult<CacheStats> {
            Ok(CacheStats::default())
        }
    }

    fn coordinator() -> CacheCoordinator {
        CacheCoordinator::new(Arc::new(InMemoryCacheStore::new()), CacheConfig::default())
    }

    #[tokio::test]
    async fn test_record_read_through_and_hit() -> VitrineResult<()> {
        let cache = coordinator();
        let origin = FakeRecords::with_name("Widget");

        let first = cache.record(RecordId::new(1), &origin).await?;
        assert_eq!(first.source, ReadSource::Origin);
        let second = cache.record(RecordId::new(1), &origin).await?;
        assert!(second.is_hit());
        assert_eq!(second.value.map(|r| r.name), Some("Widget".to_string()));
        assert_eq!(origin.calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_invalidation_prevents_stale_name() -> VitrineResult<()> {
        let cache = coordinator();
        let origin = FakeRecords::with_name("Widget");
        cache.record(RecordId::new(1), &origin).await?;

        origin.rename("Gadget");
        cache
            .invalidate_for(&LifecycleEvent::Updated(RecordId::new(1)))
            .await?;

        let read = cache.record(RecordId::new(1), &origin).await?;
        assert_eq!(read.source, ReadSource::Origin);
        assert_eq!(read.value.map(|r| r.name), Some("Gadget".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_absent_records_are_not_cached() -> VitrineResult<()> {
        let cache = coordinator();
        let origin = FakeRecords {
            record: Mutex::new(None),
            calls: AtomicU64::new(0),
        };
        assert!(cache.record(RecordId::new(9), &origin).await?.value.is_none());
        assert!(cache.record(RecordId::new(9), &origin).await?.value.is_none());
        assert_eq!(origin.calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_any_mutation_flushes_every_search_page() -> VitrineResult<()> {
        let cache = coordinator();
        let origin = CountingSearch {
            calls: AtomicU64::new(0),
        };
        let first = SearchRequest::default();
        let second = SearchRequest::default().with_page(2, 15);

        cache.search(&first, &origin).await?;
        cache.search(&second, &origin).await?;
        assert!(cache.search(&first, &origin).await?.is_hit());
        assert!(cache.search(&second, &origin).await?.is_hit());

        cache
            .invalidate_for(&LifecycleEvent::Created(RecordId::new(77)))
            .await?;

        assert!(!cache.search(&first, &origin).await?.is_hit());
        assert!(!cache.search(&second, &origin).await?.is_hit());
        assert_eq!(origin.calls.load(Ordering::SeqCst), 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_deep_pages_bypass_cache() -> VitrineResult<()> {
        let cache = coordinator();
        let origin = CountingSearch {
            calls: AtomicU64::new(0),
        };
        let deep = SearchRequest::default().with_page(51, 15);
        let edge = SearchRequest::default().with_page(50, 15);

        assert_eq!(cache.search(&deep, &origin).await?.source, ReadSource::Bypass);
        assert_eq!(cache.search(&deep, &origin).await?.source, ReadSource::Bypass);
        cache.search(&edge, &origin).await?;
        assert!(cache.search(&edge, &origin).await?.is_hit());
        assert_eq!(cache.stats().await?.entry_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_disabled_cache_always_bypasses() -> VitrineResult<()> {
        let cache = CacheCoordinator::new(
            Arc::new(InMemoryCacheStore::new()),
            CacheConfig::default().with_enabled(false),
        );
        let origin = FakeRecords::with_name("Widget");
        cache.record(RecordId::new(1), &origin).await?;
        let read = cache.record(RecordId::new(1), &origin).await?;
        assert_eq!(read.source, ReadSource::Bypass);
        assert_eq!(origin.calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_cache_falls_back_to_origin() -> VitrineResult<()> {
        let cache = CacheCoordinator::new(Arc::new(BrokenStore), CacheConfig::default());
        let origin = FakeRecords::with_name("Widget");
        let read = cache.record(RecordId::new(1), &origin).await?;
        assert_eq!(read.value.map(|r| r.name), Some("Widget".to_string()));

        let err = cache
            .invalidate_for(&LifecycleEvent::Updated(RecordId::new(1)))
            .await
            .expect_err("invalidation failures must surface");
        assert!(err.is_retryable());
        Ok(())
    }

    #[test]
    fn test_config_validation() {
        assert!(CacheConfig::default().validate().is_ok());
        assert!(CacheConfig::default().with_search_tag(" ").validate().is_err());
        assert!(CacheConfig::default()
            .with_record_ttl(Duration::ZERO)
            .validate()
            .is_err());
    }
}
