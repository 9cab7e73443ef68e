//! Catalog Service
//!
//! Record CRUD against the record store, cached reads and search through
//! the cache coordinator, and lifecycle publication after every committed
//! mutation.

use std::sync::Arc;

use vitrine_core::{
    CatalogRecord, LifecycleEvent, NewRecord, RecordId, RecordPatch, SearchPage, SearchRequest,
    VitrineResult,
};
use vitrine_search::SearchExecutor;
use vitrine_storage::{CacheCoordinator, CacheRead, CacheStats, Committed, RecordPage, RecordStore};
use vitrine_sync::LifecycleBus;

use crate::telemetry::metrics;

/// A committed mutation plus the propagation warning, if any handler failed.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation<T> {
    pub value: T,
    pub warning: Option<String>,
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn RecordStore>,
    cache: CacheCoordinator,
    search: SearchExecutor,
    bus: LifecycleBus,
}

impl CatalogService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: CacheCoordinator,
        search: SearchExecutor,
        bus: LifecycleBus,
    ) -> Self {
        Self {
            store,
            cache,
            search,
            bus,
        }
    }

    pub fn cache(&self) -> &CacheCoordinator {
        &self.cache
    }

    /// Uncached listing of live records.
    pub async fn list(&self, page: u32, per_page: u32) -> VitrineResult<RecordPage> {
        self.store.list(page, per_page).await
    }

    /// Cached single read. Soft-deleted records are returned too.
    pub async fn get(&self, id: RecordId) -> VitrineResult<Option<CatalogRecord>> {
        let read = self.cache.record(id, self.store.as_ref()).await?;
        Ok(observe("record", read))
    }

    pub async fn create(&self, record: NewRecord) -> VitrineResult<Mutation<CatalogRecord>> {
        let committed = self.store.insert(record).await?;
        tracing::info!(record_id = %committed.value.id, sku = %committed.value.sku, "record created");
        Ok(self.publish(committed).await)
    }

    pub async fn update(
        &self,
        id: RecordId,
        patch: RecordPatch,
    ) -> VitrineResult<Mutation<CatalogRecord>> {
        let committed = self.store.update(id, patch).await?;
        tracing::info!(record_id = %id, "record updated");
        Ok(self.publish(committed).await)
    }

    pub async fn soft_delete(&self, id: RecordId) -> VitrineResult<Mutation<CatalogRecord>> {
        let committed = self.store.soft_delete(id).await?;
        tracing::info!(record_id = %id, "record soft-deleted");
        Ok(self.publish(committed).await)
    }

    pub async fn restore(&self, id: RecordId) -> VitrineResult<Mutation<CatalogRecord>> {
        let committed = self.store.restore(id).await?;
        tracing::info!(record_id = %id, "record restored");
        Ok(self.publish(committed).await)
    }

    pub async fn hard_delete(&self, id: RecordId) -> VitrineResult<Mutation<RecordId>> {
        let committed = self.store.hard_delete(id).await?;
        tracing::info!(record_id = %id, "record permanently deleted");
        Ok(self.publish(committed).await)
    }

    /// Validated search through the search cache region.
    pub async fn search(&self, request: &SearchRequest) -> VitrineResult<SearchPage> {
        request.validate()?;
        let read = self.cache.search(request, &self.search).await?;
        Ok(observe("search", read))
    }

    pub async fn check_store(&self) -> VitrineResult<()> {
        self.store.ping().await
    }

    pub async fn check_cache(&self) -> VitrineResult<CacheStats> {
        self.cache.stats().await
    }

    /// Run the lifecycle handlers for a committed mutation. Handler
    /// failures become a warning; the mutation stands.
    async fn publish<T>(&self, committed: Committed<T>) -> Mutation<T> {
        let Committed { value, event } = committed;
        let report = self.bus.publish(event).await;
        let warning = report.warning();
        if let Some(warning) = &warning {
            log_propagation_warning(&event, warning);
        }
        Mutation { value, warning }
    }
}

fn log_propagation_warning(event: &LifecycleEvent, warning: &str) {
    tracing::warn!(event = %event, warning, "mutation committed with propagation failures");
}

fn observe<T>(region: &str, read: CacheRead<T>) -> T {
    if let Some(m) = metrics() {
        m.record_cache_lookup(region, read.source.as_str());
    }
    read.into_inner()
}
