//! Component wiring.
//!
//! Builds the record store, search index client, propagation queue and
//! cache coordinator from [`AppConfig`], then assembles the application
//! state and the index synchronizer the sync workers run. Connected
//! components keep propagation tasks in PostgreSQL next to the records;
//! in-memory components keep them in the process.

use std::sync::Arc;

use vitrine_core::VitrineResult;
use vitrine_search::{ElasticsearchClient, InMemoryIndex, IndexClient, IndexMapping, SearchExecutor};
use vitrine_storage::{
    CacheConfig, CacheCoordinator, CacheStore, InMemoryCacheStore, InMemoryRecordStore,
    LmdbCacheStore, RecordStore,
};
use vitrine_sync::{
    CacheInvalidator, ChangeNotifier, InMemoryPropagationQueue, IndexSynchronizer, LifecycleBus,
    PropagationQueue, SyncMetrics,
};

use crate::config::{AppConfig, CacheBackend};
use crate::db::PgRecordStore;
use crate::services::{CatalogService, IndexService, SyncService};
use crate::state::AppState;
use crate::task_queue::PgPropagationQueue;

/// The external collaborators of the catalog.
#[derive(Clone)]
pub struct Components {
    pub store: Arc<dyn RecordStore>,
    pub index: Arc<dyn IndexClient>,
    pub queue: Arc<dyn PropagationQueue>,
    pub cache: CacheCoordinator,
    pub mapping: IndexMapping,
    pub search: SearchExecutor,
    /// Counters shared by the worker pool and the status endpoints.
    pub sync_metrics: Arc<SyncMetrics>,
}

impl Components {
    /// Connect to PostgreSQL and Elasticsearch and open the configured
    /// cache store. The schema is migrated on the way, and tasks left in the
    /// queue by a previous process are picked up by the next workers.
    pub async fn connect(config: &AppConfig) -> VitrineResult<Self> {
        let store = PgRecordStore::from_config(&config.db)?;
        store.migrate().await?;

        let index: Arc<dyn IndexClient> =
            Arc::new(ElasticsearchClient::new(config.search.client_config())?);

        let cache_store: Arc<dyn CacheStore> = match config.cache.backend {
            CacheBackend::Memory => Arc::new(InMemoryCacheStore::new()),
            CacheBackend::Lmdb => Arc::new(LmdbCacheStore::new(
                &config.cache.path,
                config.cache.max_size_mb,
            )?),
        };
        tracing::info!(
            backend = ?config.cache.backend,
            index = index.index_name(),
            "components connected"
        );

        let queue = Arc::new(
            PgPropagationQueue::new(store.pool().clone())
                .with_capacity(config.sync.queue_capacity)
                .with_lease(config.sync.lease),
        );
        let search = SearchExecutor::new(index.clone()).with_timeout(config.search.timeout);

        Ok(Self {
            store: Arc::new(store),
            index,
            queue,
            cache: CacheCoordinator::new(cache_store, config.cache.coordinator_config()),
            mapping: IndexMapping::catalog(),
            search,
            sync_metrics: Arc::new(SyncMetrics::new()),
        })
    }

    /// Fully in-process components. The search index starts out created.
    pub fn in_memory() -> Self {
        Self::in_memory_with(CacheConfig::default())
    }

    pub fn in_memory_with(cache_config: CacheConfig) -> Self {
        let index: Arc<dyn IndexClient> = Arc::new(InMemoryIndex::created("products"));
        Self {
            store: Arc::new(InMemoryRecordStore::new()),
            search: SearchExecutor::new(index.clone()),
            index,
            queue: Arc::new(InMemoryPropagationQueue::default()),
            cache: CacheCoordinator::new(Arc::new(InMemoryCacheStore::new()), cache_config),
            mapping: IndexMapping::catalog(),
            sync_metrics: Arc::new(SyncMetrics::new()),
        }
    }

    /// Lifecycle handlers in registration order: cache invalidation runs
    /// before the change notifier enqueues propagation.
    pub fn lifecycle_bus(&self) -> LifecycleBus {
        LifecycleBus::new()
            .with_handler(Arc::new(CacheInvalidator::new(self.cache.clone())))
            .with_handler(Arc::new(ChangeNotifier::new(self.queue.clone())))
    }

    /// Synchronizer applying propagation tasks to the index, flushing the
    /// search cache after every applied task.
    pub fn synchronizer(&self) -> IndexSynchronizer {
        IndexSynchronizer::new(self.store.clone(), self.index.clone())
            .with_mapping(self.mapping.clone())
            .with_invalidator(Arc::new(self.cache.clone()))
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            catalog: CatalogService::new(
                self.store.clone(),
                self.cache.clone(),
                self.search.clone(),
                self.lifecycle_bus(),
            ),
            index: IndexService::new(self.index.clone(), self.mapping.clone(), self.cache.clone()),
            sync: SyncService::new(self.queue.clone(), self.sync_metrics.clone()),
            start_time: std::time::Instant::now(),
        }
    }
}
