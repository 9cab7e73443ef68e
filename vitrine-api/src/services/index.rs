//! Index Service
//!
//! Administration of the search index: explicit creation, idempotent
//! deletion and a readiness check. Both administrative calls flush the
//! search cache region.

use std::sync::Arc;

use vitrine_core::{IndexError, VitrineResult};
use vitrine_search::{CreateOutcome, IndexClient, IndexMapping};
use vitrine_storage::CacheCoordinator;

#[derive(Clone)]
pub struct IndexService {
    client: Arc<dyn IndexClient>,
    mapping: IndexMapping,
    cache: CacheCoordinator,
}

impl IndexService {
    pub fn new(client: Arc<dyn IndexClient>, mapping: IndexMapping, cache: CacheCoordinator) -> Self {
        Self {
            client,
            mapping,
            cache,
        }
    }

    pub fn index_name(&self) -> &str {
        self.client.index_name()
    }

    /// Create the index. An existing index is a conflict.
    pub async fn create(&self) -> VitrineResult<()> {
        match self.client.create_index(&self.mapping).await? {
            CreateOutcome::Created => {
                tracing::info!(index = self.index_name(), "search index created");
                self.flush_search().await;
                Ok(())
            }
            CreateOutcome::AlreadyExists => Err(IndexError::AlreadyExists {
                index: self.index_name().to_string(),
            }
            .into()),
        }
    }

    /// Drop the index. Returns whether it existed.
    pub async fn delete(&self) -> VitrineResult<bool> {
        let existed = self.client.delete_index().await?;
        tracing::info!(index = self.index_name(), existed, "search index deleted");
        self.flush_search().await;
        Ok(existed)
    }

    pub async fn ping(&self) -> VitrineResult<()> {
        self.client.ping().await
    }

    async fn flush_search(&self) {
        if let Err(e) = self.cache.flush_search().await {
            tracing::warn!(error = %e, "search cache flush after index change failed");
        }
    }
}
