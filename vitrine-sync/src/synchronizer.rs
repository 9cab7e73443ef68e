//! Index synchronizer: applies propagation tasks to the search index.
//!
//! A task carries only a record id. Applying it re-reads the record and
//! reconciles the index with the record's state at execution time:
//!
//! | record state          | index action               |
//! |-----------------------|----------------------------|
//! | live                  | ensure index, write doc    |
//! | soft-deleted / absent | remove doc (absent is ok)  |
//!
//! The task kind only records why it was emitted, so a delayed or
//! duplicated task of either kind converges to the same index state.

use std::sync::Arc;

use async_trait::async_trait;
use vitrine_core::{IndexDocument, PropagationTask, VitrineResult};
use vitrine_search::{ensure_index, DeleteOutcome, IndexClient, IndexMapping};
use vitrine_storage::{CacheCoordinator, RecordStore};

/// What applying a task did to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The document was written.
    Indexed,
    /// The document was removed.
    Removed,
    /// No document existed; nothing to remove.
    AlreadyAbsent,
}

/// Result of applying one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    pub outcome: SyncOutcome,
    /// The action differed from the task kind (an upsert that removed, or
    /// a delete that indexed).
    pub converted: bool,
}

/// Flushes cached search results after the index changed.
#[async_trait]
pub trait SearchInvalidator: Send + Sync {
    async fn invalidate_search(&self) -> VitrineResult<()>;
}

#[async_trait]
impl SearchInvalidator for CacheCoordinator {
    async fn invalidate_search(&self) -> VitrineResult<()> {
        self.flush_search().await.map(|_| ())
    }
}

/// Applies propagation tasks.
#[derive(Clone)]
pub struct IndexSynchronizer {
    store: Arc<dyn RecordStore>,
    index: Arc<dyn IndexClient>,
    mapping: IndexMapping,
    invalidator: Option<Arc<dyn SearchInvalidator>>,
}

impl std::fmt::Debug for IndexSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSynchronizer")
            .field("index", &self.index.index_name())
            .field("invalidates_search", &self.invalidator.is_some())
            .finish()
    }
}

impl IndexSynchronizer {
    pub fn new(store: Arc<dyn RecordStore>, index: Arc<dyn IndexClient>) -> Self {
        Self {
            store,
            index,
            mapping: IndexMapping::catalog(),
            invalidator: None,
        }
    }

    pub fn with_mapping(mut self, mapping: IndexMapping) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn with_invalidator(mut self, invalidator: Arc<dyn SearchInvalidator>) -> Self {
        self.invalidator = Some(invalidator);
        self
    }

    pub fn index(&self) -> &Arc<dyn IndexClient> {
        &self.index
    }

    /// Reconcile the index entry of the task's record with the record's
    /// current state.
    pub async fn apply(&self, task: &PropagationTask) -> VitrineResult<Applied> {
        let id = task.record_id();
        let record = self.store.get(id, true).await?;

        let outcome = match record.filter(|r| r.is_live()) {
            Some(record) => {
                ensure_index(self.index.as_ref(), &self.mapping).await?;
                self.index.upsert(&IndexDocument::from(&record)).await?;
                SyncOutcome::Indexed
            }
            None => match self.index.delete(id).await? {
                DeleteOutcome::Deleted => SyncOutcome::Removed,
                DeleteOutcome::NotFound => SyncOutcome::AlreadyAbsent,
            },
        };

        let converted = match task {
            PropagationTask::Upsert(_) => outcome != SyncOutcome::Indexed,
            PropagationTask::Delete(_) => outcome == SyncOutcome::Indexed,
        };
        if converted {
            tracing::debug!(task = %task, outcome = ?outcome, "task reconciled to current record state");
        }

        if let Some(invalidator) = &self.invalidator {
            if let Err(e) = invalidator.invalidate_search().await {
                tracing::warn!(record_id = %id, error = %e, "post-sync search cache flush failed");
            }
        }

        Ok(Applied { outcome, converted })
    }
}
