//! Index client trait.

use async_trait::async_trait;
use vitrine_core::{IndexDocument, IndexError, RecordId, SearchPage, VitrineError, VitrineResult};

use crate::mapping::IndexMapping;
use crate::query::NativeQuery;

/// Outcome of an index-creation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// Outcome of a document removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// No such document (or no index). Already converged.
    NotFound,
}

/// Search engine index-management and document API.
///
/// Implementations must be thread-safe (Send + Sync). A client is bound to
/// one index.
#[async_trait]
pub trait IndexClient: Send + Sync {
    /// Name of the index this client operates on.
    fn index_name(&self) -> &str;

    async fn exists(&self) -> VitrineResult<bool>;

    /// Create the index with `mapping`. An existing index is reported as
    /// [`CreateOutcome::AlreadyExists`], not as an error.
    async fn create_index(&self, mapping: &IndexMapping) -> VitrineResult<CreateOutcome>;

    /// Drop the index. Returns whether it existed.
    async fn delete_index(&self) -> VitrineResult<bool>;

    /// Write or overwrite the document keyed by `document.id`.
    async fn upsert(&self, document: &IndexDocument) -> VitrineResult<()>;

    async fn delete(&self, id: RecordId) -> VitrineResult<DeleteOutcome>;

    /// Execute a query. A missing index is reported as
    /// [`IndexError::IndexMissing`].
    async fn query(&self, query: &NativeQuery) -> VitrineResult<SearchPage>;

    /// Connectivity check.
    async fn ping(&self) -> VitrineResult<()> {
        Ok(())
    }
}

/// Make sure the index exists, creating it with `mapping` if needed.
///
/// Creation racing another creator counts as success.
pub async fn ensure_index<C>(client: &C, mapping: &IndexMapping) -> VitrineResult<()>
where
    C: IndexClient + ?Sized,
{
    if client.exists().await? {
        return Ok(());
    }
    match client.create_index(mapping).await {
        Ok(CreateOutcome::Created) => {
            tracing::info!(index = client.index_name(), "search index created");
            Ok(())
        }
        Ok(CreateOutcome::AlreadyExists)
        | Err(VitrineError::Index(IndexError::AlreadyExists { .. })) => Ok(()),
        Err(e) => Err(e),
    }
}
