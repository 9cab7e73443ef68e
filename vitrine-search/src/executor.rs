//! Search executor: validation, query building, timeout and missing-index
//! degradation around an [`IndexClient`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use vitrine_core::{IndexError, SearchPage, SearchRequest, VitrineError, VitrineResult};
use vitrine_storage::SearchFetcher;

use crate::client::IndexClient;
use crate::query::QueryBuilder;

/// Default bound on a single search execution.
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs search requests against an index.
#[derive(Clone)]
pub struct SearchExecutor {
    client: Arc<dyn IndexClient>,
    timeout: Duration,
}

impl std::fmt::Debug for SearchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchExecutor")
            .field("index", &self.client.index_name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SearchExecutor {
    pub fn new(client: Arc<dyn IndexClient>) -> Self {
        Self {
            client,
            timeout: DEFAULT_SEARCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn client(&self) -> &Arc<dyn IndexClient> {
        &self.client
    }

    /// Execute `request`.
    ///
    /// A missing index yields an empty page. A timeout is a retryable
    /// [`IndexError::Timeout`], never an empty page.
    pub async fn execute(&self, request: &SearchRequest) -> VitrineResult<SearchPage> {
        request.validate()?;
        let query = QueryBuilder::build(request);

        match tokio::time::timeout(self.timeout, self.client.query(&query)).await {
            Err(_) => {
                tracing::warn!(
                    index = self.client.index_name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "search timed out"
                );
                Err(IndexError::Timeout {
                    operation: "search".to_string(),
                    after: self.timeout,
                }
                .into())
            }
            Ok(Err(VitrineError::Index(IndexError::IndexMissing { index }))) => {
                tracing::debug!(index = %index, "search against missing index, returning empty page");
                Ok(SearchPage::empty())
            }
            Ok(result) => result,
        }
    }
}

#[async_trait]
impl SearchFetcher for SearchExecutor {
    async fn fetch_page(&self, request: &SearchRequest) -> VitrineResult<SearchPage> {
        self.execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{CreateOutcome, DeleteOutcome};
    use crate::mapping::IndexMapping;
    use crate::memory::InMemoryIndex;
    use crate::query::NativeQuery;
    use vitrine_core::{FailureKind, IndexDocument, RecordId, SearchFilters, SortField};

    /// Index whose queries never finish in time.
    struct StalledIndex;

    #[async_trait]
    impl IndexClient for StalledIndex {
        fn index_name(&self) -> &str {
            "products"
        }
        async fn exists(&self) -> VitrineResult<bool> {
            Ok(true)
        }
        async fn create_index(&self, _mapping: &IndexMapping) -> VitrineResult<CreateOutcome> {
            Ok(CreateOutcome::AlreadyExists)
        }
        async fn delete_index(&self) -> VitrineResult<bool> {
            Ok(true)
        }
        async fn upsert(&self, _document: &IndexDocument) -> VitrineResult<()> {
            Ok(())
        }
        async fn delete(&self, _id: RecordId) -> VitrineResult<DeleteOutcome> {
            Ok(DeleteOutcome::NotFound)
        }
        async fn query(&self, _query: &NativeQuery) -> VitrineResult<SearchPage> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(SearchPage::empty())
        }
    }

    #[tokio::test]
    async fn test_missing_index_degrades_to_empty_page() -> VitrineResult<()> {
        let executor = SearchExecutor::new(Arc::new(InMemoryIndex::new("products")));
        let page = executor.execute(&SearchRequest::default()).await?;
        assert_eq!(page.total, 0);
        assert!(page.hits.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_timeout_is_retryable_failure() {
        let executor =
            SearchExecutor::new(Arc::new(StalledIndex)).with_timeout(Duration::from_millis(20));
        let err = executor
            .execute(&SearchRequest::default())
            .await
            .expect_err("must time out");
        assert!(err.is_timeout());
        assert_eq!(err.kind(), FailureKind::Transient);
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected_before_querying() {
        let executor = SearchExecutor::new(Arc::new(StalledIndex));
        let request = SearchRequest::new(SearchFilters {
            min_price: Some(20.0),
            max_price: Some(5.0),
            sort: Some(SortField::Price),
            ..Default::default()
        });
        let err = executor.execute(&request).await.expect_err("invalid range");
        assert_eq!(err.kind(), FailureKind::Validation);
    }
}
