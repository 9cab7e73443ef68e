//! Elasticsearch HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use vitrine_core::{
    IndexDocument, IndexError, RecordId, SearchHit, SearchPage, VitrineError, VitrineResult,
};

use crate::client::{CreateOutcome, DeleteOutcome, IndexClient};
use crate::mapping::IndexMapping;
use crate::query::NativeQuery;

/// Default index name for catalog documents.
pub const DEFAULT_INDEX: &str = "products";

/// Connection settings for an Elasticsearch cluster.
#[derive(Clone, PartialEq)]
pub struct ElasticsearchConfig {
    /// Base URL, e.g. `http://localhost:9200`.
    pub base_url: String,
    pub index: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ElasticsearchConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            index: DEFAULT_INDEX.to_string(),
            username: None,
            password: None,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = index.into();
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for ElasticsearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchConfig")
            .field("base_url", &self.base_url)
            .field("index", &self.index)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    total: TotalHits,
    hits: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
struct TotalHits {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_score")]
    score: Option<f64>,
    #[serde(rename = "_source")]
    source: IndexDocument,
}

/// `error.type` of an Elasticsearch error body, if present.
fn error_type(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value["error"]["type"].as_str().map(str::to_string)
}

// ============================================================================
// CLIENT
// ============================================================================

/// Elasticsearch-backed [`IndexClient`].
pub struct ElasticsearchClient {
    client: Client,
    config: ElasticsearchConfig,
}

impl std::fmt::Debug for ElasticsearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchClient")
            .field("config", &self.config)
            .finish()
    }
}

impl ElasticsearchClient {
    pub fn new(config: ElasticsearchConfig) -> VitrineResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| IndexError::Unavailable {
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ElasticsearchConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.config.username {
            Some(user) => builder.basic_auth(user, self.config.password.as_ref()),
            None => builder,
        }
    }

    async fn send(&self, operation: &str, builder: RequestBuilder) -> VitrineResult<Response> {
        builder.send().await.map_err(|e| {
            if e.is_timeout() {
                IndexError::Timeout {
                    operation: operation.to_string(),
                    after: self.config.timeout,
                }
                .into()
            } else {
                VitrineError::from(IndexError::Unavailable {
                    reason: format!("{}: {}", operation, e),
                })
            }
        })
    }

    /// Turn a non-success response into the matching error.
    async fn rejection(&self, operation: &str, response: Response) -> VitrineError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND
            && error_type(&body).as_deref() == Some("index_not_found_exception")
        {
            return IndexError::IndexMissing {
                index: self.config.index.clone(),
            }
            .into();
        }
        IndexError::Rejected {
            operation: operation.to_string(),
            status: status.as_u16(),
            reason: body,
        }
        .into()
    }
}

#[async_trait]
impl IndexClient for ElasticsearchClient {
    fn index_name(&self) -> &str {
        &self.config.index
    }

    async fn exists(&self) -> VitrineResult<bool> {
        let response = self
            .send("exists", self.request(Method::HEAD, &self.config.index))
            .await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(self.rejection("exists", response).await),
        }
    }

    async fn create_index(&self, mapping: &IndexMapping) -> VitrineResult<CreateOutcome> {
        let response = self
            .send(
                "create_index",
                self.request(Method::PUT, &self.config.index)
                    .json(&mapping.to_body()),
            )
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(CreateOutcome::Created);
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST
            && error_type(&body).as_deref() == Some("resource_already_exists_exception")
        {
            return Ok(CreateOutcome::AlreadyExists);
        }
        Err(IndexError::Rejected {
            operation: "create_index".to_string(),
            status: status.as_u16(),
            reason: body,
        }
        .into())
    }

    async fn delete_index(&self) -> VitrineResult<bool> {
        let response = self
            .send("delete_index", self.request(Method::DELETE, &self.config.index))
            .await?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(self.rejection("delete_index", response).await),
        }
    }

    async fn upsert(&self, document: &IndexDocument) -> VitrineResult<()> {
        let path = format!("{}/_doc/{}", self.config.index, document.id);
        let response = self
            .send("upsert", self.request(Method::PUT, &path).json(document))
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.rejection("upsert", response).await)
        }
    }

    async fn delete(&self, id: RecordId) -> VitrineResult<DeleteOutcome> {
        let path = format!("{}/_doc/{}", self.config.index, id);
        let response = self
            .send("delete", self.request(Method::DELETE, &path))
            .await?;
        match response.status() {
            s if s.is_success() => Ok(DeleteOutcome::Deleted),
            // Missing document and missing index are both converged states.
            StatusCode::NOT_FOUND => Ok(DeleteOutcome::NotFound),
            _ => Err(self.rejection("delete", response).await),
        }
    }

    async fn query(&self, query: &NativeQuery) -> VitrineResult<SearchPage> {
        let path = format!("{}/_search", self.config.index);
        let response = self
            .send("search", self.request(Method::POST, &path).json(&query.to_body()))
            .await?;
        if !response.status().is_success() {
            return Err(self.rejection("search", response).await);
        }
        let parsed: SearchResponse =
            response
                .json()
                .await
                .map_err(|e| IndexError::MalformedResponse {
                    reason: e.to_string(),
                })?;

        let hits = parsed
            .hits
            .hits
            .into_iter()
            .map(|hit| SearchHit {
                id: hit.source.id,
                score: hit.score,
                document: hit.source,
            })
            .collect();
        Ok(SearchPage {
            total: parsed.hits.total.value,
            hits,
        })
    }

    async fn ping(&self) -> VitrineResult<()> {
        let response = self.send("ping", self.request(Method::GET, "")).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.rejection("ping", response).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let config = ElasticsearchConfig::new("http://localhost:9200")
            .with_credentials("elastic", "hunter2");
        let rendered = format!("{:?}", config);
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_urls_join_cleanly() -> VitrineResult<()> {
        let client = ElasticsearchClient::new(
            ElasticsearchConfig::new("http://localhost:9200/").with_index("catalog"),
        )?;
        assert_eq!(client.url("catalog/_search"), "http://localhost:9200/catalog/_search");
        assert_eq!(client.index_name(), "catalog");
        Ok(())
    }

    #[test]
    fn test_error_type_extraction() {
        let body = r#"{"error":{"type":"index_not_found_exception","reason":"no such index"},"status":404}"#;
        assert_eq!(error_type(body).as_deref(), Some("index_not_found_exception"));
        assert_eq!(error_type("not json"), None);
        assert_eq!(error_type(r#"{"error":"plain"}"#), None);
    }

    #[test]
    fn test_search_response_parsing() -> Result<(), serde_json::Error> {
        let body = r#"{
            "took": 3,
            "hits": {
                "total": { "value": 1, "relation": "eq" },
                "hits": [{
                    "_index": "products",
                    "_id": "7",
                    "_score": 2.5,
                    "_source": {
                        "id": 7, "sku": "SKU1", "name": "Widget", "description": null,
                        "price": 10.0, "category": "tools", "status": "active",
                        "created_at": "2024-01-01T00:00:00Z",
                        "updated_at": "2024-01-01T00:00:00Z",
                        "deleted_at": null
                    }
                }]
            }
        }"#;
        let parsed: SearchResponse = serde_json::from_str(body)?;
        assert_eq!(parsed.hits.total.value, 1);
        assert_eq!(parsed.hits.hits[0].source.id, RecordId::new(7));
        assert_eq!(parsed.hits.hits[0].score, Some(2.5));
        Ok(())
    }
}
