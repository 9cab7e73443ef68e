//! Vitrine Search - Index Client and Query Layer
//!
//! Engine-agnostic index client trait, an Elasticsearch implementation, an
//! in-memory implementation, the catalog mapping, the query builder and the
//! search executor that the cache coordinator reads through.

pub mod client;
pub mod elasticsearch;
pub mod executor;
pub mod mapping;
pub mod memory;
pub mod query;

pub use client::{ensure_index, CreateOutcome, DeleteOutcome, IndexClient};
pub use elasticsearch::{ElasticsearchClient, ElasticsearchConfig, DEFAULT_INDEX};
pub use executor::{SearchExecutor, DEFAULT_SEARCH_TIMEOUT};
pub use mapping::{IndexMapping, PRODUCT_ANALYZER};
pub use memory::InMemoryIndex;
pub use query::{sort_target, Clause, NativeQuery, QueryBuilder, SortClause};
