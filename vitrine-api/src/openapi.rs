//! OpenAPI Specification for the Vitrine API
//!
//! Generated by utoipa from the route annotations and the schema derives
//! of the request, response and domain types.

use utoipa::OpenApi;

use crate::error::{ApiError, ErrorCode};
use crate::routes::health::{ComponentHealth, HealthDetails, HealthResponse, HealthStatus};
use crate::routes::{health, products, search, sync};
use crate::types::*;

use vitrine_core::{
    CatalogRecord, IndexDocument, PropagationTask, RecordStatus, SearchHit, SearchPage,
    TaskHandle,
};
use vitrine_storage::RecordPage;
use vitrine_sync::{ParkedTask, QueueDepth, SyncMetricsSnapshot};

/// OpenAPI document for the Vitrine API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Vitrine API",
        version = "0.1.0",
        description = "Product catalog with search index synchronization and cache coherence",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Products", description = "Catalog record management"),
        (name = "Search", description = "Product search and index administration"),
        (name = "Sync", description = "Index propagation status"),
        (name = "Health", description = "Liveness and readiness"),
        (name = "Observability", description = "Prometheus metrics")
    ),
    paths(
        products::list_products,
        products::create_product,
        products::get_product,
        products::update_product,
        products::delete_product,
        products::restore_product,
        products::force_delete_product,
        search::search_products,
        search::create_index,
        search::delete_index,
        sync::sync_status,
        sync::requeue_parked,
        health::ping,
        health::liveness,
        health::readiness,
        crate::telemetry::metrics::metrics_handler,
    ),
    components(
        schemas(
            ApiError, ErrorCode,
            ProductPayload, IndexActionResponse, SyncStatusResponse, RequeueResponse,
            CatalogRecord, RecordStatus, RecordPage, IndexDocument, SearchHit, SearchPage,
            PropagationTask, TaskHandle, ParkedTask, QueueDepth, SyncMetricsSnapshot,
            HealthResponse, HealthStatus, HealthDetails, ComponentHealth
        )
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate the OpenAPI document as a JSON string.
    pub fn to_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}
