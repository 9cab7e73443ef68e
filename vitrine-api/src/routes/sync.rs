//! Sync REST API Routes
//!
//! Propagation queue status and the parked-task requeue action.

use axum::{extract::State, response::IntoResponse, routing::{get, post}, Json, Router};

use crate::error::ApiResult;
use crate::services::SyncService;
use crate::state::AppState;
use crate::types::RequeueResponse;

#[cfg(feature = "openapi")]
use crate::types::SyncStatusResponse;

/// GET /api/sync/status - Queue depth, parked tasks and worker counters
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/sync/status",
    tag = "Sync",
    responses(
        (status = 200, description = "Propagation status", body = SyncStatusResponse),
    ),
))]
pub async fn sync_status(State(sync): State<SyncService>) -> ApiResult<impl IntoResponse> {
    Ok(Json(sync.status().await?))
}

/// POST /api/sync/parked/requeue - Give parked tasks a fresh set of attempts
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/sync/parked/requeue",
    tag = "Sync",
    responses(
        (status = 200, description = "Parked tasks moved back to the queue", body = RequeueResponse),
    ),
))]
pub async fn requeue_parked(State(sync): State<SyncService>) -> ApiResult<impl IntoResponse> {
    let requeued = sync.requeue_parked().await?;
    Ok(Json(RequeueResponse { requeued }))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/status", get(sync_status))
        .route("/parked/requeue", post(requeue_parked))
}
