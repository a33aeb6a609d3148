//! Monitoring Routes
//!
//! Plain process counters; no external observability stack.

use axum::{extract::State, routing::get, Json, Router};
use serde_json::json;

use crate::error::ApiResult;
use crate::state::AppState;

/// GET /api/monitoring/stats - process counters.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/monitoring/stats",
    tag = "Monitoring",
    responses((status = 200, description = "Process counters")),
    security(("bearer_auth" = []))
))]
pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    Ok(Json(json!({
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "turns": state.orchestrator.stats.snapshot(),
        "websocket_clients": state.ws.connected_count(),
        "db_pool_size": state.db.pool_size(),
    })))
}

/// Router for monitoring endpoints.
pub fn create_router() -> Router<AppState> {
    Router::new().route("/api/monitoring/stats", get(stats))
}
