//! Health Check Endpoints
//!
//! - /health - process liveness
//! - /health/db - database connectivity
//!
//! No authentication required.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub uptime_seconds: u64,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health - liveness probe.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Process is alive", body = HealthResponse))
))]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        latency_ms: None,
        error: None,
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

/// GET /health/db - database connectivity probe.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/health/db",
    tag = "Health",
    responses(
        (status = 200, description = "Database reachable", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse),
    )
))]
pub async fn health_db(State(state): State<AppState>) -> impl IntoResponse {
    let started = std::time::Instant::now();
    match state.db.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: HealthStatus::Healthy,
                latency_ms: Some(started.elapsed().as_millis() as u64),
                error: None,
                uptime_seconds: state.start_time.elapsed().as_secs(),
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: HealthStatus::Unhealthy,
                latency_ms: None,
                error: Some(format!("{}", e)),
                uptime_seconds: state.start_time.elapsed().as_secs(),
            }),
        ),
    }
}

/// Router for health endpoints.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/db", get(health_db))
}
