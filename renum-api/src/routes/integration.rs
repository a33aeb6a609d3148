//! Integration Credential Routes
//!
//! Secrets are sealed by the Credential Vault before they touch the
//! database and never leave it decrypted. These routes are only registered
//! when the vault is configured; a present-but-malformed `ENCRYPTION_KEY`
//! aborts startup instead.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::auth::Principal;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct StoreSecretRequest {
    pub secret: String,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct StoredSecretResponse {
    pub integration: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub credential_id: renum_core::CredentialId,
}

/// PUT /api/integrations/{name} - seal and store one secret.
#[cfg_attr(feature = "openapi", utoipa::path(
    put,
    path = "/api/integrations/{name}",
    tag = "Integrations",
    params(("name" = String, Path, description = "Integration name")),
    request_body = StoreSecretRequest,
    responses((status = 201, description = "Secret stored", body = StoredSecretResponse)),
    security(("bearer_auth" = []))
))]
pub async fn store_secret(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(name): Path<String>,
    Json(req): Json<StoreSecretRequest>,
) -> ApiResult<impl IntoResponse> {
    let tenant_id = principal.require_tenant()?;
    let vault = state
        .vault
        .as_ref()
        .ok_or_else(|| ApiError::internal_error("Credential vault is not configured"))?;

    if req.secret.is_empty() {
        return Err(ApiError::missing_field("secret"));
    }

    let sealed = vault.seal(req.secret.as_bytes())?;
    let credential_id = state.db.credential_upsert(tenant_id, &name, &sealed).await?;
    Ok((
        StatusCode::CREATED,
        Json(StoredSecretResponse {
            integration: name,
            credential_id,
        }),
    ))
}

/// GET /api/integrations - configured integration names (never secrets).
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/integrations",
    tag = "Integrations",
    responses((status = 200, description = "Integration names", body = [String])),
    security(("bearer_auth" = []))
))]
pub async fn list_integrations(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<String>>> {
    let tenant_id = principal.require_tenant()?;
    let names = state.db.credential_names(tenant_id).await?;
    Ok(Json(names))
}

/// Router for integration endpoints.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/api/integrations", get(list_integrations))
        .route("/api/integrations/:name", put(store_secret))
}
