//! Authentication Routes
//!
//! `POST /auth/login` bridges to the managed auth provider: credentials go
//! to Supabase's password grant, and the provider-issued token comes back
//! verbatim. The backend never sees or stores password hashes.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LoginResponse {
    pub access_token: String,
    /// Always "bearer".
    pub token_type: String,
    pub expires_in: i64,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub user: serde_json::Value,
}

/// Shape of the provider's password-grant response.
#[derive(Debug, Deserialize)]
struct ProviderGrant {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
    #[serde(default)]
    user: serde_json::Value,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// POST /auth/login - exchange credentials for a bearer token.
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ApiError),
    )
))]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("email and password are required"));
    }

    let (base_url, anon_key) = match (&state.auth.supabase_url, &state.auth.supabase_anon_key) {
        (Some(url), Some(key)) => (url.clone(), key.clone()),
        _ => {
            return Err(ApiError::internal_error(
                "Auth provider is not configured (SUPABASE_URL / SUPABASE_ANON_KEY)",
            ))
        }
    };

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/auth/v1/token?grant_type=password", base_url.trim_end_matches('/')))
        .header("apikey", anon_key)
        .json(&serde_json::json!({ "email": req.email, "password": req.password }))
        .send()
        .await
        .map_err(|e| ApiError::internal_error(format!("Auth provider unreachable: {}", e)))?;

    if response.status() == reqwest::StatusCode::BAD_REQUEST
        || response.status() == reqwest::StatusCode::UNAUTHORIZED
    {
        return Err(ApiError::unauthenticated("Invalid email or password"));
    }
    if !response.status().is_success() {
        return Err(ApiError::internal_error(format!(
            "Auth provider returned status {}",
            response.status()
        )));
    }

    let grant: ProviderGrant = response
        .json()
        .await
        .map_err(|e| ApiError::internal_error(format!("Malformed provider response: {}", e)))?;

    Ok(Json(LoginResponse {
        access_token: grant.access_token,
        token_type: "bearer".to_string(),
        expires_in: grant.expires_in,
        user: grant.user,
    }))
}

/// Router for auth endpoints (public).
pub fn create_router() -> Router<AppState> {
    Router::new().route("/auth/login", post(login))
}
