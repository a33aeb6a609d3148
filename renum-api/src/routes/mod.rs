//! REST API Routes Module
//!
//! Route handlers organized by surface, each exposing `create_router()`.
//! Public routes (health, login, OpenAPI document) sit outside the auth
//! middleware; everything else requires a bearer token.

pub mod agent;
pub mod auth;
pub mod conversation;
pub mod dispatch;
pub mod health;
pub mod integration;
pub mod knowledge;
pub mod monitoring;

use axum::{middleware::from_fn_with_state, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::ApiResult;
use crate::middleware::{auth_middleware, AuthMiddlewareState};
use crate::state::AppState;
use crate::ws::ws_handler;

/// Assemble the full application router.
pub fn create_api_router(state: AppState) -> ApiResult<Router> {
    let auth_state = AuthMiddlewareState::new(
        state.auth.clone(),
        state.db.clone(),
        state.api_config.as_ref(),
    );

    let mut protected = Router::new()
        .merge(agent::create_router())
        .merge(conversation::create_router())
        .merge(dispatch::create_router())
        .merge(knowledge::create_router())
        .merge(monitoring::create_router())
        .route("/ws", get(ws_handler));

    // Integration routes only exist when the vault does; the startup path
    // guarantees a malformed key never gets this far.
    if state.vault.is_some() {
        protected = protected.merge(integration::create_router());
    }

    let protected = protected.layer(from_fn_with_state(auth_state, auth_middleware));

    let public = Router::new()
        .merge(health::create_router())
        .merge(auth::create_router());

    #[cfg(feature = "openapi")]
    let public = public.route(
        "/openapi.json",
        get(|| async { axum::Json(<crate::openapi::ApiDoc as utoipa::OpenApi>::openapi()) }),
    );

    let cors = if state.api_config.is_production() {
        let origins: Vec<axum::http::HeaderValue> = state
            .api_config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
            .max_age(std::time::Duration::from_secs(
                state.api_config.cors_max_age_secs,
            ))
    } else {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Ok(Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
