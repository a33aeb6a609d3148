//! Conversation REST Routes
//!
//! Thin read surface over tenant conversations and their messages. The
//! mutating path for messages is the orchestrator dispatch, never these
//! routes.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Extension, Json, Router,
};
use renum_core::{Conversation, ConversationId, Message};
use serde::Deserialize;

use crate::auth::Principal;
use crate::error::{ApiError, ApiResult};
use crate::orchestrator::ConversationStore;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// GET /api/conversations - conversations for the caller's tenant.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/conversations",
    tag = "Conversations",
    responses((status = 200, description = "Conversation list", body = [Conversation])),
    security(("bearer_auth" = []))
))]
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<Conversation>>> {
    let tenant_id = principal.require_tenant()?;
    let conversations = state.db.conversations_list(tenant_id).await?;
    Ok(Json(conversations))
}

/// GET /api/conversations/{id} - one conversation.
///
/// Cross-tenant ids return the same 404 as missing ids; the attempt is
/// audit-logged.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/conversations/{id}",
    tag = "Conversations",
    params(("id" = String, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Conversation", body = Conversation),
        (status = 404, description = "Not found", body = ApiError),
    ),
    security(("bearer_auth" = []))
))]
pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ConversationId>,
) -> ApiResult<Json<Conversation>> {
    let tenant_id = principal.require_tenant()?;
    let conversation = state
        .conversations
        .conversation_get(tenant_id, id)
        .await?
        .ok_or_else(|| {
            tracing::warn!(
                audit = "tenant_scope",
                tenant_id = %tenant_id,
                conversation_id = %id,
                "Conversation lookup outside tenant scope"
            );
            ApiError::not_found("Conversation not found")
        })?;
    Ok(Json(conversation))
}

/// GET /api/conversations/{id}/messages - recent messages, oldest first.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/conversations/{id}/messages",
    tag = "Conversations",
    params(("id" = String, Path, description = "Conversation id")),
    responses((status = 200, description = "Messages", body = [Message])),
    security(("bearer_auth" = []))
))]
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ConversationId>,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    let tenant_id = principal.require_tenant()?;
    // Resolve the conversation first so missing and cross-tenant look alike.
    state
        .conversations
        .conversation_get(tenant_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Conversation not found"))?;
    let messages = state
        .conversations
        .recent_messages(tenant_id, id, query.limit.min(200))
        .await?;
    Ok(Json(messages))
}

/// Router for conversation endpoints.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/api/conversations", get(list_conversations))
        .route("/api/conversations/:id", get(get_conversation))
        .route("/api/conversations/:id/messages", get(list_messages))
}
