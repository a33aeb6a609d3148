//! Orchestrator Dispatch Route
//!
//! `POST /api/orchestrator/dispatch` is the core entry point: one inbound
//! turn in, one reply out. An `Idempotency-Key` header makes the call
//! replay-safe: resubmitting the same key returns the first turn's
//! `message_id` with HTTP 200.

use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Extension, Json, Router,
};
use renum_core::{AgentId, Channel, ConversationId, SubAgentId};
use serde::Deserialize;

use crate::auth::Principal;
use crate::error::{ApiError, ApiResult};
use crate::orchestrator::{InboundTurn, Orchestrator, TurnReceipt};
use crate::state::AppState;

/// Header carrying the client-supplied idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DispatchRequest {
    /// Existing conversation, or absent to open a new one.
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>))]
    pub conversation_id: Option<ConversationId>,
    /// Target agent for new conversations.
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>))]
    pub agent_id: Option<AgentId>,
    pub content: String,
    pub channel: Channel,
    /// Explicit admin routing override.
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>))]
    pub sub_agent_override: Option<SubAgentId>,
}

/// POST /api/orchestrator/dispatch - run one conversational turn.
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/orchestrator/dispatch",
    tag = "Orchestrator",
    request_body = DispatchRequest,
    responses(
        (status = 200, description = "Turn completed", body = TurnReceipt),
        (status = 400, description = "Invalid turn", body = ApiError),
        (status = 404, description = "Conversation or agent not found", body = ApiError),
        (status = 504, description = "Turn exceeded its budget", body = ApiError),
    ),
    security(("bearer_auth" = []))
))]
pub async fn dispatch(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    Json(req): Json<DispatchRequest>,
) -> ApiResult<Json<TurnReceipt>> {
    let tenant_id = principal.require_tenant()?;

    let idempotency_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);
    if let Some(key) = &idempotency_key {
        if key.is_empty() || key.len() > 256 {
            return Err(ApiError::validation(
                "Idempotency-Key must be 1-256 characters",
            ));
        }
    }

    // Sub-agent overrides are an operator capability.
    let admin_override = match (req.sub_agent_override, principal.is_admin()) {
        (Some(_), false) => {
            return Err(ApiError::forbidden(
                "Only admins may override sub-agent routing",
            ))
        }
        (value, _) => value,
    };

    let turn = InboundTurn {
        tenant_id,
        user_id: principal.id,
        conversation_id: req.conversation_id,
        agent_id: req.agent_id,
        content: req.content,
        channel: req.channel,
        idempotency_key,
        admin_override,
    };

    let receipt = Orchestrator::dispatch(state.orchestrator.clone(), turn).await?;
    Ok(Json(receipt))
}

/// Router for the orchestrator endpoint.
pub fn create_router() -> Router<AppState> {
    Router::new().route("/api/orchestrator/dispatch", post(dispatch))
}
