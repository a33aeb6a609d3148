//! Agent REST Routes
//!
//! Agent listing and creation, the n8n import wizard, and sub-agent
//! management. Creation goes through `AgentDraft::validate`, so every
//! stored agent satisfies the registry and document invariants.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use renum_agents::{import_n8n_workflow, AgentDraft, WorkflowImport};
use renum_core::{new_entity_id, Agent, AgentId, DocumentId, SubAgent};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::auth::Principal;
use crate::error::{ApiError, ApiResult};
use crate::orchestrator::ConversationStore;
use crate::state::AppState;
use renum_memory::KnowledgeIndex;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateSubAgentRequest {
    pub name: String,
    pub system_prompt: String,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<String>))]
    pub rag_document_ids: Vec<DocumentId>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct WizardResponse {
    pub agent: Agent,
    pub import: WorkflowImport,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/agents - agents visible to the caller's tenant.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/agents",
    tag = "Agents",
    responses((status = 200, description = "Agent list", body = [Agent])),
    security(("bearer_auth" = []))
))]
pub async fn list_agents(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<Agent>>> {
    let tenant_id = principal.require_tenant()?;
    let agents = state.db.agents_list(tenant_id).await?;
    Ok(Json(agents))
}

/// POST /api/agents - create an agent from a validated draft.
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/agents",
    tag = "Agents",
    request_body = AgentDraft,
    responses(
        (status = 201, description = "Agent created", body = Agent),
        (status = 400, description = "Draft failed validation", body = ApiError),
    ),
    security(("bearer_auth" = []))
))]
pub async fn create_agent(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(draft): Json<AgentDraft>,
) -> ApiResult<impl IntoResponse> {
    let tenant_id = principal.require_tenant()?;

    let documents = state.knowledge_documents_for_tenant(tenant_id).await?;
    draft.validate(&state.tools, tenant_id, &documents)?;

    let agent = agent_from_draft(&draft, Some(tenant_id));
    state.db.agent_insert(&agent).await?;
    Ok((StatusCode::CREATED, Json(agent)))
}

/// POST /api/agents/wizard/start - import an n8n workflow as an agent.
///
/// The converter is pure: submitting the same workflow twice creates two
/// agents with identical description and prompt hint.
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/agents/wizard/start",
    tag = "Agents",
    responses(
        (status = 201, description = "Agent imported", body = WizardResponse),
        (status = 400, description = "Workflow JSON invalid", body = ApiError),
    ),
    security(("bearer_auth" = []))
))]
pub async fn wizard_start(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(workflow): Json<serde_json::Value>,
) -> ApiResult<impl IntoResponse> {
    let tenant_id = principal.require_tenant()?;

    let import = import_n8n_workflow(&workflow)
        .map_err(|e| ApiError::validation(format!("{}", e)))?;

    let system_prompt = if import.system_prompt_hint.trim().is_empty() {
        format!("Você é o agente \"{}\".", import.name)
    } else {
        import.system_prompt_hint.clone()
    };

    let draft = AgentDraft {
        name: import.name.clone(),
        description: Some(import.description.clone()),
        system_prompt,
        model: "gpt-4o-mini".to_string(),
        category: Some("imported".to_string()),
        tools: Vec::new(),
        document_ids: Vec::new(),
    };
    draft.validate(&state.tools, tenant_id, &HashSet::new())?;

    let agent = agent_from_draft(&draft, Some(tenant_id));
    state.db.agent_insert(&agent).await?;
    Ok((StatusCode::CREATED, Json(WizardResponse { agent, import })))
}

/// GET /api/agents/{id}/sub-agents - sub-agents in creation order.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/agents/{id}/sub-agents",
    tag = "Agents",
    params(("id" = String, Path, description = "Parent agent id")),
    responses((status = 200, description = "Sub-agent list", body = [SubAgent])),
    security(("bearer_auth" = []))
))]
pub async fn list_sub_agents(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(agent_id): Path<AgentId>,
) -> ApiResult<Json<Vec<SubAgent>>> {
    let tenant_id = principal.require_tenant()?;
    let agent = require_agent(&state, tenant_id, agent_id).await?;
    let sub_agents = state.conversations.sub_agents(agent.agent_id).await?;
    Ok(Json(sub_agents))
}

/// POST /api/agents/{id}/sub-agents - create a sub-agent.
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/agents/{id}/sub-agents",
    tag = "Agents",
    params(("id" = String, Path, description = "Parent agent id")),
    request_body = CreateSubAgentRequest,
    responses(
        (status = 201, description = "Sub-agent created", body = SubAgent),
        (status = 404, description = "Parent agent not found", body = ApiError),
    ),
    security(("bearer_auth" = []))
))]
pub async fn create_sub_agent(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(agent_id): Path<AgentId>,
    Json(req): Json<CreateSubAgentRequest>,
) -> ApiResult<impl IntoResponse> {
    let tenant_id = principal.require_tenant()?;
    let agent = require_agent(&state, tenant_id, agent_id).await?;

    if req.name.trim().is_empty() {
        return Err(ApiError::missing_field("name"));
    }
    if req.system_prompt.trim().is_empty() {
        return Err(ApiError::missing_field("system_prompt"));
    }
    // Sub-agent tools must resolve just like agent tools.
    state.tools.resolve(&req.allowed_tools, tenant_id)?;

    let sub_agent = SubAgent {
        sub_agent_id: new_entity_id(),
        parent_agent_id: agent.agent_id,
        name: req.name,
        system_prompt: req.system_prompt,
        allowed_tools: req.allowed_tools,
        rag_document_ids: req.rag_document_ids,
        keywords: req.keywords,
        created_at: Utc::now(),
    };
    state.db.sub_agent_insert(&sub_agent).await?;
    Ok((StatusCode::CREATED, Json(sub_agent)))
}

// ============================================================================
// HELPERS
// ============================================================================

fn agent_from_draft(draft: &AgentDraft, tenant_id: Option<renum_core::TenantId>) -> Agent {
    let now = Utc::now();
    Agent {
        agent_id: new_entity_id(),
        tenant_id,
        name: draft.name.clone(),
        description: draft.description.clone(),
        system_prompt: draft.system_prompt.clone(),
        model: draft.model.clone(),
        category: draft.category.clone(),
        visible: true,
        active: true,
        config: (!draft.tools.is_empty())
            .then(|| serde_json::json!({ "tools": draft.tools })),
        created_at: now,
        updated_at: now,
    }
}

async fn require_agent(
    state: &AppState,
    tenant_id: renum_core::TenantId,
    agent_id: AgentId,
) -> ApiResult<Agent> {
    state
        .conversations
        .agent_get(tenant_id, agent_id)
        .await?
        .ok_or_else(|| {
            tracing::warn!(
                audit = "tenant_scope",
                tenant_id = %tenant_id,
                agent_id = %agent_id,
                "Agent lookup outside tenant scope"
            );
            ApiError::not_found("Agent not found")
        })
}

impl AppState {
    /// Existing document ids for a tenant, for draft validation.
    pub(crate) async fn knowledge_documents_for_tenant(
        &self,
        tenant_id: renum_core::TenantId,
    ) -> ApiResult<HashSet<DocumentId>> {
        let mut documents = HashSet::new();
        for agent in self.db.agents_list(tenant_id).await? {
            for document in self.knowledge.documents_for_agent(agent.agent_id).await? {
                documents.insert(document.document_id);
            }
        }
        Ok(documents)
    }
}

/// Router for agent endpoints.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/api/agents", get(list_agents).post(create_agent))
        .route("/api/agents/wizard/start", post(wizard_start))
        .route(
            "/api/agents/:id/sub-agents",
            get(list_sub_agents).post(create_sub_agent),
        )
}
