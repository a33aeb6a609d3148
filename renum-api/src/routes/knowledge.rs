//! Knowledge (RAG) Routes
//!
//! Per-agent document ingestion and retrieval. Ingestion runs the full
//! chunk -> embed -> store pipeline before responding; a failed document
//! comes back as `error` with no partial chunks behind it.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use renum_core::{
    AgentId, DocumentId, KnowledgeDocument, KNOWLEDGE_MIN_SIMILARITY, KNOWLEDGE_SEARCH_K,
};
use serde::{Deserialize, Serialize};

use crate::auth::Principal;
use crate::error::{ApiError, ApiResult};
use crate::orchestrator::ConversationStore;
use crate::state::AppState;
use renum_llm::EmbeddingProvider;
use renum_memory::KnowledgeIndex;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct IngestRequest {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub k: Option<usize>,
    pub threshold: Option<f32>,
    pub document_id: Option<DocumentId>,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SearchHit {
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub chunk_id: renum_core::KnowledgeChunkId,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub document_id: DocumentId,
    pub content: String,
    pub similarity: f32,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// POST /api/knowledge/{agent_id}/documents - ingest one document.
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/knowledge/{agent_id}/documents",
    tag = "Knowledge",
    params(("agent_id" = String, Path, description = "Owning agent id")),
    request_body = IngestRequest,
    responses(
        (status = 201, description = "Document ingested", body = KnowledgeDocument),
        (status = 503, description = "Embedding provider unavailable", body = ApiError),
    ),
    security(("bearer_auth" = []))
))]
pub async fn ingest_document(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(agent_id): Path<AgentId>,
    Json(req): Json<IngestRequest>,
) -> ApiResult<impl IntoResponse> {
    let tenant_id = principal.require_tenant()?;
    require_agent(&state, tenant_id, agent_id).await?;

    if req.title.trim().is_empty() {
        return Err(ApiError::missing_field("title"));
    }
    if req.content.trim().is_empty() {
        return Err(ApiError::missing_field("content"));
    }

    let document = state
        .knowledge
        .create_document(tenant_id, agent_id, &req.title)
        .await?;
    let ready = state
        .knowledge
        .ingest(document.document_id, &req.content, state.embedder.as_ref())
        .await?;
    Ok((StatusCode::CREATED, Json(ready)))
}

/// GET /api/knowledge/{agent_id}/documents - document list.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/knowledge/{agent_id}/documents",
    tag = "Knowledge",
    params(("agent_id" = String, Path, description = "Owning agent id")),
    responses((status = 200, description = "Documents", body = [KnowledgeDocument])),
    security(("bearer_auth" = []))
))]
pub async fn list_documents(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(agent_id): Path<AgentId>,
) -> ApiResult<Json<Vec<KnowledgeDocument>>> {
    let tenant_id = principal.require_tenant()?;
    require_agent(&state, tenant_id, agent_id).await?;
    let documents = state.knowledge.documents_for_agent(agent_id).await?;
    Ok(Json(documents))
}

/// GET /api/knowledge/{agent_id}/search?q=...&k=...&threshold=...
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/knowledge/{agent_id}/search",
    tag = "Knowledge",
    params(
        ("agent_id" = String, Path, description = "Owning agent id"),
        ("q" = String, Query, description = "Query text"),
        ("k" = Option<usize>, Query, description = "Max results"),
        ("threshold" = Option<f32>, Query, description = "Minimum similarity"),
    ),
    responses((status = 200, description = "Search hits", body = [SearchHit])),
    security(("bearer_auth" = []))
))]
pub async fn search(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(agent_id): Path<AgentId>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<SearchHit>>> {
    let tenant_id = principal.require_tenant()?;
    require_agent(&state, tenant_id, agent_id).await?;

    if query.q.trim().is_empty() {
        return Err(ApiError::missing_field("q"));
    }

    let vector = state.embedder.embed(&query.q).await?;
    let hits = state
        .knowledge
        .search(
            agent_id,
            &vector,
            query.k.unwrap_or(KNOWLEDGE_SEARCH_K),
            query.threshold.unwrap_or(KNOWLEDGE_MIN_SIMILARITY),
            query.document_id,
        )
        .await?;

    Ok(Json(
        hits.into_iter()
            .map(|hit| SearchHit {
                chunk_id: hit.chunk.chunk_id,
                document_id: hit.chunk.document_id,
                content: hit.chunk.content,
                similarity: hit.similarity,
            })
            .collect(),
    ))
}

// ============================================================================
// HELPERS
// ============================================================================

async fn require_agent(
    state: &AppState,
    tenant_id: renum_core::TenantId,
    agent_id: AgentId,
) -> ApiResult<()> {
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
        })?;
    Ok(())
}

/// Router for knowledge endpoints.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/knowledge/:agent_id/documents",
            post(ingest_document).get(list_documents),
        )
        .route("/api/knowledge/:agent_id/search", get(search))
}
