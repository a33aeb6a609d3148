//! OpenAPI document for the Renum API.

#![cfg(feature = "openapi")]

use utoipa::OpenApi;

use crate::error::{ApiError, ErrorKind};
use crate::orchestrator::{MemoryHit, ToolCallRecord, TurnReceipt};
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Renum API",
        description = "Agent orchestration and memory backend for the Renum platform",
        version = "0.1.0"
    ),
    paths(
        routes::health::health,
        routes::health::health_db,
        routes::auth::login,
        routes::agent::list_agents,
        routes::agent::create_agent,
        routes::agent::wizard_start,
        routes::agent::list_sub_agents,
        routes::agent::create_sub_agent,
        routes::conversation::list_conversations,
        routes::conversation::get_conversation,
        routes::conversation::list_messages,
        routes::dispatch::dispatch,
        routes::knowledge::ingest_document,
        routes::knowledge::list_documents,
        routes::knowledge::search,
        routes::monitoring::stats,
        routes::integration::store_secret,
        routes::integration::list_integrations,
    ),
    components(schemas(
        ApiError,
        ErrorKind,
        TurnReceipt,
        ToolCallRecord,
        MemoryHit,
        renum_core::Agent,
        renum_core::SubAgent,
        renum_core::Conversation,
        renum_core::Message,
        renum_core::KnowledgeDocument,
        renum_agents::AgentDraft,
        renum_agents::WorkflowImport,
        routes::health::HealthResponse,
        routes::health::HealthStatus,
        routes::auth::LoginRequest,
        routes::auth::LoginResponse,
        routes::agent::CreateSubAgentRequest,
        routes::agent::WizardResponse,
        routes::dispatch::DispatchRequest,
        routes::knowledge::IngestRequest,
        routes::knowledge::SearchHit,
        routes::integration::StoreSecretRequest,
        routes::integration::StoredSecretResponse,
    )),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Auth", description = "Managed-provider auth bridge"),
        (name = "Agents", description = "Agent and sub-agent management"),
        (name = "Conversations", description = "Conversation read surface"),
        (name = "Orchestrator", description = "Turn dispatch"),
        (name = "Knowledge", description = "Per-agent RAG index"),
        (name = "Monitoring", description = "Process counters"),
        (name = "Integrations", description = "Encrypted integration secrets"),
    )
)]
pub struct ApiDoc;
