//! Shared application state for Axum routers.

use std::sync::Arc;

use renum_agents::ToolRegistry;
use renum_llm::EmbeddingProvider;
use renum_memory::{KnowledgeIndex, MemoryStore, PatternMiner};

use crate::auth::AuthConfig;
use crate::config::ApiConfig;
use crate::db::Gateway;
use crate::orchestrator::{ConversationStore, Orchestrator};
use crate::vault::Vault;
use crate::ws::WsState;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Persistence gateway (concrete, for route-level queries).
    pub db: Gateway,
    /// Conversation persistence behind the orchestrator seam.
    pub conversations: Arc<dyn ConversationStore>,
    /// Memory store (Postgres-backed in production).
    pub memory: Arc<dyn MemoryStore>,
    /// Knowledge index (Postgres-backed in production).
    pub knowledge: Arc<dyn KnowledgeIndex>,
    pub orchestrator: Arc<Orchestrator>,
    pub ws: Arc<WsState>,
    pub auth: Arc<AuthConfig>,
    pub api_config: Arc<ApiConfig>,
    /// Credential vault; `None` only when no integration routes are
    /// registered.
    pub vault: Option<Arc<Vault>>,
    pub tools: Arc<ToolRegistry>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub miner: Arc<PatternMiner>,
    pub start_time: std::time::Instant,
}

// FromRef implementations so extractors can pull individual fields.
crate::impl_from_ref!(Gateway, db);
crate::impl_from_ref!(Arc<dyn ConversationStore>, conversations);
crate::impl_from_ref!(Arc<dyn MemoryStore>, memory);
crate::impl_from_ref!(Arc<dyn KnowledgeIndex>, knowledge);
crate::impl_from_ref!(Arc<Orchestrator>, orchestrator);
crate::impl_from_ref!(Arc<WsState>, ws);
crate::impl_from_ref!(Arc<AuthConfig>, auth);
crate::impl_from_ref!(Arc<ApiConfig>, api_config);
crate::impl_from_ref!(Arc<ToolRegistry>, tools);
crate::impl_from_ref!(Arc<dyn EmbeddingProvider>, embedder);
crate::impl_from_ref!(std::time::Instant, start_time);
