//! Renum API - REST/WebSocket Layer and Turn Orchestrator
//!
//! The hosted surface of the Renum backend: axum routes over the Postgres
//! persistence gateway, bearer-token auth against the managed provider,
//! the per-turn orchestrator, and the realtime fan-out.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod jobs;
pub mod macros;
pub mod middleware;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod orchestrator;
pub mod routes;
pub mod state;
pub mod vault;
pub mod ws;

// Re-export commonly used types
pub use auth::{generate_token, validate_token, AuthConfig, Claims, JwtSecret, Principal};
pub use config::ApiConfig;
pub use db::{DbConfig, Gateway};
pub use error::{ApiError, ApiResult, ErrorKind};
pub use events::{Broadcast, WsEvent, WsFrame};
pub use middleware::{auth_middleware, AuthMiddlewareState};
pub use orchestrator::{
    ConversationStore, InboundTurn, MemoryHit, Orchestrator, PersistedTurn, ToolCallRecord,
    TurnReceipt, TurnWrite,
};
pub use routes::create_api_router;
pub use state::AppState;
pub use vault::{Sealed, Vault};
pub use ws::WsState;
