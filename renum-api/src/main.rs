//! Renum API Server Entry Point
//!
//! Bootstraps configuration, wires the persistence gateway, providers, and
//! orchestrator, and starts the Axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use renum_agents::ToolRegistry;
use renum_api::{
    create_api_router, ApiConfig, ApiError, ApiResult, AppState, AuthConfig, DbConfig, Gateway,
    Orchestrator, Vault, WsState,
};
use renum_llm::{OpenAiChatProvider, OpenAiEmbeddingProvider};
use renum_memory::PatternMiner;

#[tokio::main]
async fn main() -> ApiResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "renum_api=info,tower_http=info".into()),
        )
        .init();

    let db_config = DbConfig::from_env()?;
    let db = Gateway::from_config(&db_config)?;

    let auth_config = Arc::new(AuthConfig::from_env()?);
    let api_config = Arc::new(ApiConfig::from_env());

    // Vault: an absent key disables integration routes; a malformed key is
    // a startup failure.
    let vault = match std::env::var("ENCRYPTION_KEY") {
        Ok(encoded) => Some(Arc::new(
            Vault::from_base64(&encoded).map_err(ApiError::from)?,
        )),
        Err(_) => {
            tracing::warn!("ENCRYPTION_KEY not set; integration routes disabled");
            None
        }
    };

    let openai_key = std::env::var("OPENAI_API_KEY")
        .map_err(|_| ApiError::internal_error("OPENAI_API_KEY is not set"))?;
    let embedder = Arc::new(OpenAiEmbeddingProvider::with_default_model(
        openai_key.clone(),
    ));
    let chat = Arc::new(OpenAiChatProvider::new(openai_key, "gpt-4o-mini"));

    let tools = Arc::new(ToolRegistry::with_defaults());
    let ws_capacity = std::env::var("RENUM_WS_CAPACITY")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(1000);
    let ws = Arc::new(WsState::new(ws_capacity));

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(db.clone()),
        Arc::new(db.clone()),
        Arc::new(db.clone()),
        Arc::new(db.clone()),
        tools.clone(),
        embedder.clone(),
        chat,
        ws.clone(),
    ));

    let state = AppState {
        db: db.clone(),
        conversations: Arc::new(db.clone()),
        memory: Arc::new(db.clone()),
        knowledge: Arc::new(db.clone()),
        orchestrator,
        ws,
        auth: auth_config,
        api_config,
        vault,
        tools,
        embedder,
        miner: Arc::new(PatternMiner::new()),
        start_time: std::time::Instant::now(),
    };

    let _jobs = renum_api::jobs::spawn_background_jobs(state.clone());

    let app: Router = create_api_router(state)?;

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting Renum API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("RENUM_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("RENUM_PORT").ok())
        .unwrap_or_else(|| "8000".to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::validation(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::validation(format!("Invalid bind address {}: {}", addr, e)))
}
