//! Retrieval and orchestration constants
//!
//! Tuning knobs for the turn pipeline. Values here are process-wide and
//! immutable after start; anything tenant-specific lives in the database.

use std::time::Duration;

/// Embedding dimension fixed at process start.
/// text-embedding-3-small with a `dimensions: 384` request.
pub const EMBEDDING_DIMENSIONS: i32 = 384;

/// Default embedding model identifier.
pub const EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Memory search: top-K neighbors per turn.
pub const MEMORY_SEARCH_K: usize = 8;

/// Memory search: minimum cosine similarity.
pub const MEMORY_MIN_SIMILARITY: f32 = 0.7;

/// Knowledge (RAG) search: top-K chunks per turn.
pub const KNOWLEDGE_SEARCH_K: usize = 4;

/// Knowledge (RAG) search: minimum cosine similarity.
pub const KNOWLEDGE_MIN_SIMILARITY: f32 = 0.75;

/// Conversation history window included in the prompt.
pub const HISTORY_WINDOW: usize = 20;

/// Retry backoff schedule for embedding and LLM transport failures.
/// At most two retries.
pub const RETRY_BACKOFF: [Duration; 2] = [Duration::from_millis(100), Duration::from_millis(400)];

/// Per-call timeout for embedding requests.
pub const EMBEDDING_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-call timeout for LLM completions.
pub const LLM_TIMEOUT: Duration = Duration::from_secs(60);

/// Overall budget for one orchestrated turn.
pub const TURN_TIMEOUT: Duration = Duration::from_secs(90);

/// Consolidation: chunks required in a window before a snapshot is taken.
pub const SNAPSHOT_MIN_CHUNKS: usize = 50;

/// Consolidation: window length.
pub const SNAPSHOT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Consolidation: how many top-ranked chunks feed one snapshot.
pub const SNAPSHOT_TOP_N: usize = 20;
