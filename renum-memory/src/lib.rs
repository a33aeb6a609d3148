//! Renum Memory - The SICC Subsystem
//!
//! Per-agent long-term memory, interaction learning, and the knowledge (RAG)
//! index. Three stores with deliberately separate vocabularies:
//!
//! - `store` - conversational memory chunks (append-only, versioned, scored)
//! - `knowledge` - tenant-ingested documents and their chunks
//! - `learning` - interaction logs and mined behavior patterns
//!
//! Each store is a trait with an RwLock-backed in-memory implementation used
//! by tests and single-process deployments; the Postgres implementations
//! live behind the API crate's persistence gateway.

pub mod knowledge;
pub mod learning;
pub mod store;

pub use knowledge::{
    chunk_text, InMemoryKnowledgeIndex, KnowledgeIndex, ScoredKnowledgeChunk, MAX_CHUNK_CHARS,
};
pub use learning::{extract_signal, InMemoryLearningStore, LearningStore, PatternMiner};
pub use store::{
    rank_hits, render_snapshot_summary, validate_scores, InMemoryMemoryStore, MemoryStore,
    NewMemoryChunk, ScoredChunk,
};
