//! Per-agent memory store
//!
//! Append-only store of embedded memory chunks with semantic search,
//! supersession, and periodic consolidation into knowledge snapshots.
//! The trait is implemented twice: the in-memory store below (reference
//! semantics, used by the orchestrator tests) and the Postgres gateway in
//! the API crate. Both share the ranking helpers here so ordering rules
//! cannot drift.

use async_trait::async_trait;
use chrono::Utc;
use renum_core::{
    new_entity_id, AgentId, EmbeddingVector, EntityType, KnowledgeSnapshot, MemoryChunk,
    MemoryChunkId, MemoryType, RenumError, RenumResult, SnapshotId, StorageError, Timestamp,
    ValidationError, SNAPSHOT_TOP_N,
};
use std::collections::HashMap;
use std::sync::RwLock;

// ============================================================================
// REQUEST / RESULT TYPES
// ============================================================================

/// Payload for appending one memory chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMemoryChunk {
    pub content: String,
    pub memory_type: MemoryType,
    pub embedding: EmbeddingVector,
    pub metadata: Option<serde_json::Value>,
    pub source: Option<String>,
    pub confidence: f32,
    pub importance: f32,
    /// Version defaults to 1 when not supplied; supersession overrides it.
    pub version: Option<i32>,
}

impl NewMemoryChunk {
    /// Minimal chunk with default scores.
    pub fn text(content: impl Into<String>, embedding: EmbeddingVector) -> Self {
        Self {
            content: content.into(),
            memory_type: MemoryType::Fact,
            embedding,
            metadata: None,
            source: None,
            confidence: 0.5,
            importance: 0.5,
            version: None,
        }
    }
}

/// One semantic search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: MemoryChunk,
    pub similarity: f32,
}

// ============================================================================
// MEMORY STORE TRAIT
// ============================================================================

/// Storage abstraction for per-agent conversational memory.
///
/// Invariants:
/// - append-only for content; `(agent_id, version, chunk_id)` is unique
/// - embeddings carry exactly the configured dimension
/// - retrieval is read-your-writes within one orchestrator turn
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Persist one chunk. Sets `version = 1` when not supplied.
    /// Rejects wrong-dimension embeddings with `DimensionMismatch`.
    async fn append(&self, agent_id: AgentId, chunk: NewMemoryChunk)
        -> RenumResult<MemoryChunkId>;

    /// Fetch one chunk by id, scoped to the agent.
    async fn get(
        &self,
        agent_id: AgentId,
        chunk_id: MemoryChunkId,
    ) -> RenumResult<Option<MemoryChunk>>;

    /// Nearest-neighbor search in cosine space, filtered by agent, returning
    /// at most `k` results with `similarity >= min_similarity`. Superseded
    /// chunks never surface. Tie-break is stable within a query.
    async fn search(
        &self,
        agent_id: AgentId,
        query: &EmbeddingVector,
        k: usize,
        min_similarity: f32,
    ) -> RenumResult<Vec<ScoredChunk>>;

    /// Write a new chunk with `version = old.version + 1` and metadata
    /// pointing back to `old_id`; the old chunk is retained for audit.
    async fn supersede(
        &self,
        agent_id: AgentId,
        old_id: MemoryChunkId,
        chunk: NewMemoryChunk,
    ) -> RenumResult<MemoryChunkId>;

    /// Consolidate the window's best-rated chunks into one snapshot.
    /// Idempotent within a window: re-running returns the existing snapshot.
    /// Returns `None` when the window holds no live chunks.
    async fn consolidate(
        &self,
        agent_id: AgentId,
        window_start: Timestamp,
        window_end: Timestamp,
    ) -> RenumResult<Option<SnapshotId>>;

    /// Count of live (non-superseded) chunks created in the window.
    /// Drives the consolidation cadence gate.
    async fn chunks_in_window(
        &self,
        agent_id: AgentId,
        window_start: Timestamp,
        window_end: Timestamp,
    ) -> RenumResult<usize>;
}

// ============================================================================
// RANKING HELPERS (shared by both implementations)
// ============================================================================

/// Validate score bounds on an incoming chunk.
pub fn validate_scores(chunk: &NewMemoryChunk) -> RenumResult<()> {
    for (field, value) in [("confidence", chunk.confidence), ("importance", chunk.importance)] {
        if !(0.0..=1.0).contains(&value) || !value.is_finite() {
            return Err(RenumError::Validation(ValidationError::InvalidValue {
                field: field.to_string(),
                reason: format!("{} outside [0, 1]", value),
            }));
        }
    }
    Ok(())
}

/// Rank hits by similarity descending; ties break on chunk id so the order
/// is stable within a query.
pub fn rank_hits(mut hits: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
    });
    hits.truncate(k);
    hits
}

/// Render a snapshot summary out of the top-ranked chunks.
pub fn render_snapshot_summary(chunks: &[&MemoryChunk]) -> String {
    let mut summary = String::from("Consolidated agent memory:\n");
    for chunk in chunks {
        summary.push_str("- ");
        summary.push_str(chunk.content.trim());
        summary.push('\n');
    }
    summary
}

// ============================================================================
// IN-MEMORY IMPLEMENTATION
// ============================================================================

#[derive(Default)]
struct MemoryState {
    chunks: HashMap<MemoryChunkId, MemoryChunk>,
    /// (agent_id, window_start) -> snapshot, for idempotent consolidation.
    snapshots: HashMap<(AgentId, Timestamp), KnowledgeSnapshot>,
}

/// RwLock-backed memory store for tests and single-process deployments.
pub struct InMemoryMemoryStore {
    dimensions: i32,
    state: RwLock<MemoryState>,
}

impl InMemoryMemoryStore {
    /// Create a store that accepts embeddings of the given dimension.
    pub fn new(dimensions: i32) -> Self {
        Self {
            dimensions,
            state: RwLock::new(MemoryState::default()),
        }
    }

    /// All snapshots taken for an agent, oldest first.
    pub fn snapshots(&self, agent_id: AgentId) -> Vec<KnowledgeSnapshot> {
        let state = self.state.read().expect("memory store lock");
        let mut out: Vec<_> = state
            .snapshots
            .values()
            .filter(|s| s.agent_id == agent_id)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.window_start);
        out
    }

    fn build_chunk(
        &self,
        agent_id: AgentId,
        chunk: NewMemoryChunk,
        version: i32,
    ) -> RenumResult<MemoryChunk> {
        chunk.embedding.check_dimensions(self.dimensions)?;
        validate_scores(&chunk)?;
        Ok(MemoryChunk {
            chunk_id: new_entity_id(),
            agent_id,
            content: chunk.content,
            memory_type: chunk.memory_type,
            embedding: chunk.embedding,
            metadata: chunk.metadata,
            source: chunk.source,
            confidence: chunk.confidence,
            importance: chunk.importance,
            version,
            superseded_by: None,
            created_at: Utc::now(),
        })
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn append(
        &self,
        agent_id: AgentId,
        chunk: NewMemoryChunk,
    ) -> RenumResult<MemoryChunkId> {
        let version = chunk.version.unwrap_or(1);
        let row = self.build_chunk(agent_id, chunk, version)?;
        let id = row.chunk_id;
        let mut state = self.state.write().map_err(|_| StorageError::LockPoisoned)?;
        state.chunks.insert(id, row);
        Ok(id)
    }

    async fn get(
        &self,
        agent_id: AgentId,
        chunk_id: MemoryChunkId,
    ) -> RenumResult<Option<MemoryChunk>> {
        let state = self.state.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(state
            .chunks
            .get(&chunk_id)
            .filter(|c| c.agent_id == agent_id)
            .cloned())
    }

    async fn search(
        &self,
        agent_id: AgentId,
        query: &EmbeddingVector,
        k: usize,
        min_similarity: f32,
    ) -> RenumResult<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let state = self.state.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut hits = Vec::new();
        for chunk in state.chunks.values() {
            if chunk.agent_id != agent_id || chunk.superseded_by.is_some() {
                continue;
            }
            let similarity = query.cosine_similarity(&chunk.embedding)?;
            if similarity >= min_similarity {
                hits.push(ScoredChunk {
                    chunk: chunk.clone(),
                    similarity,
                });
            }
        }
        Ok(rank_hits(hits, k))
    }

    async fn supersede(
        &self,
        agent_id: AgentId,
        old_id: MemoryChunkId,
        chunk: NewMemoryChunk,
    ) -> RenumResult<MemoryChunkId> {
        let old_version = {
            let state = self.state.read().map_err(|_| StorageError::LockPoisoned)?;
            state
                .chunks
                .get(&old_id)
                .filter(|c| c.agent_id == agent_id)
                .map(|c| c.version)
                .ok_or(StorageError::NotFound {
                    entity_type: EntityType::MemoryChunk,
                    id: old_id,
                })?
        };

        let mut metadata = chunk.metadata.clone().unwrap_or_else(|| serde_json::json!({}));
        if let Some(map) = metadata.as_object_mut() {
            map.insert(
                "supersedes".to_string(),
                serde_json::Value::String(old_id.to_string()),
            );
        }

        let row = self.build_chunk(
            agent_id,
            NewMemoryChunk {
                metadata: Some(metadata),
                ..chunk
            },
            old_version + 1,
        )?;
        let new_id = row.chunk_id;

        let mut state = self.state.write().map_err(|_| StorageError::LockPoisoned)?;
        state.chunks.insert(new_id, row);
        if let Some(old) = state.chunks.get_mut(&old_id) {
            old.superseded_by = Some(new_id);
        }
        Ok(new_id)
    }

    async fn consolidate(
        &self,
        agent_id: AgentId,
        window_start: Timestamp,
        window_end: Timestamp,
    ) -> RenumResult<Option<SnapshotId>> {
        let mut state = self.state.write().map_err(|_| StorageError::LockPoisoned)?;

        if let Some(existing) = state.snapshots.get(&(agent_id, window_start)) {
            return Ok(Some(existing.snapshot_id));
        }

        let mut candidates: Vec<&MemoryChunk> = state
            .chunks
            .values()
            .filter(|c| {
                c.agent_id == agent_id
                    && c.superseded_by.is_none()
                    && c.created_at >= window_start
                    && c.created_at < window_end
            })
            .collect();

        if candidates.is_empty() {
            return Ok(None);
        }

        candidates.sort_by(|a, b| {
            b.consolidation_score()
                .partial_cmp(&a.consolidation_score())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        candidates.truncate(SNAPSHOT_TOP_N);

        let snapshot = KnowledgeSnapshot {
            snapshot_id: new_entity_id(),
            agent_id,
            window_start,
            window_end,
            summary: render_snapshot_summary(&candidates),
            chunk_ids: candidates.iter().map(|c| c.chunk_id).collect(),
            created_at: Utc::now(),
        };
        let snapshot_id = snapshot.snapshot_id;
        state.snapshots.insert((agent_id, window_start), snapshot);
        Ok(Some(snapshot_id))
    }

    async fn chunks_in_window(
        &self,
        agent_id: AgentId,
        window_start: Timestamp,
        window_end: Timestamp,
    ) -> RenumResult<usize> {
        let state = self.state.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(state
            .chunks
            .values()
            .filter(|c| {
                c.agent_id == agent_id
                    && c.superseded_by.is_none()
                    && c.created_at >= window_start
                    && c.created_at < window_end
            })
            .count())
    }
}

impl std::fmt::Debug for InMemoryMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("InMemoryMemoryStore")
            .field("dimensions", &self.dimensions)
            .field(
                "chunks",
                &state.as_ref().map(|s| s.chunks.len()).unwrap_or(0),
            )
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn unit(dim: usize, axis: usize) -> EmbeddingVector {
        let mut data = vec![0.0f32; dim];
        data[axis] = 1.0;
        EmbeddingVector::new(data, "test".to_string())
    }

    fn chunk(content: &str, embedding: EmbeddingVector) -> NewMemoryChunk {
        NewMemoryChunk::text(content, embedding)
    }

    #[tokio::test]
    async fn test_append_defaults_version_to_one() {
        let store = InMemoryMemoryStore::new(4);
        let agent = new_entity_id();
        let id = store.append(agent, chunk("fact", unit(4, 0))).await.unwrap();
        let stored = store.get(agent, id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.content, "fact");
    }

    #[tokio::test]
    async fn test_append_rejects_wrong_dimension() {
        let store = InMemoryMemoryStore::new(4);
        let agent = new_entity_id();
        let err = store
            .append(agent, chunk("bad", unit(3, 0)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RenumError::Vector(renum_core::VectorError::DimensionMismatch { expected: 4, got: 3 })
        ));
    }

    #[tokio::test]
    async fn test_append_rejects_out_of_range_scores() {
        let store = InMemoryMemoryStore::new(4);
        let agent = new_entity_id();
        let mut bad = chunk("scored", unit(4, 0));
        bad.importance = 1.5;
        let err = store.append(agent, bad).await.unwrap_err();
        assert!(matches!(err, RenumError::Validation(_)));
    }

    #[tokio::test]
    async fn test_search_is_agent_scoped() {
        let store = InMemoryMemoryStore::new(4);
        let agent_a = new_entity_id();
        let agent_b = new_entity_id();
        store.append(agent_a, chunk("a", unit(4, 0))).await.unwrap();
        store.append(agent_b, chunk("b", unit(4, 0))).await.unwrap();

        let hits = store.search(agent_a, &unit(4, 0), 10, 0.0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.content, "a");
    }

    #[tokio::test]
    async fn test_search_k_zero_returns_empty() {
        let store = InMemoryMemoryStore::new(4);
        let agent = new_entity_id();
        store.append(agent, chunk("a", unit(4, 0))).await.unwrap();
        let hits = store.search(agent, &unit(4, 0), 0, 0.0).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_search_k_larger_than_available_returns_all() {
        let store = InMemoryMemoryStore::new(4);
        let agent = new_entity_id();
        store.append(agent, chunk("a", unit(4, 0))).await.unwrap();
        store.append(agent, chunk("b", unit(4, 1))).await.unwrap();
        let hits = store.search(agent, &unit(4, 0), 50, 0.0).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_search_min_similarity_one_returns_exact_only() {
        let store = InMemoryMemoryStore::new(4);
        let agent = new_entity_id();
        store.append(agent, chunk("exact", unit(4, 0))).await.unwrap();
        store.append(agent, chunk("orthogonal", unit(4, 1))).await.unwrap();

        let hits = store.search(agent, &unit(4, 0), 10, 1.0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.content, "exact");
    }

    #[tokio::test]
    async fn test_search_min_similarity_zero_returns_k_nearest() {
        let store = InMemoryMemoryStore::new(4);
        let agent = new_entity_id();
        store.append(agent, chunk("near", unit(4, 0))).await.unwrap();
        store.append(agent, chunk("far", unit(4, 1))).await.unwrap();

        let hits = store.search(agent, &unit(4, 0), 1, 0.0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.content, "near");
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let store = InMemoryMemoryStore::new(2);
        let agent = new_entity_id();
        store
            .append(
                agent,
                chunk("diagonal", EmbeddingVector::new(vec![1.0, 1.0], "t".into())),
            )
            .await
            .unwrap();
        store.append(agent, chunk("aligned", unit(2, 0))).await.unwrap();

        let hits = store.search(agent, &unit(2, 0), 10, 0.0).await.unwrap();
        assert_eq!(hits[0].chunk.content, "aligned");
        assert_eq!(hits[1].chunk.content, "diagonal");
        assert!(hits[0].similarity > hits[1].similarity);
    }

    #[tokio::test]
    async fn test_supersede_bumps_version_and_links_old() {
        let store = InMemoryMemoryStore::new(4);
        let agent = new_entity_id();
        let old_id = store
            .append(agent, chunk("prefers phone", unit(4, 0)))
            .await
            .unwrap();

        let new_id = store
            .supersede(agent, old_id, chunk("prefers email", unit(4, 0)))
            .await
            .unwrap();

        let old = store.get(agent, old_id).await.unwrap().unwrap();
        let new = store.get(agent, new_id).await.unwrap().unwrap();
        assert_eq!(old.superseded_by, Some(new_id));
        assert_eq!(new.version, 2);
        assert_eq!(
            new.metadata.unwrap()["supersedes"],
            serde_json::Value::String(old_id.to_string())
        );
    }

    #[tokio::test]
    async fn test_supersede_then_search_returns_new_chunk() {
        let store = InMemoryMemoryStore::new(4);
        let agent = new_entity_id();
        let old_id = store
            .append(agent, chunk("prefers phone", unit(4, 0)))
            .await
            .unwrap();
        let new_id = store
            .supersede(agent, old_id, chunk("prefers email", unit(4, 0)))
            .await
            .unwrap();

        let hits = store.search(agent, &unit(4, 0), 1, 0.0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.chunk_id, new_id);
    }

    #[tokio::test]
    async fn test_supersede_missing_chunk_is_not_found() {
        let store = InMemoryMemoryStore::new(4);
        let agent = new_entity_id();
        let err = store
            .supersede(agent, new_entity_id(), chunk("x", unit(4, 0)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RenumError::Storage(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_consolidate_is_idempotent_within_window() {
        let store = InMemoryMemoryStore::new(4);
        let agent = new_entity_id();
        for i in 0..3 {
            store
                .append(agent, chunk(&format!("fact {}", i), unit(4, 0)))
                .await
                .unwrap();
        }
        let start = Utc::now() - Duration::hours(1);
        let end = Utc::now() + Duration::hours(1);

        let first = store.consolidate(agent, start, end).await.unwrap().unwrap();
        let second = store.consolidate(agent, start, end).await.unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(store.snapshots(agent).len(), 1);
    }

    #[tokio::test]
    async fn test_consolidate_ranks_by_weighted_score() {
        let store = InMemoryMemoryStore::new(4);
        let agent = new_entity_id();

        let mut high = chunk("high importance", unit(4, 0));
        high.importance = 0.9;
        high.confidence = 0.1;
        store.append(agent, high).await.unwrap();

        let mut low = chunk("low importance", unit(4, 1));
        low.importance = 0.1;
        low.confidence = 0.9;
        store.append(agent, low).await.unwrap();

        let start = Utc::now() - Duration::hours(1);
        let end = Utc::now() + Duration::hours(1);
        store.consolidate(agent, start, end).await.unwrap();

        let snapshot = &store.snapshots(agent)[0];
        // 0.6*0.9 + 0.4*0.1 = 0.58 beats 0.6*0.1 + 0.4*0.9 = 0.42
        let high_pos = snapshot.summary.find("high importance").unwrap();
        let low_pos = snapshot.summary.find("low importance").unwrap();
        assert!(high_pos < low_pos);
    }

    #[tokio::test]
    async fn test_consolidate_empty_window_returns_none() {
        let store = InMemoryMemoryStore::new(4);
        let agent = new_entity_id();
        let start = Utc::now() - Duration::hours(2);
        let end = Utc::now() - Duration::hours(1);
        assert!(store.consolidate(agent, start, end).await.unwrap().is_none());
    }
}
