//! Per-agent knowledge (RAG) index
//!
//! Document ingestion and retrieval for tenant-uploaded knowledge. This is a
//! different store from conversational memory: different row type, different
//! scoring, different retrieval function. The two must never be merged.
//!
//! Ingestion state machine: `indexing -> ready` on success, `indexing ->
//! error` on any chunking or embedding failure. While `indexing`, queries
//! must not return the document's chunks; on failure, partial chunks are
//! removed atomically.

use async_trait::async_trait;
use chrono::Utc;
use renum_core::{
    new_entity_id, AgentId, DocumentId, DocumentStatus, EmbeddingVector, EntityType,
    KnowledgeChunk, KnowledgeChunkId, KnowledgeDocument, RenumResult, StorageError, TenantId,
};
use renum_llm::EmbeddingProvider;
use std::collections::HashMap;
use std::sync::RwLock;

// ============================================================================
// CHUNKER
// ============================================================================

/// Maximum characters per knowledge chunk.
pub const MAX_CHUNK_CHARS: usize = 1200;

/// Split document text into chunks.
///
/// Paragraph-first: paragraphs are merged until the budget is reached; a
/// single oversized paragraph is hard-split on the budget boundary. Order is
/// preserved and no text is dropped.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if paragraph.chars().count() > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let mut buf = String::new();
            for ch in paragraph.chars() {
                buf.push(ch);
                if buf.chars().count() >= max_chars {
                    chunks.push(std::mem::take(&mut buf));
                }
            }
            if !buf.is_empty() {
                chunks.push(buf);
            }
            continue;
        }

        let joined_len = current.chars().count() + paragraph.chars().count() + 2;
        if !current.is_empty() && joined_len > max_chars {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

// ============================================================================
// RESULT TYPES
// ============================================================================

/// One RAG search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredKnowledgeChunk {
    pub chunk: KnowledgeChunk,
    pub similarity: f32,
}

// ============================================================================
// KNOWLEDGE INDEX TRAIT
// ============================================================================

/// Storage abstraction for the per-agent knowledge index.
#[async_trait]
pub trait KnowledgeIndex: Send + Sync {
    /// Register a document in `indexing` state.
    async fn create_document(
        &self,
        tenant_id: TenantId,
        agent_id: AgentId,
        title: &str,
    ) -> RenumResult<KnowledgeDocument>;

    /// Run the ingestion pipeline for a document: chunk, embed, store.
    /// On success the document becomes `ready` with an accurate
    /// `chunk_count`; on any failure it becomes `error` and partial chunks
    /// are removed.
    async fn ingest(
        &self,
        document_id: DocumentId,
        text: &str,
        embedder: &dyn EmbeddingProvider,
    ) -> RenumResult<KnowledgeDocument>;

    /// Fetch a document by id.
    async fn document(&self, document_id: DocumentId) -> RenumResult<Option<KnowledgeDocument>>;

    /// Documents for an agent, newest first.
    async fn documents_for_agent(&self, agent_id: AgentId) -> RenumResult<Vec<KnowledgeDocument>>;

    /// Nearest-neighbor search over `ready` documents for the agent,
    /// optionally narrowed to one document.
    async fn search(
        &self,
        agent_id: AgentId,
        query: &EmbeddingVector,
        k: usize,
        min_similarity: f32,
        document_id: Option<DocumentId>,
    ) -> RenumResult<Vec<ScoredKnowledgeChunk>>;
}

// ============================================================================
// IN-MEMORY IMPLEMENTATION
// ============================================================================

#[derive(Default)]
struct KnowledgeState {
    documents: HashMap<DocumentId, KnowledgeDocument>,
    chunks: HashMap<KnowledgeChunkId, KnowledgeChunk>,
}

/// RwLock-backed knowledge index for tests and single-process deployments.
pub struct InMemoryKnowledgeIndex {
    dimensions: i32,
    state: RwLock<KnowledgeState>,
}

impl InMemoryKnowledgeIndex {
    /// Create an index that accepts embeddings of the given dimension.
    pub fn new(dimensions: i32) -> Self {
        Self {
            dimensions,
            state: RwLock::new(KnowledgeState::default()),
        }
    }
}

#[async_trait]
impl KnowledgeIndex for InMemoryKnowledgeIndex {
    async fn create_document(
        &self,
        tenant_id: TenantId,
        agent_id: AgentId,
        title: &str,
    ) -> RenumResult<KnowledgeDocument> {
        let document = KnowledgeDocument {
            document_id: new_entity_id(),
            agent_id,
            tenant_id,
            title: title.to_string(),
            status: DocumentStatus::Indexing,
            chunk_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let mut state = self.state.write().map_err(|_| StorageError::LockPoisoned)?;
        state.documents.insert(document.document_id, document.clone());
        Ok(document)
    }

    async fn ingest(
        &self,
        document_id: DocumentId,
        text: &str,
        embedder: &dyn EmbeddingProvider,
    ) -> RenumResult<KnowledgeDocument> {
        let (agent_id, _) = {
            let state = self.state.read().map_err(|_| StorageError::LockPoisoned)?;
            let document = state.documents.get(&document_id).ok_or(StorageError::NotFound {
                entity_type: EntityType::KnowledgeDocument,
                id: document_id,
            })?;
            (document.agent_id, document.tenant_id)
        };

        // Embed every chunk before any row is written: the index never holds
        // partial chunks for a document, whatever state embedding fails in.
        let pieces = chunk_text(text, MAX_CHUNK_CHARS);
        let mut embedded = Vec::with_capacity(pieces.len());
        for piece in &pieces {
            match embedder.embed(piece).await {
                Ok(vector) => {
                    if let Err(err) = vector.check_dimensions(self.dimensions) {
                        return self.fail_document(document_id, err).await;
                    }
                    embedded.push((piece.clone(), vector));
                }
                Err(err) => {
                    return self.fail_document(document_id, err).await;
                }
            }
        }

        let mut state = self.state.write().map_err(|_| StorageError::LockPoisoned)?;
        for (content, embedding) in embedded.iter() {
            let chunk = KnowledgeChunk {
                chunk_id: new_entity_id(),
                document_id,
                agent_id,
                content: content.clone(),
                embedding: embedding.clone(),
                metadata: None,
                created_at: Utc::now(),
            };
            state.chunks.insert(chunk.chunk_id, chunk);
        }
        let document = state
            .documents
            .get_mut(&document_id)
            .ok_or(StorageError::NotFound {
                entity_type: EntityType::KnowledgeDocument,
                id: document_id,
            })?;
        document.status = DocumentStatus::Ready;
        document.chunk_count = embedded.len() as i32;
        document.updated_at = Utc::now();
        Ok(document.clone())
    }

    async fn document(&self, document_id: DocumentId) -> RenumResult<Option<KnowledgeDocument>> {
        let state = self.state.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(state.documents.get(&document_id).cloned())
    }

    async fn documents_for_agent(&self, agent_id: AgentId) -> RenumResult<Vec<KnowledgeDocument>> {
        let state = self.state.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut docs: Vec<_> = state
            .documents
            .values()
            .filter(|d| d.agent_id == agent_id)
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(docs)
    }

    async fn search(
        &self,
        agent_id: AgentId,
        query: &EmbeddingVector,
        k: usize,
        min_similarity: f32,
        document_id: Option<DocumentId>,
    ) -> RenumResult<Vec<ScoredKnowledgeChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let state = self.state.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut hits = Vec::new();
        for chunk in state.chunks.values() {
            if chunk.agent_id != agent_id {
                continue;
            }
            if let Some(wanted) = document_id {
                if chunk.document_id != wanted {
                    continue;
                }
            }
            let ready = state
                .documents
                .get(&chunk.document_id)
                .map(|d| d.status == DocumentStatus::Ready)
                .unwrap_or(false);
            if !ready {
                continue;
            }
            let similarity = query.cosine_similarity(&chunk.embedding)?;
            if similarity >= min_similarity {
                hits.push(ScoredKnowledgeChunk {
                    chunk: chunk.clone(),
                    similarity,
                });
            }
        }
        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
        });
        hits.truncate(k);
        Ok(hits)
    }
}

impl InMemoryKnowledgeIndex {
    /// Mark the document errored, drop any of its chunks, and propagate the
    /// cause.
    async fn fail_document(
        &self,
        document_id: DocumentId,
        err: renum_core::RenumError,
    ) -> RenumResult<KnowledgeDocument> {
        let mut state = self.state.write().map_err(|_| StorageError::LockPoisoned)?;
        state.chunks.retain(|_, c| c.document_id != document_id);
        if let Some(document) = state.documents.get_mut(&document_id) {
            document.status = DocumentStatus::Error;
            document.chunk_count = 0;
            document.updated_at = Utc::now();
        }
        tracing::warn!(document_id = %document_id, error = %err, "Document ingestion failed");
        Err(err)
    }
}

impl std::fmt::Debug for InMemoryKnowledgeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("InMemoryKnowledgeIndex")
            .field("dimensions", &self.dimensions)
            .field(
                "documents",
                &state.as_ref().map(|s| s.documents.len()).unwrap_or(0),
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
    use renum_llm::mock::MockEmbedding;

    #[test]
    fn test_chunk_text_short_input_is_one_chunk() {
        let chunks = chunk_text("hello world", 100);
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn test_chunk_text_merges_paragraphs_up_to_budget() {
        let text = "first paragraph\n\nsecond paragraph\n\nthird paragraph";
        let chunks = chunk_text(text, 40);
        assert!(chunks.len() >= 2);
        let rejoined = chunks.join("\n\n");
        assert!(rejoined.contains("first paragraph"));
        assert!(rejoined.contains("third paragraph"));
    }

    #[test]
    fn test_chunk_text_hard_splits_oversized_paragraph() {
        let long = "x".repeat(2500);
        let chunks = chunk_text(&long, 1000);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 1000));
    }

    #[test]
    fn test_chunk_text_empty_input() {
        assert!(chunk_text("", 100).is_empty());
        assert!(chunk_text("\n\n\n\n", 100).is_empty());
    }

    #[tokio::test]
    async fn test_ingest_happy_path_reaches_ready() {
        let index = InMemoryKnowledgeIndex::new(32);
        let embedder = MockEmbedding::new(32);
        let doc = index
            .create_document(new_entity_id(), new_entity_id(), "FAQ")
            .await
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Indexing);

        let done = index
            .ingest(doc.document_id, "refunds take five days\n\nsupport answers daily", &embedder)
            .await
            .unwrap();
        assert_eq!(done.status, DocumentStatus::Ready);
        assert_eq!(done.chunk_count, 1);
    }

    #[tokio::test]
    async fn test_indexing_documents_are_invisible_to_search() {
        let index = InMemoryKnowledgeIndex::new(32);
        let embedder = MockEmbedding::new(32);
        let agent = new_entity_id();
        let doc = index.create_document(new_entity_id(), agent, "FAQ").await.unwrap();

        // Never ingested: stays `indexing`, search must not see it.
        let query = embedder.embed("anything").await.unwrap();
        let hits = index.search(agent, &query, 10, 0.0, None).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(
            index.document(doc.document_id).await.unwrap().unwrap().status,
            DocumentStatus::Indexing
        );
    }

    #[tokio::test]
    async fn test_ingest_failure_removes_partial_chunks() {
        let index = InMemoryKnowledgeIndex::new(32);
        let embedder = MockEmbedding::new(32);
        let agent = new_entity_id();
        let doc = index.create_document(new_entity_id(), agent, "FAQ").await.unwrap();

        embedder.set_failing(true);
        let err = index
            .ingest(doc.document_id, "some text to embed", &embedder)
            .await
            .unwrap_err();
        assert!(matches!(err, renum_core::RenumError::Llm(_)));

        let failed = index.document(doc.document_id).await.unwrap().unwrap();
        assert_eq!(failed.status, DocumentStatus::Error);
        assert_eq!(failed.chunk_count, 0);

        embedder.set_failing(false);
        let query = embedder.embed("some text to embed").await.unwrap();
        let hits = index.search(agent, &query, 10, 0.0, None).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_search_filter_by_document() {
        let index = InMemoryKnowledgeIndex::new(32);
        let embedder = MockEmbedding::new(32);
        let agent = new_entity_id();
        let tenant = new_entity_id();

        let doc_a = index.create_document(tenant, agent, "A").await.unwrap();
        let doc_b = index.create_document(tenant, agent, "B").await.unwrap();
        index.ingest(doc_a.document_id, "shipping policy details", &embedder).await.unwrap();
        index.ingest(doc_b.document_id, "billing policy details", &embedder).await.unwrap();

        let query = embedder.embed("policy details").await.unwrap();
        let all = index.search(agent, &query, 10, 0.0, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let only_a = index
            .search(agent, &query, 10, 0.0, Some(doc_a.document_id))
            .await
            .unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].chunk.document_id, doc_a.document_id);
    }

    #[tokio::test]
    async fn test_search_k_zero_returns_empty() {
        let index = InMemoryKnowledgeIndex::new(32);
        let embedder = MockEmbedding::new(32);
        let agent = new_entity_id();
        let doc = index.create_document(new_entity_id(), agent, "A").await.unwrap();
        index.ingest(doc.document_id, "content", &embedder).await.unwrap();

        let query = embedder.embed("content").await.unwrap();
        let hits = index.search(agent, &query, 0, 0.0, None).await.unwrap();
        assert!(hits.is_empty());
    }
}
