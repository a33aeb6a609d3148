//! Persistence Gateway
//!
//! PostgreSQL access for every Renum entity, built on deadpool-postgres.
//! The gateway is constructed once at startup and shared read-only; each
//! operation takes a scoped connection from the pool with guaranteed
//! release.
//!
//! Tenant scoping is a signature-level rule: every method that touches a
//! tenant-owned table takes the tenant id and binds it into the query. A
//! cross-tenant row simply does not exist from the caller's point of view
//! (`None` -> 404), and the attempt is audit-logged upstream.
//!
//! Embeddings travel as pgvector text literals (`[0.1,0.2,...]::vector`);
//! the column type is `vector(384)`.

use crate::error::{ApiError, ApiResult};
use crate::orchestrator::{monotonic_after, ConversationStore, PersistedTurn, TurnWrite};
use crate::vault::Sealed;
use async_trait::async_trait;
use chrono::Utc;
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use renum_core::{
    new_entity_id, Agent, AgentId, Channel, Conversation, ConversationId, ConversationStatus,
    CredentialId, DocumentId, DocumentStatus, EmbeddingVector, EntityType, IntegrationCredential,
    InteractionLog, KnowledgeChunk, KnowledgeDocument, MemoryChunk, MemoryChunkId, Message,
    MessageKind, MessageSender, PatternType, RenumError, RenumResult, SnapshotId, StorageError,
    SubAgent, SubAgentId, TenantId, Timestamp, TurnOutcome, UserId, UserProfile, UserRole,
    VectorError, EMBEDDING_DIMENSIONS, SNAPSHOT_TOP_N,
};
use renum_llm::EmbeddingProvider;
use renum_memory::{
    chunk_text, rank_hits, render_snapshot_summary, validate_scores, KnowledgeIndex,
    LearningStore, MemoryStore, NewMemoryChunk, ScoredChunk, ScoredKnowledgeChunk,
    MAX_CHUNK_CHARS,
};
use std::time::Duration;
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL DSN (`DATABASE_URL`).
    pub url: String,
    /// Maximum pool size.
    pub max_size: usize,
    /// Connection timeout.
    pub timeout: Duration,
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> ApiResult<Self> {
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| ApiError::internal_error("DATABASE_URL is not set"))?;
        Ok(Self {
            url,
            max_size: std::env::var("RENUM_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("RENUM_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        })
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.url = Some(self.url.clone());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::internal_error(format!("Failed to create pool: {}", e)))
    }
}

// ============================================================================
// GATEWAY
// ============================================================================

/// Persistence gateway over the connection pool. Cheap to clone.
#[derive(Clone)]
pub struct Gateway {
    pool: Pool,
}

impl Gateway {
    /// Create a new gateway with the given pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new gateway from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Current pool size, for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn conn(&self) -> RenumResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| {
            RenumError::Storage(StorageError::TransactionFailed {
                reason: format!("pool: {}", e),
            })
        })
    }

    /// Liveness probe: one round-trip.
    pub async fn ping(&self) -> RenumResult<()> {
        let conn = self.conn().await?;
        conn.query_one("SELECT 1", &[]).await.map_err(db_err)?;
        Ok(())
    }

    /// Run a raw SQL batch. Used by the admin CLI migration runner; the
    /// request path never calls this.
    pub async fn batch_execute(&self, sql: &str) -> RenumResult<()> {
        let conn = self.conn().await?;
        conn.batch_execute(sql).await.map_err(db_err)?;
        Ok(())
    }

    /// One scalar text query. Used by the admin CLI for probes.
    pub async fn query_scalar_text(&self, sql: &str) -> RenumResult<String> {
        let conn = self.conn().await?;
        let row = conn.query_one(sql, &[]).await.map_err(db_err)?;
        Ok(row.get(0))
    }

    /// Reload the provider's schema cache after DDL.
    ///
    /// PostgREST caches column metadata separately from DDL; inserts fail
    /// until it reloads. The notify is followed by a round-trip so callers
    /// can sequence DDL -> reload -> use.
    pub async fn schema_reload(&self) -> RenumResult<()> {
        let conn = self.conn().await?;
        conn.execute("NOTIFY pgrst, 'reload schema'", &[])
            .await
            .map_err(db_err)?;
        conn.query_one("SELECT 1", &[]).await.map_err(db_err)?;
        tracing::info!("Schema cache reload requested");
        Ok(())
    }

    // ========================================================================
    // PROFILES
    // ========================================================================

    /// Fetch the profile backing an authenticated user id.
    pub async fn profile_get(&self, user_id: UserId) -> RenumResult<Option<UserProfile>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT user_id, email, display_name, role, tenant_id, created_at
                 FROM profiles WHERE user_id = $1",
                &[&user_id],
            )
            .await
            .map_err(db_err)?;
        row.map(parse_profile).transpose()
    }

    // ========================================================================
    // AGENTS
    // ========================================================================

    /// Agents visible to a tenant: its own plus platform agents.
    pub async fn agents_list(&self, tenant_id: TenantId) -> RenumResult<Vec<Agent>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT agent_id, tenant_id, name, description, system_prompt, model, category,
                        visible, active, config, created_at, updated_at
                 FROM agents
                 WHERE tenant_id = $1 OR tenant_id IS NULL
                 ORDER BY created_at",
                &[&tenant_id],
            )
            .await
            .map_err(db_err)?;
        rows.into_iter().map(parse_agent).collect()
    }

    /// Insert a validated agent definition.
    pub async fn agent_insert(&self, agent: &Agent) -> RenumResult<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO agents (agent_id, tenant_id, name, description, system_prompt, model,
                                 category, visible, active, config, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            &[
                &agent.agent_id,
                &agent.tenant_id,
                &agent.name,
                &agent.description,
                &agent.system_prompt,
                &agent.model,
                &agent.category,
                &agent.visible,
                &agent.active,
                &agent.config,
                &agent.created_at,
                &agent.updated_at,
            ],
        )
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Insert a sub-agent under its parent.
    pub async fn sub_agent_insert(&self, sub_agent: &SubAgent) -> RenumResult<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO sub_agents (sub_agent_id, parent_agent_id, name, system_prompt,
                                     allowed_tools, rag_document_ids, keywords, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            &[
                &sub_agent.sub_agent_id,
                &sub_agent.parent_agent_id,
                &sub_agent.name,
                &sub_agent.system_prompt,
                &sub_agent.allowed_tools,
                &sub_agent.rag_document_ids,
                &sub_agent.keywords,
                &sub_agent.created_at,
            ],
        )
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Every agent id on the platform; drives the background sweeps.
    pub async fn all_agent_ids(&self) -> RenumResult<Vec<AgentId>> {
        let conn = self.conn().await?;
        let rows = conn
            .query("SELECT agent_id FROM agents WHERE active", &[])
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(|r| r.get(0)).collect())
    }

    // ========================================================================
    // CONVERSATIONS (read side for routes)
    // ========================================================================

    /// Conversations owned by a tenant, most recently updated first.
    pub async fn conversations_list(&self, tenant_id: TenantId) -> RenumResult<Vec<Conversation>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT conversation_id, tenant_id, agent_id, external_user, channel, status,
                        priority, tags, unread_count, assigned_sub_agent_id, last_update, created_at
                 FROM conversations WHERE tenant_id = $1
                 ORDER BY last_update DESC",
                &[&tenant_id],
            )
            .await
            .map_err(db_err)?;
        rows.into_iter().map(parse_conversation).collect()
    }

    // ========================================================================
    // INTEGRATION CREDENTIALS
    // ========================================================================

    /// Store (or replace) one encrypted credential.
    pub async fn credential_upsert(
        &self,
        tenant_id: TenantId,
        integration: &str,
        sealed: &Sealed,
    ) -> RenumResult<CredentialId> {
        let conn = self.conn().await?;
        let credential_id = new_entity_id();
        let nonce: &[u8] = &sealed.nonce;
        conn.execute(
            "INSERT INTO integration_credentials
                 (credential_id, tenant_id, integration, ciphertext, nonce, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, now(), now())
             ON CONFLICT (tenant_id, integration)
             DO UPDATE SET ciphertext = EXCLUDED.ciphertext,
                           nonce = EXCLUDED.nonce,
                           updated_at = now()",
            &[&credential_id, &tenant_id, &integration, &sealed.ciphertext, &nonce],
        )
        .await
        .map_err(db_err)?;
        Ok(credential_id)
    }

    /// Fetch one encrypted credential.
    pub async fn credential_get(
        &self,
        tenant_id: TenantId,
        integration: &str,
    ) -> RenumResult<Option<IntegrationCredential>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT credential_id, tenant_id, integration, ciphertext, nonce,
                        created_at, updated_at
                 FROM integration_credentials
                 WHERE tenant_id = $1 AND integration = $2",
                &[&tenant_id, &integration],
            )
            .await
            .map_err(db_err)?;
        row.map(parse_credential).transpose()
    }

    /// Integration names configured for a tenant.
    pub async fn credential_names(&self, tenant_id: TenantId) -> RenumResult<Vec<String>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT integration FROM integration_credentials
                 WHERE tenant_id = $1 ORDER BY integration",
                &[&tenant_id],
            )
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(|r| r.get(0)).collect())
    }
}

// ============================================================================
// CONVERSATION STORE IMPLEMENTATION
// ============================================================================

#[async_trait]
impl ConversationStore for Gateway {
    async fn conversation_get(
        &self,
        tenant_id: TenantId,
        id: ConversationId,
    ) -> RenumResult<Option<Conversation>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT conversation_id, tenant_id, agent_id, external_user, channel, status,
                        priority, tags, unread_count, assigned_sub_agent_id, last_update, created_at
                 FROM conversations WHERE conversation_id = $1 AND tenant_id = $2",
                &[&id, &tenant_id],
            )
            .await
            .map_err(db_err)?;
        row.map(parse_conversation).transpose()
    }

    async fn conversation_create(
        &self,
        tenant_id: TenantId,
        agent_id: AgentId,
        channel: Channel,
    ) -> RenumResult<Conversation> {
        let conn = self.conn().await?;
        let conversation = Conversation {
            conversation_id: new_entity_id(),
            tenant_id,
            agent_id,
            external_user: None,
            channel,
            status: ConversationStatus::Active,
            priority: 0,
            tags: Vec::new(),
            unread_count: 0,
            assigned_sub_agent_id: None,
            last_update: Utc::now(),
            created_at: Utc::now(),
        };
        conn.execute(
            "INSERT INTO conversations (conversation_id, tenant_id, agent_id, external_user,
                                        channel, status, priority, tags, unread_count,
                                        assigned_sub_agent_id, last_update, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            &[
                &conversation.conversation_id,
                &conversation.tenant_id,
                &conversation.agent_id,
                &conversation.external_user,
                &conversation.channel.as_db_str(),
                &conversation.status.as_db_str(),
                &conversation.priority,
                &conversation.tags,
                &conversation.unread_count,
                &conversation.assigned_sub_agent_id,
                &conversation.last_update,
                &conversation.created_at,
            ],
        )
        .await
        .map_err(db_err)?;
        Ok(conversation)
    }

    async fn recent_messages(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
        limit: usize,
    ) -> RenumResult<Vec<Message>> {
        let conn = self.conn().await?;
        // Newest N via the index, then flipped to oldest-first for prompts.
        let rows = conn
            .query(
                "SELECT m.message_id, m.conversation_id, m.sender, m.kind, m.content, m.metadata,
                        m.read_flag, m.channel, m.created_at
                 FROM messages m
                 JOIN conversations c ON c.conversation_id = m.conversation_id
                 WHERE m.conversation_id = $1 AND c.tenant_id = $2
                 ORDER BY m.created_at DESC, m.message_id DESC
                 LIMIT $3",
                &[&conversation_id, &tenant_id, &(limit as i64)],
            )
            .await
            .map_err(db_err)?;
        let mut messages: Vec<Message> = rows
            .into_iter()
            .map(parse_message)
            .collect::<RenumResult<_>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn agent_get(&self, tenant_id: TenantId, id: AgentId) -> RenumResult<Option<Agent>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT agent_id, tenant_id, name, description, system_prompt, model, category,
                        visible, active, config, created_at, updated_at
                 FROM agents
                 WHERE agent_id = $1 AND (tenant_id = $2 OR tenant_id IS NULL)",
                &[&id, &tenant_id],
            )
            .await
            .map_err(db_err)?;
        row.map(parse_agent).transpose()
    }

    async fn default_agent(&self, tenant_id: TenantId) -> RenumResult<Option<Agent>> {
        let conn = self.conn().await?;
        // Tenant-owned agents win over platform agents (Renus, ISA).
        let row = conn
            .query_opt(
                "SELECT agent_id, tenant_id, name, description, system_prompt, model, category,
                        visible, active, config, created_at, updated_at
                 FROM agents
                 WHERE (tenant_id = $1 OR tenant_id IS NULL) AND active
                 ORDER BY (tenant_id IS NULL), created_at
                 LIMIT 1",
                &[&tenant_id],
            )
            .await
            .map_err(db_err)?;
        row.map(parse_agent).transpose()
    }

    async fn sub_agents(&self, agent_id: AgentId) -> RenumResult<Vec<SubAgent>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT sub_agent_id, parent_agent_id, name, system_prompt, allowed_tools,
                        rag_document_ids, keywords, created_at
                 FROM sub_agents WHERE parent_agent_id = $1
                 ORDER BY created_at",
                &[&agent_id],
            )
            .await
            .map_err(db_err)?;
        rows.into_iter().map(parse_sub_agent).collect()
    }

    async fn assign_sub_agent(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
        sub_agent_id: Option<SubAgentId>,
    ) -> RenumResult<()> {
        let conn = self.conn().await?;
        let updated = conn
            .execute(
                "UPDATE conversations SET assigned_sub_agent_id = $1
                 WHERE conversation_id = $2 AND tenant_id = $3",
                &[&sub_agent_id, &conversation_id, &tenant_id],
            )
            .await
            .map_err(db_err)?;
        if updated == 0 {
            return Err(RenumError::Storage(StorageError::NotFound {
                entity_type: EntityType::Conversation,
                id: conversation_id,
            }));
        }
        Ok(())
    }

    async fn persist_turn(
        &self,
        tenant_id: TenantId,
        write: TurnWrite,
    ) -> RenumResult<PersistedTurn> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(db_err)?;

        // Row lock doubles as the tenant-scope check.
        let row = tx
            .query_opt(
                "SELECT last_update FROM conversations
                 WHERE conversation_id = $1 AND tenant_id = $2
                 FOR UPDATE",
                &[&write.conversation_id, &tenant_id],
            )
            .await
            .map_err(db_err)?
            .ok_or(StorageError::NotFound {
                entity_type: EntityType::Conversation,
                id: write.conversation_id,
            })?;
        let last_update: Timestamp = row.get(0);

        let inbound_at = monotonic_after(last_update);
        let outbound_at = monotonic_after(inbound_at);

        let inbound_id = new_entity_id();
        tx.execute(
            "INSERT INTO messages (message_id, conversation_id, sender, kind, content, metadata,
                                   read_flag, channel, created_at)
             VALUES ($1, $2, $3, 'text', $4, NULL, true, $5, $6)",
            &[
                &inbound_id,
                &write.conversation_id,
                &write.inbound_sender.as_db_str(),
                &write.inbound_content,
                &write.channel.as_db_str(),
                &inbound_at,
            ],
        )
        .await
        .map_err(db_err)?;

        let outbound_id = new_entity_id();
        tx.execute(
            "INSERT INTO messages (message_id, conversation_id, sender, kind, content, metadata,
                                   read_flag, channel, created_at)
             VALUES ($1, $2, 'system', 'text', $3, $4, false, $5, $6)",
            &[
                &outbound_id,
                &write.conversation_id,
                &write.outbound_content,
                &write.outbound_metadata,
                &write.channel.as_db_str(),
                &outbound_at,
            ],
        )
        .await
        .map_err(db_err)?;

        tx.execute(
            "UPDATE conversations
             SET last_update = $1, unread_count = unread_count + 1
             WHERE conversation_id = $2",
            &[&outbound_at, &write.conversation_id],
        )
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        Ok(PersistedTurn {
            inbound_id,
            outbound: Message {
                message_id: outbound_id,
                conversation_id: write.conversation_id,
                sender: MessageSender::System,
                kind: MessageKind::Text,
                content: write.outbound_content,
                metadata: Some(write.outbound_metadata),
                read: false,
                channel: write.channel,
                created_at: outbound_at,
            },
        })
    }

    async fn mark_read(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
    ) -> RenumResult<()> {
        let conn = self.conn().await?;
        conn.execute(
            "UPDATE conversations SET unread_count = 0
             WHERE conversation_id = $1 AND tenant_id = $2",
            &[&conversation_id, &tenant_id],
        )
        .await
        .map_err(db_err)?;
        conn.execute(
            "UPDATE messages SET read_flag = true
             FROM conversations c
             WHERE messages.conversation_id = $1
               AND c.conversation_id = messages.conversation_id
               AND c.tenant_id = $2",
            &[&conversation_id, &tenant_id],
        )
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn idempotency_get(
        &self,
        tenant_id: TenantId,
        key: &str,
    ) -> RenumResult<Option<serde_json::Value>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT receipt FROM idempotency_keys
                 WHERE tenant_id = $1 AND key = $2",
                &[&tenant_id, &key],
            )
            .await
            .map_err(db_err)?;
        Ok(row.map(|r| r.get(0)))
    }

    async fn idempotency_put(
        &self,
        tenant_id: TenantId,
        key: &str,
        receipt: &serde_json::Value,
    ) -> RenumResult<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO idempotency_keys (tenant_id, key, receipt, created_at)
             VALUES ($1, $2, $3, now())
             ON CONFLICT (tenant_id, key) DO NOTHING",
            &[&tenant_id, &key, &receipt],
        )
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

// ============================================================================
// MEMORY STORE IMPLEMENTATION
// ============================================================================

#[async_trait]
impl MemoryStore for Gateway {
    async fn append(&self, agent_id: AgentId, chunk: NewMemoryChunk) -> RenumResult<MemoryChunkId> {
        chunk.embedding.check_dimensions(EMBEDDING_DIMENSIONS)?;
        validate_scores(&chunk)?;
        let conn = self.conn().await?;
        let chunk_id = new_entity_id();
        let version = chunk.version.unwrap_or(1);
        conn.execute(
            "INSERT INTO memory_chunks (chunk_id, agent_id, content, memory_type, embedding,
                                        metadata, source, confidence, importance, version,
                                        superseded_by, created_at)
             VALUES ($1, $2, $3, $4, $5::vector, $6, $7, $8, $9, $10, NULL, now())",
            &[
                &chunk_id,
                &agent_id,
                &chunk.content,
                &chunk.memory_type.as_db_str(),
                &chunk.embedding.to_pgvector_literal(),
                &chunk.metadata,
                &chunk.source,
                &chunk.confidence,
                &chunk.importance,
                &version,
            ],
        )
        .await
        .map_err(db_err)?;
        Ok(chunk_id)
    }

    async fn get(
        &self,
        agent_id: AgentId,
        chunk_id: MemoryChunkId,
    ) -> RenumResult<Option<MemoryChunk>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT chunk_id, agent_id, content, memory_type, embedding::text, metadata,
                        source, confidence, importance, version, superseded_by, created_at
                 FROM memory_chunks WHERE chunk_id = $1 AND agent_id = $2",
                &[&chunk_id, &agent_id],
            )
            .await
            .map_err(db_err)?;
        row.map(parse_memory_chunk).transpose()
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
        query.check_dimensions(EMBEDDING_DIMENSIONS)?;
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT chunk_id, agent_id, content, memory_type, embedding::text, metadata,
                        source, confidence, importance, version, superseded_by, created_at,
                        1 - (embedding <=> $1::vector) AS similarity
                 FROM memory_chunks
                 WHERE agent_id = $2
                   AND superseded_by IS NULL
                   AND 1 - (embedding <=> $1::vector) >= $3
                 ORDER BY similarity DESC, chunk_id
                 LIMIT $4",
                &[
                    &query.to_pgvector_literal(),
                    &agent_id,
                    &(min_similarity as f64),
                    &(k as i64),
                ],
            )
            .await
            .map_err(db_err)?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let similarity: f64 = row.get("similarity");
            hits.push(ScoredChunk {
                chunk: parse_memory_chunk(row)?,
                similarity: similarity as f32,
            });
        }
        Ok(rank_hits(hits, k))
    }

    async fn supersede(
        &self,
        agent_id: AgentId,
        old_id: MemoryChunkId,
        chunk: NewMemoryChunk,
    ) -> RenumResult<MemoryChunkId> {
        chunk.embedding.check_dimensions(EMBEDDING_DIMENSIONS)?;
        validate_scores(&chunk)?;
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(db_err)?;

        let row = tx
            .query_opt(
                "SELECT version FROM memory_chunks
                 WHERE chunk_id = $1 AND agent_id = $2 FOR UPDATE",
                &[&old_id, &agent_id],
            )
            .await
            .map_err(db_err)?
            .ok_or(StorageError::NotFound {
                entity_type: EntityType::MemoryChunk,
                id: old_id,
            })?;
        let old_version: i32 = row.get(0);

        let mut metadata = chunk.metadata.clone().unwrap_or_else(|| serde_json::json!({}));
        if let Some(map) = metadata.as_object_mut() {
            map.insert(
                "supersedes".to_string(),
                serde_json::Value::String(old_id.to_string()),
            );
        }

        let new_id = new_entity_id();
        tx.execute(
            "INSERT INTO memory_chunks (chunk_id, agent_id, content, memory_type, embedding,
                                        metadata, source, confidence, importance, version,
                                        superseded_by, created_at)
             VALUES ($1, $2, $3, $4, $5::vector, $6, $7, $8, $9, $10, NULL, now())",
            &[
                &new_id,
                &agent_id,
                &chunk.content,
                &chunk.memory_type.as_db_str(),
                &chunk.embedding.to_pgvector_literal(),
                &metadata,
                &chunk.source,
                &chunk.confidence,
                &chunk.importance,
                &(old_version + 1),
            ],
        )
        .await
        .map_err(db_err)?;

        tx.execute(
            "UPDATE memory_chunks SET superseded_by = $1 WHERE chunk_id = $2",
            &[&new_id, &old_id],
        )
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(new_id)
    }

    async fn consolidate(
        &self,
        agent_id: AgentId,
        window_start: Timestamp,
        window_end: Timestamp,
    ) -> RenumResult<Option<SnapshotId>> {
        let conn = self.conn().await?;

        if let Some(existing) = conn
            .query_opt(
                "SELECT snapshot_id FROM knowledge_snapshots
                 WHERE agent_id = $1 AND window_start = $2",
                &[&agent_id, &window_start],
            )
            .await
            .map_err(db_err)?
        {
            return Ok(Some(existing.get(0)));
        }

        let rows = conn
            .query(
                "SELECT chunk_id, agent_id, content, memory_type, embedding::text, metadata,
                        source, confidence, importance, version, superseded_by, created_at
                 FROM memory_chunks
                 WHERE agent_id = $1 AND superseded_by IS NULL
                   AND created_at >= $2 AND created_at < $3
                 ORDER BY (0.6 * importance + 0.4 * confidence) DESC, chunk_id
                 LIMIT $4",
                &[&agent_id, &window_start, &window_end, &(SNAPSHOT_TOP_N as i64)],
            )
            .await
            .map_err(db_err)?;
        if rows.is_empty() {
            return Ok(None);
        }

        let chunks: Vec<MemoryChunk> = rows
            .into_iter()
            .map(parse_memory_chunk)
            .collect::<RenumResult<_>>()?;
        let refs: Vec<&MemoryChunk> = chunks.iter().collect();
        let summary = render_snapshot_summary(&refs);
        let chunk_ids: Vec<Uuid> = chunks.iter().map(|c| c.chunk_id).collect();

        let snapshot_id = new_entity_id();
        // ON CONFLICT keeps a concurrent consolidation idempotent.
        let inserted = conn
            .execute(
                "INSERT INTO knowledge_snapshots
                     (snapshot_id, agent_id, window_start, window_end, summary, chunk_ids, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, now())
                 ON CONFLICT (agent_id, window_start) DO NOTHING",
                &[&snapshot_id, &agent_id, &window_start, &window_end, &summary, &chunk_ids],
            )
            .await
            .map_err(db_err)?;
        if inserted == 0 {
            let existing = conn
                .query_one(
                    "SELECT snapshot_id FROM knowledge_snapshots
                     WHERE agent_id = $1 AND window_start = $2",
                    &[&agent_id, &window_start],
                )
                .await
                .map_err(db_err)?;
            return Ok(Some(existing.get(0)));
        }
        Ok(Some(snapshot_id))
    }

    async fn chunks_in_window(
        &self,
        agent_id: AgentId,
        window_start: Timestamp,
        window_end: Timestamp,
    ) -> RenumResult<usize> {
        let conn = self.conn().await?;
        let row = conn
            .query_one(
                "SELECT count(*) FROM memory_chunks
                 WHERE agent_id = $1 AND superseded_by IS NULL
                   AND created_at >= $2 AND created_at < $3",
                &[&agent_id, &window_start, &window_end],
            )
            .await
            .map_err(db_err)?;
        let count: i64 = row.get(0);
        Ok(count as usize)
    }
}

// ============================================================================
// KNOWLEDGE INDEX IMPLEMENTATION
// ============================================================================

#[async_trait]
impl KnowledgeIndex for Gateway {
    async fn create_document(
        &self,
        tenant_id: TenantId,
        agent_id: AgentId,
        title: &str,
    ) -> RenumResult<KnowledgeDocument> {
        let conn = self.conn().await?;
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
        conn.execute(
            "INSERT INTO knowledge_documents (document_id, agent_id, tenant_id, title, status,
                                              chunk_count, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            &[
                &document.document_id,
                &document.agent_id,
                &document.tenant_id,
                &document.title,
                &document.status.as_db_str(),
                &document.chunk_count,
                &document.created_at,
                &document.updated_at,
            ],
        )
        .await
        .map_err(db_err)?;
        Ok(document)
    }

    async fn ingest(
        &self,
        document_id: DocumentId,
        text: &str,
        embedder: &dyn EmbeddingProvider,
    ) -> RenumResult<KnowledgeDocument> {
        let document = self
            .document(document_id)
            .await?
            .ok_or(StorageError::NotFound {
                entity_type: EntityType::KnowledgeDocument,
                id: document_id,
            })?;

        // Embed everything first; rows are only written once every chunk
        // embedded, so a failure leaves no partials behind.
        let pieces = chunk_text(text, MAX_CHUNK_CHARS);
        let mut embedded = Vec::with_capacity(pieces.len());
        for piece in &pieces {
            match embedder.embed(piece).await {
                Ok(vector) => match vector.check_dimensions(EMBEDDING_DIMENSIONS) {
                    Ok(()) => embedded.push((piece.clone(), vector)),
                    Err(err) => return self.ingest_failed(document_id, err).await,
                },
                Err(err) => return self.ingest_failed(document_id, err).await,
            }
        }

        let mut conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(db_err)?;
        for (content, embedding) in &embedded {
            tx.execute(
                "INSERT INTO knowledge_chunks (chunk_id, document_id, agent_id, content,
                                               embedding, metadata, created_at)
                 VALUES ($1, $2, $3, $4, $5::vector, NULL, now())",
                &[
                    &new_entity_id(),
                    &document_id,
                    &document.agent_id,
                    &content,
                    &embedding.to_pgvector_literal(),
                ],
            )
            .await
            .map_err(db_err)?;
        }
        tx.execute(
            "UPDATE knowledge_documents
             SET status = 'ready', chunk_count = $1, updated_at = now()
             WHERE document_id = $2",
            &[&(embedded.len() as i32), &document_id],
        )
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;

        self.document(document_id)
            .await?
            .ok_or_else(|| {
                RenumError::Storage(StorageError::NotFound {
                    entity_type: EntityType::KnowledgeDocument,
                    id: document_id,
                })
            })
    }

    async fn document(&self, document_id: DocumentId) -> RenumResult<Option<KnowledgeDocument>> {
        let conn = self.conn().await?;
        let row = conn
            .query_opt(
                "SELECT document_id, agent_id, tenant_id, title, status, chunk_count,
                        created_at, updated_at
                 FROM knowledge_documents WHERE document_id = $1",
                &[&document_id],
            )
            .await
            .map_err(db_err)?;
        row.map(parse_document).transpose()
    }

    async fn documents_for_agent(&self, agent_id: AgentId) -> RenumResult<Vec<KnowledgeDocument>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT document_id, agent_id, tenant_id, title, status, chunk_count,
                        created_at, updated_at
                 FROM knowledge_documents WHERE agent_id = $1
                 ORDER BY created_at DESC",
                &[&agent_id],
            )
            .await
            .map_err(db_err)?;
        rows.into_iter().map(parse_document).collect()
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
        query.check_dimensions(EMBEDDING_DIMENSIONS)?;
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT kc.chunk_id, kc.document_id, kc.agent_id, kc.content, kc.embedding::text,
                        kc.metadata, kc.created_at,
                        1 - (kc.embedding <=> $1::vector) AS similarity
                 FROM knowledge_chunks kc
                 JOIN knowledge_documents kd ON kd.document_id = kc.document_id
                 WHERE kc.agent_id = $2
                   AND kd.status = 'ready'
                   AND ($4::uuid IS NULL OR kc.document_id = $4)
                   AND 1 - (kc.embedding <=> $1::vector) >= $3
                 ORDER BY similarity DESC, kc.chunk_id
                 LIMIT $5",
                &[
                    &query.to_pgvector_literal(),
                    &agent_id,
                    &(min_similarity as f64),
                    &document_id,
                    &(k as i64),
                ],
            )
            .await
            .map_err(db_err)?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            let similarity: f64 = row.get("similarity");
            hits.push(ScoredKnowledgeChunk {
                chunk: parse_knowledge_chunk(row)?,
                similarity: similarity as f32,
            });
        }
        Ok(hits)
    }
}

impl Gateway {
    /// Ingestion failure path: drop partial chunks, mark the document.
    async fn ingest_failed(
        &self,
        document_id: DocumentId,
        err: RenumError,
    ) -> RenumResult<KnowledgeDocument> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await.map_err(db_err)?;
        tx.execute(
            "DELETE FROM knowledge_chunks WHERE document_id = $1",
            &[&document_id],
        )
        .await
        .map_err(db_err)?;
        tx.execute(
            "UPDATE knowledge_documents
             SET status = 'error', chunk_count = 0, updated_at = now()
             WHERE document_id = $1",
            &[&document_id],
        )
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        tracing::warn!(document_id = %document_id, error = %err, "Document ingestion failed");
        Err(err)
    }
}

// ============================================================================
// LEARNING STORE IMPLEMENTATION
// ============================================================================

#[async_trait]
impl LearningStore for Gateway {
    async fn record(&self, log: InteractionLog) -> RenumResult<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO interaction_logs (log_id, agent_id, conversation_id, user_excerpt,
                                           agent_excerpt, tool_calls, latency_ms, outcome, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            &[
                &log.log_id,
                &log.agent_id,
                &log.conversation_id,
                &log.user_excerpt,
                &log.agent_excerpt,
                &log.tool_calls,
                &log.latency_ms,
                &log.outcome.as_db_str(),
                &log.created_at,
            ],
        )
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn logs_since(
        &self,
        agent_id: AgentId,
        since: Timestamp,
    ) -> RenumResult<Vec<InteractionLog>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT log_id, agent_id, conversation_id, user_excerpt, agent_excerpt,
                        tool_calls, latency_ms, outcome, created_at
                 FROM interaction_logs
                 WHERE agent_id = $1 AND created_at >= $2
                 ORDER BY created_at",
                &[&agent_id, &since],
            )
            .await
            .map_err(db_err)?;
        rows.into_iter().map(parse_log).collect()
    }

    async fn patterns(&self, agent_id: AgentId) -> RenumResult<Vec<renum_core::BehaviorPattern>> {
        let conn = self.conn().await?;
        let rows = conn
            .query(
                "SELECT pattern_id, agent_id, pattern_type, signal, frequency, first_seen, last_seen
                 FROM behavior_patterns WHERE agent_id = $1",
                &[&agent_id],
            )
            .await
            .map_err(db_err)?;
        let mut patterns: Vec<renum_core::BehaviorPattern> =
            rows.into_iter().map(parse_pattern).collect::<RenumResult<_>>()?;
        patterns.sort_by(|a, b| {
            let (ar, asig) = a.pattern_type.sort_rank();
            let (br, bsig) = b.pattern_type.sort_rank();
            (ar, asig, a.signal.as_str()).cmp(&(br, bsig, b.signal.as_str()))
        });
        Ok(patterns)
    }

    async fn upsert_pattern(
        &self,
        agent_id: AgentId,
        pattern_type: PatternType,
        signal: &str,
        occurrences: i64,
        first_seen: Timestamp,
        last_seen: Timestamp,
    ) -> RenumResult<()> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT INTO behavior_patterns
                 (pattern_id, agent_id, pattern_type, signal, frequency, first_seen, last_seen)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (agent_id, pattern_type, signal)
             DO UPDATE SET frequency = behavior_patterns.frequency + EXCLUDED.frequency,
                           first_seen = LEAST(behavior_patterns.first_seen, EXCLUDED.first_seen),
                           last_seen = GREATEST(behavior_patterns.last_seen, EXCLUDED.last_seen)",
            &[
                &new_entity_id(),
                &agent_id,
                &pattern_type.as_db_str(),
                &signal,
                &occurrences,
                &first_seen,
                &last_seen,
            ],
        )
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

// ============================================================================
// ROW PARSING
// ============================================================================

fn db_err(err: tokio_postgres::Error) -> RenumError {
    if let Some(db_error) = err.as_db_error() {
        use tokio_postgres::error::SqlState;
        if db_error.code() == &SqlState::UNIQUE_VIOLATION
            || db_error.code() == &SqlState::FOREIGN_KEY_VIOLATION
            || db_error.code() == &SqlState::CHECK_VIOLATION
        {
            return RenumError::Storage(StorageError::Integrity {
                reason: db_error.message().to_string(),
            });
        }
    }
    RenumError::Storage(StorageError::TransactionFailed {
        reason: format!("{}", err),
    })
}

/// Parse a pgvector text literal (`[0.1,0.2]`) back into a vector.
fn parse_pgvector(text: &str, model_id: &str) -> RenumResult<EmbeddingVector> {
    let trimmed = text.trim().trim_start_matches('[').trim_end_matches(']');
    if trimmed.is_empty() {
        return Err(RenumError::Vector(VectorError::InvalidVector {
            reason: "empty vector literal".to_string(),
        }));
    }
    let data: Result<Vec<f32>, _> = trimmed.split(',').map(|v| v.trim().parse::<f32>()).collect();
    let data = data.map_err(|e| {
        RenumError::Vector(VectorError::InvalidVector {
            reason: format!("bad vector literal: {}", e),
        })
    })?;
    Ok(EmbeddingVector::new(data, model_id.to_string()))
}

fn parse_profile(row: Row) -> RenumResult<UserProfile> {
    let role: String = row.get("role");
    Ok(UserProfile {
        user_id: row.get("user_id"),
        email: row.get("email"),
        display_name: row.get("display_name"),
        role: UserRole::from_db_str(&role).map_err(enum_err)?,
        tenant_id: row.get("tenant_id"),
        created_at: row.get("created_at"),
    })
}

fn parse_agent(row: Row) -> RenumResult<Agent> {
    Ok(Agent {
        agent_id: row.get("agent_id"),
        tenant_id: row.get("tenant_id"),
        name: row.get("name"),
        description: row.get("description"),
        system_prompt: row.get("system_prompt"),
        model: row.get("model"),
        category: row.get("category"),
        visible: row.get("visible"),
        active: row.get("active"),
        config: row.get("config"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn parse_sub_agent(row: Row) -> RenumResult<SubAgent> {
    Ok(SubAgent {
        sub_agent_id: row.get("sub_agent_id"),
        parent_agent_id: row.get("parent_agent_id"),
        name: row.get("name"),
        system_prompt: row.get("system_prompt"),
        allowed_tools: row.get("allowed_tools"),
        rag_document_ids: row.get("rag_document_ids"),
        keywords: row.get("keywords"),
        created_at: row.get("created_at"),
    })
}

fn parse_conversation(row: Row) -> RenumResult<Conversation> {
    let channel: String = row.get("channel");
    let status: String = row.get("status");
    Ok(Conversation {
        conversation_id: row.get("conversation_id"),
        tenant_id: row.get("tenant_id"),
        agent_id: row.get("agent_id"),
        external_user: row.get("external_user"),
        channel: Channel::from_db_str(&channel).map_err(enum_err)?,
        status: ConversationStatus::from_db_str(&status).map_err(enum_err)?,
        priority: row.get("priority"),
        tags: row.get("tags"),
        unread_count: row.get("unread_count"),
        assigned_sub_agent_id: row.get("assigned_sub_agent_id"),
        last_update: row.get("last_update"),
        created_at: row.get("created_at"),
    })
}

fn parse_message(row: Row) -> RenumResult<Message> {
    let sender: String = row.get("sender");
    let kind: String = row.get("kind");
    let channel: String = row.get("channel");
    Ok(Message {
        message_id: row.get("message_id"),
        conversation_id: row.get("conversation_id"),
        sender: MessageSender::from_db_str(&sender).map_err(enum_err)?,
        kind: MessageKind::from_db_str(&kind).map_err(enum_err)?,
        content: row.get("content"),
        metadata: row.get("metadata"),
        read: row.get("read_flag"),
        channel: Channel::from_db_str(&channel).map_err(enum_err)?,
        created_at: row.get("created_at"),
    })
}

fn parse_memory_chunk(row: Row) -> RenumResult<MemoryChunk> {
    let memory_type: String = row.get("memory_type");
    let embedding_text: String = row.get("embedding");
    Ok(MemoryChunk {
        chunk_id: row.get("chunk_id"),
        agent_id: row.get("agent_id"),
        content: row.get("content"),
        memory_type: memory_type.into(),
        embedding: parse_pgvector(&embedding_text, renum_core::EMBEDDING_MODEL)?,
        metadata: row.get("metadata"),
        source: row.get("source"),
        confidence: row.get("confidence"),
        importance: row.get("importance"),
        version: row.get("version"),
        superseded_by: row.get("superseded_by"),
        created_at: row.get("created_at"),
    })
}

fn parse_document(row: Row) -> RenumResult<KnowledgeDocument> {
    let status: String = row.get("status");
    Ok(KnowledgeDocument {
        document_id: row.get("document_id"),
        agent_id: row.get("agent_id"),
        tenant_id: row.get("tenant_id"),
        title: row.get("title"),
        status: DocumentStatus::from_db_str(&status).map_err(enum_err)?,
        chunk_count: row.get("chunk_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn parse_knowledge_chunk(row: Row) -> RenumResult<KnowledgeChunk> {
    let embedding_text: String = row.get("embedding");
    Ok(KnowledgeChunk {
        chunk_id: row.get("chunk_id"),
        document_id: row.get("document_id"),
        agent_id: row.get("agent_id"),
        content: row.get("content"),
        embedding: parse_pgvector(&embedding_text, renum_core::EMBEDDING_MODEL)?,
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
    })
}

fn parse_pattern(row: Row) -> RenumResult<renum_core::BehaviorPattern> {
    let pattern_type: String = row.get("pattern_type");
    Ok(renum_core::BehaviorPattern {
        pattern_id: row.get("pattern_id"),
        agent_id: row.get("agent_id"),
        pattern_type: pattern_type.into(),
        signal: row.get("signal"),
        frequency: row.get("frequency"),
        first_seen: row.get("first_seen"),
        last_seen: row.get("last_seen"),
    })
}

fn parse_log(row: Row) -> RenumResult<InteractionLog> {
    let outcome: String = row.get("outcome");
    Ok(InteractionLog {
        log_id: row.get("log_id"),
        agent_id: row.get("agent_id"),
        conversation_id: row.get("conversation_id"),
        user_excerpt: row.get("user_excerpt"),
        agent_excerpt: row.get("agent_excerpt"),
        tool_calls: row.get("tool_calls"),
        latency_ms: row.get("latency_ms"),
        outcome: TurnOutcome::from_db_str(&outcome).map_err(enum_err)?,
        created_at: row.get("created_at"),
    })
}

fn parse_credential(row: Row) -> RenumResult<IntegrationCredential> {
    Ok(IntegrationCredential {
        credential_id: row.get("credential_id"),
        tenant_id: row.get("tenant_id"),
        integration: row.get("integration"),
        ciphertext: row.get("ciphertext"),
        nonce: row.get("nonce"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn enum_err(err: renum_core::EnumParseError) -> RenumError {
    RenumError::Storage(StorageError::Integrity {
        reason: format!("{}", err),
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pgvector_roundtrip() {
        let vector = EmbeddingVector::new(vec![1.0, -0.5, 0.25], "m".to_string());
        let parsed = parse_pgvector(&vector.to_pgvector_literal(), "m").unwrap();
        assert_eq!(parsed.data, vector.data);
    }

    #[test]
    fn test_parse_pgvector_with_spaces() {
        let parsed = parse_pgvector("[0.1, 0.2, 0.3]", "m").unwrap();
        assert_eq!(parsed.data.len(), 3);
    }

    #[test]
    fn test_parse_pgvector_rejects_garbage() {
        assert!(parse_pgvector("[]", "m").is_err());
        assert!(parse_pgvector("[a,b]", "m").is_err());
    }
}
