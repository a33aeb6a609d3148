//! Turn Orchestrator
//!
//! The state machine of a single conversational turn:
//!
//! `Received -> Authorized -> Resolved -> ContextAssembled -> Generated ->
//! Persisted -> Broadcast -> Done`, with `Failed(reason)` reachable from
//! every state. Authentication happens in middleware, so a turn enters here
//! already `Authorized`.
//!
//! Concurrency: at most one in-flight turn per conversation. A per-
//! conversation async mutex is held from resolution through persistence;
//! waiters are served in arrival order (tokio mutexes are FIFO). Different
//! conversations proceed independently.
//!
//! Failure policy: embedding and LLM transport errors retry twice with
//! 100 ms / 400 ms backoff; embedding exhaustion degrades the turn (semantic
//! retrieval is skipped and the reply metadata records it); model exhaustion
//! fails the turn. Tool errors are captured into reply metadata and never
//! fail the turn. Broadcast failure never rolls back persistence.

use crate::error::{ApiError, ApiResult, ErrorKind};
use crate::events::{WsEvent, WsFrame};
use crate::ws::WsState;
use async_trait::async_trait;
use dashmap::DashMap;
use renum_agents::{detect_handoff, select_sub_agent, RoutingSignal, ToolRegistry};
use renum_core::{
    validate_message_content, Agent, AgentId, Channel, Conversation, ConversationId,
    EmbeddingVector, InteractionLog, MemoryChunkId, Message, MessageId, MessageKind,
    MessageSender, RenumResult, SubAgent, SubAgentId, TenantId, Timestamp, TurnOutcome, UserId,
    EMBEDDING_TIMEOUT, HISTORY_WINDOW, KNOWLEDGE_MIN_SIMILARITY, KNOWLEDGE_SEARCH_K, LLM_TIMEOUT,
    MEMORY_MIN_SIMILARITY, MEMORY_SEARCH_K, TURN_TIMEOUT,
};
use renum_llm::{
    estimate_tokens, retry_with_backoff, ChatMessage, ChatProvider, ChatRequest, EmbeddingProvider,
    ToolSpec,
};
use renum_memory::{KnowledgeIndex, LearningStore, MemoryStore, ScoredChunk};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Prompt budget used for context trimming. Conservative across the
/// recognized models; exact usage comes back from the provider per reply.
const MODEL_TOKEN_BUDGET: usize = 8_000;

// ============================================================================
// CONVERSATION STORE SEAM
// ============================================================================

/// Payload for the transactional turn write.
#[derive(Debug, Clone)]
pub struct TurnWrite {
    pub conversation_id: ConversationId,
    pub channel: Channel,
    pub inbound_sender: MessageSender,
    pub inbound_content: String,
    pub outbound_content: String,
    pub outbound_metadata: serde_json::Value,
}

/// Result of the transactional turn write.
#[derive(Debug, Clone)]
pub struct PersistedTurn {
    pub inbound_id: MessageId,
    pub outbound: Message,
}

/// Conversation-side persistence needed by the orchestrator. The Postgres
/// gateway implements this; tests use an in-memory implementation.
///
/// Every method takes the tenant id: tenant scoping is a signature-level
/// guarantee here, not a runtime permission check.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn conversation_get(
        &self,
        tenant_id: TenantId,
        id: ConversationId,
    ) -> RenumResult<Option<Conversation>>;

    async fn conversation_create(
        &self,
        tenant_id: TenantId,
        agent_id: AgentId,
        channel: Channel,
    ) -> RenumResult<Conversation>;

    /// Last `limit` messages, oldest first.
    async fn recent_messages(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
        limit: usize,
    ) -> RenumResult<Vec<Message>>;

    async fn agent_get(&self, tenant_id: TenantId, id: AgentId) -> RenumResult<Option<Agent>>;

    /// The tenant's default (or platform) agent for new conversations.
    async fn default_agent(&self, tenant_id: TenantId) -> RenumResult<Option<Agent>>;

    /// Sub-agents of an agent, in creation order.
    async fn sub_agents(&self, agent_id: AgentId) -> RenumResult<Vec<SubAgent>>;

    async fn assign_sub_agent(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
        sub_agent_id: Option<SubAgentId>,
    ) -> RenumResult<()>;

    /// Write inbound message, outbound message, and conversation bookkeeping
    /// (`last_update`, `unread_count`) in one transaction. Message
    /// timestamps are monotonic non-decreasing per conversation.
    async fn persist_turn(&self, tenant_id: TenantId, write: TurnWrite)
        -> RenumResult<PersistedTurn>;

    async fn mark_read(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
    ) -> RenumResult<()>;

    /// Idempotency replay storage, keyed by `(tenant, key)`.
    async fn idempotency_get(
        &self,
        tenant_id: TenantId,
        key: &str,
    ) -> RenumResult<Option<serde_json::Value>>;

    async fn idempotency_put(
        &self,
        tenant_id: TenantId,
        key: &str,
        receipt: &serde_json::Value,
    ) -> RenumResult<()>;
}

// ============================================================================
// TURN TYPES
// ============================================================================

/// One raw inbound event.
#[derive(Debug, Clone)]
pub struct InboundTurn {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    /// Existing conversation, or `None` to open a new one.
    pub conversation_id: Option<ConversationId>,
    /// Target agent for new conversations; defaults to the tenant's agent.
    pub agent_id: Option<AgentId>,
    pub content: String,
    pub channel: Channel,
    pub idempotency_key: Option<String>,
    pub admin_override: Option<SubAgentId>,
}

/// One executed (or attempted) tool invocation, as recorded in reply
/// metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ToolCallRecord {
    pub name: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub arguments: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Memory hit surfaced in the turn's debug metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MemoryHit {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub chunk_id: MemoryChunkId,
    pub content: String,
    pub similarity: f32,
}

/// The durable outcome of one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TurnReceipt {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub conversation_id: ConversationId,
    /// The outbound message id; the contract is one outbound message per
    /// persisted turn.
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub message_id: MessageId,
    pub reply: String,
    pub tool_calls: Vec<ToolCallRecord>,
    /// Subsystems skipped for this turn (e.g. "memory" on embedding outage).
    pub degraded: Vec<String>,
    /// Retrieved memory chunks, for debugging and the happy-path contract.
    pub memory_hits: Vec<MemoryHit>,
    /// True when this receipt was replayed from an idempotency key.
    #[serde(default)]
    pub replayed: bool,
}

// ============================================================================
// STATS
// ============================================================================

/// Plain counters served by /api/monitoring/stats.
#[derive(Debug, Default)]
pub struct OrchestratorStats {
    pub turns_total: AtomicU64,
    pub turns_failed: AtomicU64,
    pub turns_degraded: AtomicU64,
    pub turns_replayed: AtomicU64,
}

impl OrchestratorStats {
    pub fn snapshot(&self) -> serde_json::Value {
        json!({
            "turns_total": self.turns_total.load(Ordering::Relaxed),
            "turns_failed": self.turns_failed.load(Ordering::Relaxed),
            "turns_degraded": self.turns_degraded.load(Ordering::Relaxed),
            "turns_replayed": self.turns_replayed.load(Ordering::Relaxed),
        })
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Per-process turn orchestrator.
pub struct Orchestrator {
    conversations: Arc<dyn ConversationStore>,
    memory: Arc<dyn MemoryStore>,
    knowledge: Arc<dyn KnowledgeIndex>,
    learning: Arc<dyn LearningStore>,
    tools: Arc<ToolRegistry>,
    embedder: Arc<dyn EmbeddingProvider>,
    chat: Arc<dyn ChatProvider>,
    ws: Arc<WsState>,
    locks: DashMap<ConversationId, Arc<Mutex<()>>>,
    pub stats: OrchestratorStats,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        memory: Arc<dyn MemoryStore>,
        knowledge: Arc<dyn KnowledgeIndex>,
        learning: Arc<dyn LearningStore>,
        tools: Arc<ToolRegistry>,
        embedder: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatProvider>,
        ws: Arc<WsState>,
    ) -> Self {
        Self {
            conversations,
            memory,
            knowledge,
            learning,
            tools,
            embedder,
            chat,
            ws,
            locks: DashMap::new(),
            stats: OrchestratorStats::default(),
        }
    }

    /// Run one turn to completion.
    ///
    /// The turn executes on a detached task: once the database transaction
    /// commits the turn is durable, so a caller disconnect must not cancel
    /// it mid-flight.
    pub async fn dispatch(this: Arc<Self>, turn: InboundTurn) -> ApiResult<TurnReceipt> {
        let runner = this.clone();
        let handle = tokio::spawn(async move { runner.run_turn(turn).await });
        handle
            .await
            .map_err(|e| ApiError::internal_error(format!("Turn task failed: {}", e)))?
    }

    async fn run_turn(&self, turn: InboundTurn) -> ApiResult<TurnReceipt> {
        self.stats.turns_total.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        debug!(tenant_id = %turn.tenant_id, stage = "received", "Turn received");

        validate_message_content(MessageKind::Text, &turn.content, None)
            .map_err(|e| ApiError::validation(format!("{}", e)))?;

        // Idempotent replay: the same key returns the first turn's receipt
        // without re-running anything.
        if let Some(key) = &turn.idempotency_key {
            if let Some(stored) = self
                .conversations
                .idempotency_get(turn.tenant_id, key)
                .await
                .map_err(ApiError::from)?
            {
                let mut receipt: TurnReceipt = serde_json::from_value(stored)?;
                receipt.replayed = true;
                self.stats.turns_replayed.fetch_add(1, Ordering::Relaxed);
                debug!(idempotency_key = %key, "Replayed turn receipt");
                return Ok(receipt);
            }
        }

        let result = tokio::time::timeout(TURN_TIMEOUT, self.execute(&turn, started)).await;
        let receipt = match result {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(err)) => {
                self.stats.turns_failed.fetch_add(1, Ordering::Relaxed);
                return Err(err);
            }
            Err(_) => {
                // The transaction never committed: the conversation is
                // unchanged.
                self.stats.turns_failed.fetch_add(1, Ordering::Relaxed);
                warn!(tenant_id = %turn.tenant_id, "Turn exceeded the overall budget");
                return Err(ApiError::timeout("Turn exceeded its 90s budget"));
            }
        };

        if !receipt.degraded.is_empty() {
            self.stats.turns_degraded.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(key) = &turn.idempotency_key {
            let stored = serde_json::to_value(&receipt)?;
            if let Err(e) = self
                .conversations
                .idempotency_put(turn.tenant_id, key, &stored)
                .await
            {
                warn!(error = %e, "Failed to store idempotency receipt");
            }
        }

        Ok(receipt)
    }

    async fn execute(&self, turn: &InboundTurn, started: Instant) -> ApiResult<TurnReceipt> {
        // ====================================================================
        // Resolved: conversation exists or is created; agent is fixed.
        // ====================================================================
        let conversation = match turn.conversation_id {
            Some(id) => self
                .conversations
                .conversation_get(turn.tenant_id, id)
                .await
                .map_err(ApiError::from)?
                .ok_or_else(|| {
                    // Cross-tenant probes land here too: same NotFound as a
                    // genuinely missing row, plus an audit line.
                    warn!(
                        audit = "tenant_scope",
                        tenant_id = %turn.tenant_id,
                        conversation_id = %id,
                        "Conversation lookup outside tenant scope"
                    );
                    ApiError::not_found("Conversation not found")
                })?,
            None => {
                let agent = match turn.agent_id {
                    Some(agent_id) => self
                        .conversations
                        .agent_get(turn.tenant_id, agent_id)
                        .await
                        .map_err(ApiError::from)?
                        .ok_or_else(|| ApiError::not_found("Agent not found"))?,
                    None => self
                        .conversations
                        .default_agent(turn.tenant_id)
                        .await
                        .map_err(ApiError::from)?
                        .ok_or_else(|| {
                            ApiError::not_found("No agent configured for this tenant")
                        })?,
                };
                self.conversations
                    .conversation_create(turn.tenant_id, agent.agent_id, turn.channel)
                    .await
                    .map_err(ApiError::from)?
            }
        };
        let conversation_id = conversation.conversation_id;
        debug!(conversation_id = %conversation_id, stage = "resolved", "Turn resolved");

        // Serialize turns per conversation from here through Persisted.
        // Tokio mutexes queue waiters in arrival order.
        let lock = self
            .locks
            .entry(conversation_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Re-read inside the lock: the previous turn may have reassigned the
        // sub-agent or advanced the conversation.
        let conversation = self
            .conversations
            .conversation_get(turn.tenant_id, conversation_id)
            .await
            .map_err(ApiError::from)?
            .ok_or_else(|| ApiError::not_found("Conversation not found"))?;

        let agent = self
            .conversations
            .agent_get(turn.tenant_id, conversation.agent_id)
            .await
            .map_err(ApiError::from)?
            .ok_or_else(|| ApiError::not_found("Agent not found"))?;

        // Sub-agent selection: sticky unless the signal demands a handoff.
        let candidates = self
            .conversations
            .sub_agents(agent.agent_id)
            .await
            .map_err(ApiError::from)?;
        let patterns = self
            .learning
            .patterns(agent.agent_id)
            .await
            .map_err(ApiError::from)?;
        let signal = RoutingSignal {
            admin_override: turn.admin_override,
            requests_handoff: detect_handoff(&turn.content),
        };
        let selected =
            select_sub_agent(&conversation, &candidates, &patterns, &turn.content, &signal);
        if selected != conversation.assigned_sub_agent_id {
            self.conversations
                .assign_sub_agent(turn.tenant_id, conversation_id, selected)
                .await
                .map_err(ApiError::from)?;
        }
        let sub_agent = selected.and_then(|id| candidates.iter().find(|c| c.sub_agent_id == id));

        // ====================================================================
        // ContextAssembled: memory + knowledge + tools + history.
        // ====================================================================
        let mut degraded: Vec<String> = Vec::new();

        let query_vector = self.embed_query(&turn.content).await;
        if query_vector.is_none() {
            // Both retrieval paths share the query embedding; "memory" names
            // the degraded semantic-retrieval capability as a whole.
            degraded.push("memory".to_string());
        }

        let memory_hits: Vec<ScoredChunk> = match &query_vector {
            Some(vector) => self
                .memory
                .search(agent.agent_id, vector, MEMORY_SEARCH_K, MEMORY_MIN_SIMILARITY)
                .await
                .map_err(ApiError::from)?,
            None => Vec::new(),
        };

        let mut rag_hits = match &query_vector {
            Some(vector) => self
                .knowledge
                .search(
                    agent.agent_id,
                    vector,
                    KNOWLEDGE_SEARCH_K,
                    KNOWLEDGE_MIN_SIMILARITY,
                    None,
                )
                .await
                .map_err(ApiError::from)?,
            None => Vec::new(),
        };
        if let Some(sub) = sub_agent {
            if !sub.rag_document_ids.is_empty() {
                rag_hits.retain(|hit| sub.rag_document_ids.contains(&hit.chunk.document_id));
            }
        }

        let allowed_tools = sub_agent
            .map(|s| s.allowed_tools.clone())
            .unwrap_or_else(|| agent_tool_list(&agent));
        let tool_descriptors = self
            .tools
            .resolve(&allowed_tools, turn.tenant_id)
            .map_err(ApiError::from)?;

        let history = self
            .conversations
            .recent_messages(turn.tenant_id, conversation_id, HISTORY_WINDOW)
            .await
            .map_err(ApiError::from)?;

        let prompt = assemble_prompt(
            sub_agent.map(|s| s.system_prompt.as_str()).unwrap_or(&agent.system_prompt),
            &memory_hits,
            &rag_hits,
            history,
            &turn.content,
        );
        debug!(
            conversation_id = %conversation_id,
            stage = "context_assembled",
            memory_hits = memory_hits.len(),
            rag_hits = rag_hits.len(),
            tools = tool_descriptors.len(),
            "Context assembled"
        );

        // ====================================================================
        // Generated: one LLM call, then sequential tool execution.
        // ====================================================================
        let request = ChatRequest {
            model: agent.model.clone(),
            messages: prompt,
            tools: tool_descriptors
                .iter()
                .map(|d| ToolSpec {
                    name: d.name.clone(),
                    description: d.description.clone(),
                    parameters: d.parameters.clone(),
                })
                .collect(),
            max_tokens: None,
            temperature: None,
        };

        let chat = self.chat.clone();
        let reply = tokio::time::timeout(
            LLM_TIMEOUT,
            retry_with_backoff("chat", || {
                let chat = chat.clone();
                let request = request.clone();
                async move { chat.complete(&request).await }
            }),
        )
        .await
        .map_err(|_| ApiError::timeout("Model call timed out"))?
        .map_err(|e| ApiError::new(ErrorKind::ModelError, format!("{}", e)))?;

        let mut tool_records = Vec::with_capacity(reply.tool_calls.len());
        for call in &reply.tool_calls {
            let record = match self.tools.get(&call.name) {
                Some(tool) => match tool.invoke(&call.arguments).await {
                    Ok(result) => ToolCallRecord {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                        result: Some(result),
                        error: None,
                    },
                    Err(e) => ToolCallRecord {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                        result: None,
                        error: Some(format!("{}", e)),
                    },
                },
                None => ToolCallRecord {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                    result: None,
                    error: Some("tool not registered".to_string()),
                },
            };
            tool_records.push(record);
        }
        debug!(conversation_id = %conversation_id, stage = "generated", "Reply generated");

        // ====================================================================
        // Persisted: one transaction for the whole turn.
        // ====================================================================
        let memory_debug: Vec<MemoryHit> = memory_hits
            .iter()
            .map(|hit| MemoryHit {
                chunk_id: hit.chunk.chunk_id,
                content: hit.chunk.content.clone(),
                similarity: hit.similarity,
            })
            .collect();

        let outbound_metadata = json!({
            "tool_calls": tool_records,
            "degraded": degraded,
            "memory": memory_debug,
            "sub_agent_id": selected,
        });

        let persisted = self
            .conversations
            .persist_turn(
                turn.tenant_id,
                TurnWrite {
                    conversation_id,
                    channel: turn.channel,
                    inbound_sender: MessageSender::Client,
                    inbound_content: turn.content.clone(),
                    outbound_content: reply.content.clone(),
                    outbound_metadata,
                },
            )
            .await
            .map_err(ApiError::from)?;
        debug!(conversation_id = %conversation_id, stage = "persisted", "Turn persisted");

        // The learning log rides outside the transaction; losing one log is
        // acceptable, losing the turn is not.
        let outcome = if degraded.is_empty() {
            TurnOutcome::Completed
        } else {
            TurnOutcome::Degraded
        };
        let log = InteractionLog::from_turn(
            agent.agent_id,
            conversation_id,
            &turn.content,
            &reply.content,
            tool_records.iter().map(|r| r.name.clone()).collect(),
            started.elapsed().as_millis() as i64,
            outcome,
        );
        if let Err(e) = self.learning.record(log).await {
            warn!(error = %e, "Failed to record interaction log");
        }

        // ====================================================================
        // Broadcast: best effort, never rolls back Persisted.
        // ====================================================================
        self.ws.broadcast(
            turn.tenant_id,
            WsFrame::now(WsEvent::NewMessage {
                conversation_id,
                message: persisted.outbound.clone(),
            }),
        );
        debug!(conversation_id = %conversation_id, stage = "done", "Turn complete");

        Ok(TurnReceipt {
            conversation_id,
            message_id: persisted.outbound.message_id,
            reply: reply.content,
            tool_calls: tool_records,
            degraded,
            memory_hits: memory_debug,
            replayed: false,
        })
    }

    /// Embed the query with timeout and backoff. `None` means semantic
    /// retrieval is skipped for this turn.
    async fn embed_query(&self, content: &str) -> Option<EmbeddingVector> {
        let embedder = self.embedder.clone();
        let text = content.to_string();
        let result = tokio::time::timeout(
            EMBEDDING_TIMEOUT,
            retry_with_backoff("embed", || {
                let embedder = embedder.clone();
                let text = text.clone();
                async move { embedder.embed(&text).await }
            }),
        )
        .await;

        match result {
            Ok(Ok(vector)) => Some(vector),
            Ok(Err(e)) => {
                warn!(error = %e, "Embedding unavailable, proceeding without memory");
                None
            }
            Err(_) => {
                warn!("Embedding timed out, proceeding without memory");
                None
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("locks", &self.locks.len())
            .finish()
    }
}

// ============================================================================
// PROMPT ASSEMBLY
// ============================================================================

fn agent_tool_list(agent: &Agent) -> Vec<String> {
    agent
        .config
        .as_ref()
        .and_then(|c| c.get("tools"))
        .and_then(|t| t.as_array())
        .map(|tools| {
            tools
                .iter()
                .filter_map(|t| t.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Build the prompt within the model budget.
///
/// Over budget, context drops in fixed order: oldest conversation turns
/// first, then lowest-scored memory chunks, then lowest-scored RAG chunks.
fn assemble_prompt(
    system_prompt: &str,
    memory_hits: &[ScoredChunk],
    rag_hits: &[renum_memory::ScoredKnowledgeChunk],
    mut history: Vec<Message>,
    content: &str,
) -> Vec<ChatMessage> {
    let mut memory: Vec<&ScoredChunk> = memory_hits.iter().collect();
    let mut rag: Vec<&renum_memory::ScoredKnowledgeChunk> = rag_hits.iter().collect();

    loop {
        let estimate = prompt_estimate(system_prompt, &memory, &rag, &history, content);
        if estimate <= MODEL_TOKEN_BUDGET {
            break;
        }
        if !history.is_empty() {
            history.remove(0);
            continue;
        }
        // Hits arrive ranked best-first, so popping trims the weakest.
        if memory.pop().is_some() {
            continue;
        }
        if rag.pop().is_some() {
            continue;
        }
        break;
    }

    let mut messages = vec![ChatMessage::system(system_prompt)];

    if !memory.is_empty() {
        let block: String = memory
            .iter()
            .map(|hit| format!("- {}", hit.chunk.content))
            .collect::<Vec<_>>()
            .join("\n");
        messages.push(ChatMessage::system(format!(
            "Relevant memory about this user:\n{}",
            block
        )));
    }

    if !rag.is_empty() {
        let block: String = rag
            .iter()
            .map(|hit| format!("- {}", hit.chunk.content))
            .collect::<Vec<_>>()
            .join("\n");
        messages.push(ChatMessage::system(format!(
            "Relevant knowledge base excerpts:\n{}",
            block
        )));
    }

    for message in &history {
        let chat_message = match message.sender {
            MessageSender::Client => ChatMessage::user(message.content.clone()),
            MessageSender::Admin | MessageSender::System => {
                ChatMessage::assistant(message.content.clone())
            }
        };
        messages.push(chat_message);
    }

    messages.push(ChatMessage::user(content));
    messages
}

fn prompt_estimate(
    system_prompt: &str,
    memory: &[&ScoredChunk],
    rag: &[&renum_memory::ScoredKnowledgeChunk],
    history: &[Message],
    content: &str,
) -> usize {
    let mut total = estimate_tokens(system_prompt) + estimate_tokens(content);
    for hit in memory {
        total += estimate_tokens(&hit.chunk.content);
    }
    for hit in rag {
        total += estimate_tokens(&hit.chunk.content);
    }
    for message in history {
        total += estimate_tokens(&message.content);
    }
    total
}

/// Timestamp helper for stores enforcing per-conversation monotonicity.
pub fn monotonic_after(previous: Timestamp) -> Timestamp {
    let now = chrono::Utc::now();
    if now > previous {
        now
    } else {
        previous + chrono::Duration::microseconds(1)
    }
}

// =============================================================================
// TESTS
// =============================================================================
