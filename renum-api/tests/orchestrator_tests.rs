//! End-to-end orchestrator tests over in-memory stores and mock providers.

mod support;

use renum_api::orchestrator::{InboundTurn, Orchestrator};
use renum_api::{ErrorKind, WsState};
use renum_agents::ToolRegistry;
use renum_core::{new_entity_id, Channel, EMBEDDING_DIMENSIONS};
use renum_llm::mock::{MockChat, MockEmbedding};
use renum_llm::{EmbeddingProvider, ToolCall};
use renum_memory::{
    InMemoryKnowledgeIndex, InMemoryLearningStore, InMemoryMemoryStore, MemoryStore,
    NewMemoryChunk,
};
use std::sync::Arc;
use support::InMemoryConversationStore;

const DIMS: i32 = EMBEDDING_DIMENSIONS;

struct Fixture {
    store: Arc<InMemoryConversationStore>,
    memory: Arc<InMemoryMemoryStore>,
    embedder: Arc<MockEmbedding>,
    chat: Arc<MockChat>,
    ws: Arc<WsState>,
    orchestrator: Arc<Orchestrator>,
}

fn fixture_with_chat(chat: MockChat) -> Fixture {
    let store = Arc::new(InMemoryConversationStore::new());
    let memory = Arc::new(InMemoryMemoryStore::new(DIMS));
    let knowledge = Arc::new(InMemoryKnowledgeIndex::new(DIMS));
    let learning = Arc::new(InMemoryLearningStore::new());
    let embedder = Arc::new(MockEmbedding::new(DIMS));
    let chat = Arc::new(chat);
    let ws = Arc::new(WsState::new(64));

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        memory.clone(),
        knowledge,
        learning,
        Arc::new(ToolRegistry::with_defaults()),
        embedder.clone(),
        chat.clone(),
        ws.clone(),
    ));

    Fixture {
        store,
        memory,
        embedder,
        chat,
        ws,
        orchestrator,
    }
}

fn fixture() -> Fixture {
    fixture_with_chat(MockChat::with_reply(
        "We will reach you by email, as you prefer.",
    ))
}

fn turn(
    tenant: renum_core::TenantId,
    conversation: Option<renum_core::ConversationId>,
    content: &str,
) -> InboundTurn {
    InboundTurn {
        tenant_id: tenant,
        user_id: new_entity_id(),
        conversation_id: conversation,
        agent_id: None,
        content: content.to_string(),
        channel: Channel::Web,
        idempotency_key: None,
        admin_override: None,
    }
}

fn unit_vector(axis: usize) -> Vec<f32> {
    let mut data = vec![0.0f32; DIMS as usize];
    data[axis] = 1.0;
    data
}

// ============================================================================
// HAPPY PATH
// ============================================================================

#[tokio::test]
async fn happy_path_turn_retrieves_memory_and_replies() {
    let fx = fixture();
    let tenant = new_entity_id();
    let agent = fx.store.add_agent(Some(tenant), "Renus", "You are Renus.");

    // Pin query and memory onto the same axis so the neighbor clears 0.7.
    let query = "how do you contact me?";
    let memory_fact = "customer prefers email follow-up";
    fx.embedder.pin(query, unit_vector(0));
    fx.embedder.pin(memory_fact, unit_vector(0));

    let mut chunk = NewMemoryChunk::text(
        memory_fact,
        fx.embedder.embed(memory_fact).await.unwrap(),
    );
    chunk.importance = 0.9;
    fx.memory.append(agent.agent_id, chunk).await.unwrap();

    let receipt = Orchestrator::dispatch(fx.orchestrator.clone(), turn(tenant, None, query))
        .await
        .unwrap();

    assert!(receipt.reply.contains("email"));
    assert_eq!(receipt.memory_hits.len(), 1);
    assert_eq!(receipt.memory_hits[0].content, memory_fact);
    assert!(receipt.degraded.is_empty());
    assert!(!receipt.replayed);

    // Exactly one outbound message per persisted turn.
    let messages = fx.store.messages_for(receipt.conversation_id);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].message_id, receipt.message_id);
    let metadata = messages[1].metadata.as_ref().unwrap();
    assert_eq!(metadata["memory"][0]["content"], memory_fact);
}

#[tokio::test]
async fn turn_broadcasts_new_message_to_tenant() {
    let fx = fixture();
    let tenant = new_entity_id();
    fx.store.add_agent(Some(tenant), "Renus", "You are Renus.");

    let mut rx = fx.ws.subscribe();
    let receipt = Orchestrator::dispatch(fx.orchestrator.clone(), turn(tenant, None, "oi"))
        .await
        .unwrap();

    let envelope = rx.try_recv().expect("broadcast expected");
    assert_eq!(envelope.tenant_id, tenant);
    assert_eq!(envelope.frame.event.event_type(), "NEW_MESSAGE");
    let json = serde_json::to_value(&envelope.frame).unwrap();
    assert_eq!(
        json["payload"]["message"]["message_id"],
        receipt.message_id.to_string()
    );
}

// ============================================================================
// CONCURRENCY SERIALIZATION
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_dispatches_serialize_per_conversation() {
    let fx = fixture();
    let tenant = new_entity_id();
    let agent = fx.store.add_agent(Some(tenant), "Renus", "You are Renus.");
    let conversation = fx.store.add_conversation(tenant, agent.agent_id);

    let (a, b, c) = tokio::join!(
        Orchestrator::dispatch(
            fx.orchestrator.clone(),
            turn(tenant, Some(conversation.conversation_id), "first"),
        ),
        Orchestrator::dispatch(
            fx.orchestrator.clone(),
            turn(tenant, Some(conversation.conversation_id), "second"),
        ),
        Orchestrator::dispatch(
            fx.orchestrator.clone(),
            turn(tenant, Some(conversation.conversation_id), "third"),
        ),
    );
    let receipts = [a.unwrap(), b.unwrap(), c.unwrap()];

    let messages = fx.store.messages_for(conversation.conversation_id);
    assert_eq!(messages.len(), 6);

    // Strictly increasing timestamps: turns never interleave.
    for pair in messages.windows(2) {
        assert!(pair[0].created_at < pair[1].created_at);
    }

    // Each turn produced a distinct outbound message.
    let mut ids: Vec<_> = receipts.iter().map(|r| r.message_id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);

    // Inbound/outbound strictly alternate: no interleaved tool sequences.
    for (index, message) in messages.iter().enumerate() {
        let expect_inbound = index % 2 == 0;
        assert_eq!(
            message.sender == renum_core::MessageSender::Client,
            expect_inbound
        );
    }
}

// ============================================================================
// EMBEDDING OUTAGE
// ============================================================================

#[tokio::test]
async fn embedding_outage_degrades_but_completes() {
    let fx = fixture();
    let tenant = new_entity_id();
    fx.store.add_agent(Some(tenant), "Renus", "You are Renus.");
    fx.embedder.set_failing(true);

    let receipt = Orchestrator::dispatch(
        fx.orchestrator.clone(),
        turn(tenant, None, "how do you contact me?"),
    )
    .await
    .unwrap();

    assert_eq!(receipt.degraded, vec!["memory".to_string()]);
    assert!(receipt.memory_hits.is_empty());
    assert!(!receipt.reply.is_empty());

    let messages = fx.store.messages_for(receipt.conversation_id);
    assert_eq!(messages.len(), 2);
    let metadata = messages[1].metadata.as_ref().unwrap();
    assert_eq!(metadata["degraded"][0], "memory");
}

// ============================================================================
// MODEL FAILURE
// ============================================================================

#[tokio::test]
async fn model_failure_fails_turn_without_persisting() {
    let fx = fixture();
    let tenant = new_entity_id();
    let agent = fx.store.add_agent(Some(tenant), "Renus", "You are Renus.");
    let conversation = fx.store.add_conversation(tenant, agent.agent_id);
    fx.chat.set_failing(true);

    let err = Orchestrator::dispatch(
        fx.orchestrator.clone(),
        turn(tenant, Some(conversation.conversation_id), "hello"),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind, ErrorKind::ModelError);
    assert!(fx.store.messages_for(conversation.conversation_id).is_empty());

    // Retried twice before giving up.
    assert_eq!(fx.chat.recorded_requests().len(), 3);
}

// ============================================================================
// IDEMPOTENT REPLAY
// ============================================================================

#[tokio::test]
async fn idempotency_key_replays_first_receipt() {
    let fx = fixture();
    let tenant = new_entity_id();
    let agent = fx.store.add_agent(Some(tenant), "Renus", "You are Renus.");
    let conversation = fx.store.add_conversation(tenant, agent.agent_id);

    let mut first_turn = turn(tenant, Some(conversation.conversation_id), "hello");
    first_turn.idempotency_key = Some("turn-abc".to_string());
    let first = Orchestrator::dispatch(fx.orchestrator.clone(), first_turn.clone())
        .await
        .unwrap();

    let second = Orchestrator::dispatch(fx.orchestrator.clone(), first_turn)
        .await
        .unwrap();

    assert_eq!(second.message_id, first.message_id);
    assert!(second.replayed);
    assert!(!first.replayed);

    // Only one stored turn.
    assert_eq!(fx.store.messages_for(conversation.conversation_id).len(), 2);
}

// ============================================================================
// TENANT ISOLATION
// ============================================================================

#[tokio::test]
async fn cross_tenant_conversation_is_not_found() {
    let fx = fixture();
    let tenant_a = new_entity_id();
    let tenant_b = new_entity_id();
    let agent_b = fx.store.add_agent(Some(tenant_b), "Renus", "You are Renus.");
    let conversation_b = fx.store.add_conversation(tenant_b, agent_b.agent_id);
    fx.store.add_agent(Some(tenant_a), "Renus", "You are Renus.");

    let err = Orchestrator::dispatch(
        fx.orchestrator.clone(),
        turn(tenant_a, Some(conversation_b.conversation_id), "peek"),
    )
    .await
    .unwrap_err();

    assert_eq!(err.kind, ErrorKind::NotFound);
    assert!(fx.store.messages_for(conversation_b.conversation_id).is_empty());
}

// ============================================================================
// TOOL EXECUTION
// ============================================================================

#[tokio::test]
async fn tool_calls_execute_sequentially_and_errors_are_captured() {
    let chat = MockChat::with_script(vec![MockChat::reply_with_tools(
        "The result is 42.",
        vec![
            ToolCall {
                name: "calculator".to_string(),
                arguments: serde_json::json!({"a": 6, "b": 7, "op": "mul"}),
            },
            ToolCall {
                name: "calculator".to_string(),
                arguments: serde_json::json!({"a": 1, "b": 0, "op": "div"}),
            },
        ],
    )]);
    let fx = fixture_with_chat(chat);
    let tenant = new_entity_id();
    fx.store.add_agent(Some(tenant), "Renus", "You are Renus.");

    let receipt = Orchestrator::dispatch(fx.orchestrator.clone(), turn(tenant, None, "6 times 7?"))
        .await
        .unwrap();

    assert_eq!(receipt.tool_calls.len(), 2);
    assert_eq!(receipt.tool_calls[0].result.as_ref().unwrap()["result"], 42.0);
    assert!(receipt.tool_calls[0].error.is_none());
    // The failing call is captured, not raised.
    assert!(receipt.tool_calls[1].result.is_none());
    assert!(receipt.tool_calls[1]
        .error
        .as_ref()
        .unwrap()
        .contains("division by zero"));
    assert_eq!(receipt.reply, "The result is 42.");
}

// ============================================================================
// SUB-AGENT ROUTING
// ============================================================================

#[tokio::test]
async fn routing_assigns_and_keeps_sub_agent() {
    let fx = fixture();
    let tenant = new_entity_id();
    let agent = fx.store.add_agent(Some(tenant), "Renus", "You are Renus.");
    let billing = fx
        .store
        .add_sub_agent(agent.agent_id, "Billing", &["fatura", "boleto"]);
    fx.store.add_sub_agent(agent.agent_id, "Support", &["erro", "bug"]);
    let conversation = fx.store.add_conversation(tenant, agent.agent_id);

    Orchestrator::dispatch(
        fx.orchestrator.clone(),
        turn(
            tenant,
            Some(conversation.conversation_id),
            "não recebi o boleto",
        ),
    )
    .await
    .unwrap();

    let assigned = fx
        .store
        .conversation(conversation.conversation_id)
        .unwrap()
        .assigned_sub_agent_id;
    assert_eq!(assigned, Some(billing.sub_agent_id));

    // A neutral follow-up sticks with the assigned sub-agent.
    Orchestrator::dispatch(
        fx.orchestrator.clone(),
        turn(tenant, Some(conversation.conversation_id), "ok, thanks"),
    )
    .await
    .unwrap();
    let still = fx
        .store
        .conversation(conversation.conversation_id)
        .unwrap()
        .assigned_sub_agent_id;
    assert_eq!(still, Some(billing.sub_agent_id));
}

// ============================================================================
// VALIDATION
// ============================================================================

#[tokio::test]
async fn empty_content_is_rejected() {
    let fx = fixture();
    let tenant = new_entity_id();
    fx.store.add_agent(Some(tenant), "Renus", "You are Renus.");

    let err = Orchestrator::dispatch(fx.orchestrator.clone(), turn(tenant, None, "   "))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
}
