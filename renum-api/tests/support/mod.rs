//! Test support: in-memory conversation store and turn fixtures.

use async_trait::async_trait;
use chrono::Utc;
use renum_api::orchestrator::{monotonic_after, ConversationStore, PersistedTurn, TurnWrite};
use renum_core::{
    new_entity_id, Agent, AgentId, Channel, Conversation, ConversationId, ConversationStatus,
    EntityType, Message, MessageKind, MessageSender, RenumResult, StorageError, SubAgent,
    SubAgentId, TenantId,
};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    conversations: HashMap<ConversationId, Conversation>,
    messages: Vec<Message>,
    agents: HashMap<AgentId, Agent>,
    sub_agents: Vec<SubAgent>,
    idempotency: HashMap<(TenantId, String), serde_json::Value>,
}

/// In-memory `ConversationStore` with the same monotonic-timestamp rules as
/// the Postgres gateway.
#[derive(Default)]
pub struct InMemoryConversationStore {
    state: Mutex<Inner>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_agent(&self, tenant_id: Option<TenantId>, name: &str, prompt: &str) -> Agent {
        let agent = Agent {
            agent_id: new_entity_id(),
            tenant_id,
            name: name.to_string(),
            description: None,
            system_prompt: prompt.to_string(),
            model: "gpt-4o-mini".to_string(),
            category: None,
            visible: true,
            active: true,
            config: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.state
            .lock()
            .unwrap()
            .agents
            .insert(agent.agent_id, agent.clone());
        agent
    }

    pub fn add_sub_agent(&self, parent: AgentId, name: &str, keywords: &[&str]) -> SubAgent {
        let sub_agent = SubAgent {
            sub_agent_id: new_entity_id(),
            parent_agent_id: parent,
            name: name.to_string(),
            system_prompt: format!("You are {}.", name),
            allowed_tools: vec![],
            rag_document_ids: vec![],
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            created_at: Utc::now(),
        };
        self.state.lock().unwrap().sub_agents.push(sub_agent.clone());
        sub_agent
    }

    pub fn add_conversation(&self, tenant_id: TenantId, agent_id: AgentId) -> Conversation {
        let conversation = Conversation {
            conversation_id: new_entity_id(),
            tenant_id,
            agent_id,
            external_user: None,
            channel: Channel::Web,
            status: ConversationStatus::Active,
            priority: 0,
            tags: vec![],
            unread_count: 0,
            assigned_sub_agent_id: None,
            last_update: Utc::now(),
            created_at: Utc::now(),
        };
        self.state
            .lock()
            .unwrap()
            .conversations
            .insert(conversation.conversation_id, conversation.clone());
        conversation
    }

    pub fn messages_for(&self, conversation_id: ConversationId) -> Vec<Message> {
        let state = self.state.lock().unwrap();
        let mut messages: Vec<_> = state
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.message_id.cmp(&b.message_id)));
        messages
    }

    pub fn conversation(&self, conversation_id: ConversationId) -> Option<Conversation> {
        self.state
            .lock()
            .unwrap()
            .conversations
            .get(&conversation_id)
            .cloned()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn conversation_get(
        &self,
        tenant_id: TenantId,
        id: ConversationId,
    ) -> RenumResult<Option<Conversation>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .conversations
            .get(&id)
            .filter(|c| c.tenant_id == tenant_id)
            .cloned())
    }

    async fn conversation_create(
        &self,
        tenant_id: TenantId,
        agent_id: AgentId,
        channel: Channel,
    ) -> RenumResult<Conversation> {
        let conversation = Conversation {
            conversation_id: new_entity_id(),
            tenant_id,
            agent_id,
            external_user: None,
            channel,
            status: ConversationStatus::Active,
            priority: 0,
            tags: vec![],
            unread_count: 0,
            assigned_sub_agent_id: None,
            last_update: Utc::now(),
            created_at: Utc::now(),
        };
        self.state
            .lock()
            .unwrap()
            .conversations
            .insert(conversation.conversation_id, conversation.clone());
        Ok(conversation)
    }

    async fn recent_messages(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
        limit: usize,
    ) -> RenumResult<Vec<Message>> {
        let state = self.state.lock().unwrap();
        let owned = state
            .conversations
            .get(&conversation_id)
            .map(|c| c.tenant_id == tenant_id)
            .unwrap_or(false);
        if !owned {
            return Ok(Vec::new());
        }
        let mut messages: Vec<_> = state
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.into_iter().skip(skip).collect())
    }

    async fn agent_get(&self, tenant_id: TenantId, id: AgentId) -> RenumResult<Option<Agent>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .agents
            .get(&id)
            .filter(|a| a.tenant_id.is_none() || a.tenant_id == Some(tenant_id))
            .cloned())
    }

    async fn default_agent(&self, tenant_id: TenantId) -> RenumResult<Option<Agent>> {
        let state = self.state.lock().unwrap();
        let mut agents: Vec<_> = state
            .agents
            .values()
            .filter(|a| a.active && (a.tenant_id.is_none() || a.tenant_id == Some(tenant_id)))
            .cloned()
            .collect();
        agents.sort_by_key(|a| (a.tenant_id.is_none(), a.created_at));
        Ok(agents.into_iter().next())
    }

    async fn sub_agents(&self, agent_id: AgentId) -> RenumResult<Vec<SubAgent>> {
        let state = self.state.lock().unwrap();
        let mut subs: Vec<_> = state
            .sub_agents
            .iter()
            .filter(|s| s.parent_agent_id == agent_id)
            .cloned()
            .collect();
        subs.sort_by_key(|s| s.created_at);
        Ok(subs)
    }

    async fn assign_sub_agent(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
        sub_agent_id: Option<SubAgentId>,
    ) -> RenumResult<()> {
        let mut state = self.state.lock().unwrap();
        let conversation = state
            .conversations
            .get_mut(&conversation_id)
            .filter(|c| c.tenant_id == tenant_id)
            .ok_or(StorageError::NotFound {
                entity_type: EntityType::Conversation,
                id: conversation_id,
            })?;
        conversation.assigned_sub_agent_id = sub_agent_id;
        Ok(())
    }

    async fn persist_turn(
        &self,
        tenant_id: TenantId,
        write: TurnWrite,
    ) -> RenumResult<PersistedTurn> {
        let mut state = self.state.lock().unwrap();
        let conversation = state
            .conversations
            .get_mut(&write.conversation_id)
            .filter(|c| c.tenant_id == tenant_id)
            .ok_or(StorageError::NotFound {
                entity_type: EntityType::Conversation,
                id: write.conversation_id,
            })?;

        let inbound_at = monotonic_after(conversation.last_update);
        let outbound_at = monotonic_after(inbound_at);
        conversation.last_update = outbound_at;
        conversation.unread_count += 1;
        let conversation_id = conversation.conversation_id;

        let inbound = Message {
            message_id: new_entity_id(),
            conversation_id,
            sender: write.inbound_sender,
            kind: MessageKind::Text,
            content: write.inbound_content,
            metadata: None,
            read: true,
            channel: write.channel,
            created_at: inbound_at,
        };
        let outbound = Message {
            message_id: new_entity_id(),
            conversation_id,
            sender: MessageSender::System,
            kind: MessageKind::Text,
            content: write.outbound_content,
            metadata: Some(write.outbound_metadata),
            read: false,
            channel: write.channel,
            created_at: outbound_at,
        };

        let inbound_id = inbound.message_id;
        state.messages.push(inbound);
        state.messages.push(outbound.clone());

        Ok(PersistedTurn {
            inbound_id,
            outbound,
        })
    }

    async fn mark_read(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
    ) -> RenumResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(conversation) = state
            .conversations
            .get_mut(&conversation_id)
            .filter(|c| c.tenant_id == tenant_id)
        {
            conversation.unread_count = 0;
        }
        Ok(())
    }

    async fn idempotency_get(
        &self,
        tenant_id: TenantId,
        key: &str,
    ) -> RenumResult<Option<serde_json::Value>> {
        let state = self.state.lock().unwrap();
        Ok(state.idempotency.get(&(tenant_id, key.to_string())).cloned())
    }

    async fn idempotency_put(
        &self,
        tenant_id: TenantId,
        key: &str,
        receipt: &serde_json::Value,
    ) -> RenumResult<()> {
        let mut state = self.state.lock().unwrap();
        state
            .idempotency
            .entry((tenant_id, key.to_string()))
            .or_insert_with(|| receipt.clone());
        Ok(())
    }
}
