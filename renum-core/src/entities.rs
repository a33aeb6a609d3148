//! Core entity structures

use crate::{
    // ID types
    AgentId, ConversationId, CredentialId, DocumentId, InteractionLogId, KnowledgeChunkId,
    MemoryChunkId, MessageId, PatternId, SnapshotId, SubAgentId, TenantId, UserId,
    // Other types
    Channel, ConversationStatus, DocumentStatus, EmbeddingVector, MemoryType, MessageKind,
    MessageSender, PatternType, Timestamp, TurnOutcome, UserRole, ValidationError,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tenant - the owning organization for all non-system data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Tenant {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub tenant_id: TenantId,
    pub name: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub metadata: Option<serde_json::Value>,
}

/// User profile - an authenticated human with a role.
/// `tenant_id` is required for every role except `admin`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UserProfile {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub user_id: UserId,
    pub email: String,
    pub display_name: Option<String>,
    pub role: UserRole,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub tenant_id: Option<TenantId>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

impl UserProfile {
    /// Check the role/tenant binding invariant.
    pub fn is_well_formed(&self) -> bool {
        self.role == UserRole::Admin || self.tenant_id.is_some()
    }
}

/// Agent - a top-level conversational persona.
/// `tenant_id = None` is reserved for platform agents (Renus, ISA).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Agent {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub agent_id: AgentId,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub tenant_id: Option<TenantId>,
    pub name: String,
    pub description: Option<String>,
    pub system_prompt: String,
    pub model: String,
    pub category: Option<String>,
    pub visible: bool,
    pub active: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub config: Option<serde_json::Value>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

impl Agent {
    /// Whether this is a platform agent (owned by no tenant).
    pub fn is_system(&self) -> bool {
        self.tenant_id.is_none()
    }
}

/// Sub-agent - specialized child persona of an Agent.
/// Every sub-agent has exactly one parent; deleting the parent deletes the
/// children (enforced by the schema with ON DELETE CASCADE).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SubAgent {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub sub_agent_id: SubAgentId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub parent_agent_id: AgentId,
    pub name: String,
    pub system_prompt: String,
    /// Tool names this sub-agent may invoke; resolved against the registry.
    pub allowed_tools: Vec<String>,
    /// Knowledge documents scoping this sub-agent's RAG retrieval.
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<String>))]
    pub rag_document_ids: Vec<DocumentId>,
    /// Routing keywords; empty means "fall back to name tokens".
    pub keywords: Vec<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

/// Conversation - a dialog between an end user and an Agent on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Conversation {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub conversation_id: ConversationId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub tenant_id: TenantId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub agent_id: AgentId,
    /// External identity of the end user (phone, email, web session).
    pub external_user: Option<String>,
    pub channel: Channel,
    pub status: ConversationStatus,
    pub priority: i32,
    pub tags: Vec<String>,
    pub unread_count: i32,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub assigned_sub_agent_id: Option<SubAgentId>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub last_update: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

/// Message - one immutable turn half in a conversation.
/// Timestamps are monotonic non-decreasing per conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Message {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub message_id: MessageId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub conversation_id: ConversationId,
    pub sender: MessageSender,
    pub kind: MessageKind,
    pub content: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub metadata: Option<serde_json::Value>,
    pub read: bool,
    pub channel: Channel,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

/// Validate message content against its kind.
///
/// Text messages require non-empty content. Image and file messages may have
/// empty content only when the metadata carries a `url` field.
pub fn validate_message_content(
    kind: MessageKind,
    content: &str,
    metadata: Option<&serde_json::Value>,
) -> Result<(), ValidationError> {
    if !content.trim().is_empty() {
        return Ok(());
    }
    match kind {
        MessageKind::Text => Err(ValidationError::RequiredFieldMissing {
            field: "content".to_string(),
        }),
        MessageKind::Image | MessageKind::File => {
            let has_url = metadata
                .and_then(|m| m.get("url"))
                .and_then(|u| u.as_str())
                .map(|u| !u.is_empty())
                .unwrap_or(false);
            if has_url {
                Ok(())
            } else {
                Err(ValidationError::InvalidValue {
                    field: "content".to_string(),
                    reason: "empty content requires a metadata url".to_string(),
                })
            }
        }
    }
}

/// Memory chunk - a vector-embedded, scored, versioned fact persisted per
/// agent. Append-only; `version` increments only on explicit supersession.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MemoryChunk {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub chunk_id: MemoryChunkId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub agent_id: AgentId,
    pub content: String,
    pub memory_type: MemoryType,
    pub embedding: EmbeddingVector,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub metadata: Option<serde_json::Value>,
    pub source: Option<String>,
    /// Confidence in [0, 1].
    pub confidence: f32,
    /// Importance in [0, 1].
    pub importance: f32,
    pub version: i32,
    /// Set when a newer version replaces this chunk. The row is retained for
    /// audit; retrieval skips superseded chunks.
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub superseded_by: Option<MemoryChunkId>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

impl MemoryChunk {
    /// Consolidation ranking: `0.6 * importance + 0.4 * confidence`.
    pub fn consolidation_score(&self) -> f32 {
        0.6 * self.importance + 0.4 * self.confidence
    }
}

/// Knowledge document - a per-agent ingested document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct KnowledgeDocument {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub document_id: DocumentId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub agent_id: AgentId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub tenant_id: TenantId,
    pub title: String,
    pub status: DocumentStatus,
    /// Number of successfully embedded chunks; 0 until `ready`.
    pub chunk_count: i32,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

/// Knowledge chunk - a vector-embedded segment of an ingested document.
/// Distinct from `MemoryChunk` by design; the two stores never share a
/// retrieval path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct KnowledgeChunk {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub chunk_id: KnowledgeChunkId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub document_id: DocumentId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub agent_id: AgentId,
    pub content: String,
    pub embedding: EmbeddingVector,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub metadata: Option<serde_json::Value>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

/// Behavior pattern - aggregate derived from interaction logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BehaviorPattern {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub pattern_id: PatternId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub agent_id: AgentId,
    pub pattern_type: PatternType,
    /// The extracted signal this pattern aggregates.
    pub signal: String,
    pub frequency: i64,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub first_seen: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub last_seen: Timestamp,
}

/// Knowledge snapshot - periodic consolidation of an agent's best-rated
/// memory chunks into one retrievable summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct KnowledgeSnapshot {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub snapshot_id: SnapshotId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub agent_id: AgentId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub window_start: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub window_end: Timestamp,
    pub summary: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<String>))]
    pub chunk_ids: Vec<MemoryChunkId>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

/// Integration credential - encrypted third-party secret bound to
/// `(tenant, integration)`. Ciphertext includes the GCM tag; the nonce is
/// stored alongside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct IntegrationCredential {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub credential_id: CredentialId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub tenant_id: TenantId,
    pub integration: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "byte"))]
    pub ciphertext: Vec<u8>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "byte"))]
    pub nonce: Vec<u8>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

/// Interaction log - one completed turn, as recorded by the learning logger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct InteractionLog {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub log_id: InteractionLogId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub agent_id: AgentId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub conversation_id: ConversationId,
    pub user_excerpt: String,
    pub agent_excerpt: String,
    pub tool_calls: Vec<String>,
    pub latency_ms: i64,
    pub outcome: TurnOutcome,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

impl InteractionLog {
    /// Build a log row from turn data, truncating excerpts to a sane length.
    pub fn from_turn(
        agent_id: AgentId,
        conversation_id: ConversationId,
        user_message: &str,
        agent_reply: &str,
        tool_calls: Vec<String>,
        latency_ms: i64,
        outcome: TurnOutcome,
    ) -> Self {
        Self {
            log_id: crate::new_entity_id(),
            agent_id,
            conversation_id,
            user_excerpt: truncate_excerpt(user_message, 280),
            agent_excerpt: truncate_excerpt(agent_reply, 280),
            tool_calls,
            latency_ms,
            outcome,
            created_at: Utc::now(),
        }
    }
}

fn truncate_excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max_chars).collect();
        out.push('…');
        out
    }
}

/// Reference to an entity by type and ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EntityRef {
    pub entity_type: crate::EntityType,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: Uuid,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_profile_tenant_binding() {
        let admin = UserProfile {
            user_id: crate::new_entity_id(),
            email: "ops@renum.app".to_string(),
            display_name: None,
            role: UserRole::Admin,
            tenant_id: None,
            created_at: Utc::now(),
        };
        assert!(admin.is_well_formed());

        let unbound_client = UserProfile {
            role: UserRole::Client,
            ..admin.clone()
        };
        assert!(!unbound_client.is_well_formed());
    }

    #[test]
    fn test_system_agent_has_no_tenant() {
        let agent = Agent {
            agent_id: crate::new_entity_id(),
            tenant_id: None,
            name: "Renus".to_string(),
            description: None,
            system_prompt: "You are Renus.".to_string(),
            model: "gpt-4o".to_string(),
            category: None,
            visible: true,
            active: true,
            config: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(agent.is_system());
    }

    #[test]
    fn test_validate_text_message_requires_content() {
        let err = validate_message_content(MessageKind::Text, "  ", None).unwrap_err();
        assert!(matches!(err, ValidationError::RequiredFieldMissing { .. }));

        assert!(validate_message_content(MessageKind::Text, "hello", None).is_ok());
    }

    #[test]
    fn test_validate_image_message_with_url_metadata() {
        let metadata = json!({ "url": "https://cdn.renum.app/img.png" });
        assert!(validate_message_content(MessageKind::Image, "", Some(&metadata)).is_ok());
    }

    #[test]
    fn test_validate_image_message_without_url_fails() {
        let err = validate_message_content(MessageKind::Image, "", None).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidValue { .. }));

        let metadata = json!({ "url": "" });
        assert!(validate_message_content(MessageKind::Image, "", Some(&metadata)).is_err());
    }

    #[test]
    fn test_consolidation_score_weights() {
        let chunk = MemoryChunk {
            chunk_id: crate::new_entity_id(),
            agent_id: crate::new_entity_id(),
            content: "customer prefers email follow-up".to_string(),
            memory_type: MemoryType::Preference,
            embedding: EmbeddingVector::new(vec![0.0; 4], "m".to_string()),
            metadata: None,
            source: None,
            confidence: 0.5,
            importance: 1.0,
            version: 1,
            superseded_by: None,
            created_at: Utc::now(),
        };
        assert!((chunk.consolidation_score() - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_interaction_log_truncates_excerpts() {
        let long = "x".repeat(500);
        let log = InteractionLog::from_turn(
            crate::new_entity_id(),
            crate::new_entity_id(),
            &long,
            "short reply",
            vec![],
            12,
            TurnOutcome::Completed,
        );
        assert_eq!(log.user_excerpt.chars().count(), 281); // 280 + ellipsis
        assert_eq!(log.agent_excerpt, "short reply");
    }
}
