//! Renum Core - Domain Types
//!
//! Pure data types for the Renum agent orchestration backend: identifiers,
//! entities, enumerations, error families, and embedding vector math.
//! No I/O happens in this crate; storage and transport live downstream.

pub mod config;
pub mod embedding;
pub mod entities;
pub mod enums;
pub mod error;
pub mod identity;

pub use config::*;
pub use embedding::EmbeddingVector;
pub use entities::{
    validate_message_content, Agent, BehaviorPattern, Conversation, EntityRef,
    IntegrationCredential, InteractionLog, KnowledgeChunk, KnowledgeDocument, KnowledgeSnapshot,
    MemoryChunk, Message, SubAgent, Tenant, UserProfile,
};
pub use enums::{
    Channel, ConversationStatus, DocumentStatus, EntityType, EnumParseError, MemoryType,
    MessageKind, MessageSender, PatternType, TurnOutcome, UserRole,
};
pub use error::{
    ConfigError, LlmError, RenumError, RenumResult, StorageError, ToolError, ValidationError,
    VaultError, VectorError,
};
pub use identity::{
    compute_content_hash, new_entity_id, AgentId, ContentHash, ConversationId, CredentialId,
    DocumentId, DurationMs, EntityId, InteractionLogId, KnowledgeChunkId, MemoryChunkId,
    MessageId, PatternId, SnapshotId, SubAgentId, TenantId, Timestamp, UserId,
};
