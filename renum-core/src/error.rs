//! Error types for Renum operations

use crate::EntityType;
use thiserror::Error;
use uuid::Uuid;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity_type:?} with id {id}")]
    NotFound { entity_type: EntityType, id: Uuid },

    #[error("Insert failed for {entity_type:?}: {reason}")]
    InsertFailed { entity_type: EntityType, reason: String },

    #[error("Update failed for {entity_type:?} with id {id}: {reason}")]
    UpdateFailed {
        entity_type: EntityType,
        id: Uuid,
        reason: String,
    },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Integrity violation: {reason}")]
    Integrity { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// LLM and embedding provider errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("No LLM provider configured")]
    ProviderNotConfigured,

    #[error("Embedding unavailable: {reason}")]
    EmbeddingUnavailable { reason: String },

    #[error("Model request to {provider} failed with status {status}: {message}")]
    ModelError {
        provider: String,
        status: i32,
        message: String,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: i64,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

impl LlmError {
    /// Whether the orchestrator may retry the failed call.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingUnavailable { .. } | Self::ModelError { .. } | Self::RateLimited { .. }
        )
    }
}

/// Credential vault errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VaultError {
    #[error("Encryption key missing")]
    MissingKey,

    #[error("Encryption key invalid: {reason}")]
    InvalidKey { reason: String },

    #[error("Ciphertext invalid or key mismatch")]
    InvalidCiphertext,
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Model not recognized: {model}")]
    UnknownModel { model: String },

    #[error("Referenced document does not exist: {document_id}")]
    MissingDocument { document_id: Uuid },
}

/// Tool registry and execution errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Tool {name} failed: {reason}")]
    ExecutionFailed { name: String, reason: String },
}

/// Vector operation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VectorError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: i32, got: i32 },

    #[error("Invalid vector: {reason}")]
    InvalidVector { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Renum errors.
#[derive(Debug, Clone, Error)]
pub enum RenumError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Renum operations.
pub type RenumResult<T> = Result<T, RenumError>;

// =============================================================================
// TESTS
// =============================================================================
