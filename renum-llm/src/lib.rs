//! Renum LLM - Provider Abstraction Layer
//!
//! Provider-agnostic traits for embeddings and chat completion.
//! This crate defines the interfaces the orchestrator drives; the OpenAI
//! implementation lives under `providers`, and deterministic mocks for
//! tests under `mock`.

pub mod mock;
pub mod providers;
pub mod retry;

use async_trait::async_trait;
use renum_core::{EmbeddingVector, LlmError, RenumError, RenumResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use providers::openai::{OpenAiChatProvider, OpenAiClient, OpenAiEmbeddingProvider};
pub use retry::retry_with_backoff;

// ============================================================================
// EMBEDDING PROVIDER TRAIT
// ============================================================================

/// Trait for embedding providers.
/// Implementations must be thread-safe (Send + Sync) and deterministic for
/// equal inputs within a process lifetime.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> RenumResult<EmbeddingVector>;

    /// Generate embeddings for multiple texts in a batch.
    /// More efficient than calling embed() multiple times.
    async fn embed_batch(&self, texts: &[&str]) -> RenumResult<Vec<EmbeddingVector>>;

    /// Get the number of dimensions this provider produces.
    fn dimensions(&self) -> i32;

    /// Get the model identifier for this provider.
    fn model_id(&self) -> &str;
}

// ============================================================================
// CHAT PROVIDER TRAIT
// ============================================================================

/// Role of a chat message in a completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One message in a completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Declarative description of a tool offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema of the tool parameters.
    pub parameters: serde_json::Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// A completion request: system prompt, history, and offered tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
    pub max_tokens: Option<i32>,
    pub temperature: Option<f32>,
}

/// A completion reply: text plus any tool invocations the model requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub input_tokens: i64,
    pub output_tokens: i64,
}

/// Trait for chat completion providers.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Run one completion.
    async fn complete(&self, request: &ChatRequest) -> RenumResult<ChatReply>;

    /// Default model identifier for this provider.
    fn model_id(&self) -> &str;
}

// ============================================================================
// PROVIDER REGISTRY
// ============================================================================

/// Registry for LLM providers.
/// Providers must be explicitly registered - no auto-discovery.
pub struct ProviderRegistry {
    embedding: Option<Arc<dyn EmbeddingProvider>>,
    chat: Option<Arc<dyn ChatProvider>>,
}

impl ProviderRegistry {
    /// Create a new empty provider registry.
    pub fn new() -> Self {
        Self {
            embedding: None,
            chat: None,
        }
    }

    /// Register an embedding provider.
    /// Replaces any previously registered embedding provider.
    pub fn register_embedding(&mut self, provider: Arc<dyn EmbeddingProvider>) {
        self.embedding = Some(provider);
    }

    /// Register a chat provider.
    /// Replaces any previously registered chat provider.
    pub fn register_chat(&mut self, provider: Arc<dyn ChatProvider>) {
        self.chat = Some(provider);
    }

    /// Get the registered embedding provider.
    pub fn embedding(&self) -> RenumResult<Arc<dyn EmbeddingProvider>> {
        self.embedding
            .clone()
            .ok_or(RenumError::Llm(LlmError::ProviderNotConfigured))
    }

    /// Get the registered chat provider.
    pub fn chat(&self) -> RenumResult<Arc<dyn ChatProvider>> {
        self.chat
            .clone()
            .ok_or(RenumError::Llm(LlmError::ProviderNotConfigured))
    }

    /// Check if an embedding provider is registered.
    pub fn has_embedding(&self) -> bool {
        self.embedding.is_some()
    }

    /// Check if a chat provider is registered.
    pub fn has_chat(&self) -> bool {
        self.chat.is_some()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("embedding", &self.embedding.is_some())
            .field("chat", &self.chat.is_some())
            .finish()
    }
}

// ============================================================================
// TOKEN ESTIMATION
// ============================================================================

/// Rough token count for budget trimming: one token per ~4 characters.
/// Good enough for prompt-budget decisions; exact counts come back from the
/// provider with each reply.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockChat, MockEmbedding};

    #[test]
    fn test_registry_empty_by_default() {
        let registry = ProviderRegistry::new();
        assert!(!registry.has_embedding());
        assert!(!registry.has_chat());
        assert!(matches!(
            registry.embedding().err().unwrap(),
            RenumError::Llm(LlmError::ProviderNotConfigured)
        ));
    }

    #[test]
    fn test_registry_register_and_get() {
        let mut registry = ProviderRegistry::new();
        registry.register_embedding(Arc::new(MockEmbedding::new(384)));
        registry.register_chat(Arc::new(MockChat::with_reply("ok")));
        assert!(registry.has_embedding());
        assert!(registry.has_chat());
        assert_eq!(registry.embedding().unwrap().dimensions(), 384);
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(&"x".repeat(400)), 100);
    }

    #[test]
    fn test_chat_message_constructors() {
        assert_eq!(ChatMessage::system("s").role, ChatRole::System);
        assert_eq!(ChatMessage::user("u").role, ChatRole::User);
        assert_eq!(ChatMessage::assistant("a").role, ChatRole::Assistant);
    }
}
