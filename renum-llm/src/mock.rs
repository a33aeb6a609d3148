//! Deterministic providers for tests
//!
//! `MockEmbedding` hashes token bags into a fixed-dimension vector, so equal
//! inputs always embed identically and texts sharing words land near each
//! other. Tests that need exact neighborhoods can pin vectors per text.
//! `MockChat` replays scripted replies and records every request it sees.

use crate::{ChatProvider, ChatReply, ChatRequest, EmbeddingProvider, ToolCall};
use async_trait::async_trait;
use renum_core::{EmbeddingVector, LlmError, RenumError, RenumResult};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

// ============================================================================
// MOCK EMBEDDING
// ============================================================================

/// Deterministic embedding provider for tests.
pub struct MockEmbedding {
    dimensions: i32,
    pinned: Mutex<HashMap<String, Vec<f32>>>,
    fail: AtomicBool,
}

impl MockEmbedding {
    /// Create a mock producing vectors of the given dimension.
    pub fn new(dimensions: i32) -> Self {
        Self {
            dimensions,
            pinned: Mutex::new(HashMap::new()),
            fail: AtomicBool::new(false),
        }
    }

    /// Pin an exact vector for a text. Panics if the dimension is wrong;
    /// that is a test bug, not a runtime condition.
    pub fn pin(&self, text: impl Into<String>, vector: Vec<f32>) {
        assert_eq!(vector.len() as i32, self.dimensions, "pinned vector dimension");
        self.pinned.lock().unwrap().insert(text.into(), vector);
    }

    /// Toggle simulated outage: when set, every call returns
    /// `EmbeddingUnavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    fn embed_sync(&self, text: &str) -> RenumResult<EmbeddingVector> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RenumError::Llm(LlmError::EmbeddingUnavailable {
                reason: "mock outage".to_string(),
            }));
        }

        if let Some(pinned) = self.pinned.lock().unwrap().get(text) {
            return Ok(EmbeddingVector::new(pinned.clone(), "mock".to_string()));
        }

        // Bag-of-words hashing: each lowercase token bumps one bucket.
        let dims = self.dimensions as usize;
        let mut data = vec![0.0f32; dims];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize;
            data[bucket % dims] += 1.0;
        }
        Ok(EmbeddingVector::new(data, "mock".to_string()))
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedding {
    async fn embed(&self, text: &str) -> RenumResult<EmbeddingVector> {
        self.embed_sync(text)
    }

    async fn embed_batch(&self, texts: &[&str]) -> RenumResult<Vec<EmbeddingVector>> {
        texts.iter().map(|t| self.embed_sync(t)).collect()
    }

    fn dimensions(&self) -> i32 {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        "mock"
    }
}

impl std::fmt::Debug for MockEmbedding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEmbedding")
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

// ============================================================================
// MOCK CHAT
// ============================================================================

/// Scripted chat provider for tests.
///
/// Replies are consumed in order; the last one repeats once the script runs
/// dry. Every request is recorded for assertions.
pub struct MockChat {
    script: Mutex<Vec<ChatReply>>,
    requests: Mutex<Vec<ChatRequest>>,
    fail: AtomicBool,
}

impl MockChat {
    /// Create a mock that always answers with the given text.
    pub fn with_reply(content: impl Into<String>) -> Self {
        Self::with_script(vec![ChatReply {
            content: content.into(),
            tool_calls: vec![],
            input_tokens: 0,
            output_tokens: 0,
        }])
    }

    /// Create a mock replaying the given replies in order.
    pub fn with_script(script: Vec<ChatReply>) -> Self {
        Self {
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    /// Create a reply that requests tool invocations before answering.
    pub fn reply_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> ChatReply {
        ChatReply {
            content: content.into(),
            tool_calls,
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    /// Toggle simulated model failure.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// Requests recorded so far.
    pub fn recorded_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatProvider for MockChat {
    async fn complete(&self, request: &ChatRequest) -> RenumResult<ChatReply> {
        self.requests.lock().unwrap().push(request.clone());

        if self.fail.load(Ordering::SeqCst) {
            return Err(RenumError::Llm(LlmError::ModelError {
                provider: "mock".to_string(),
                status: 500,
                message: "mock outage".to_string(),
            }));
        }

        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            Ok(script.remove(0))
        } else {
            script
                .first()
                .cloned()
                .ok_or(RenumError::Llm(LlmError::ProviderNotConfigured))
        }
    }

    fn model_id(&self) -> &str {
        "mock"
    }
}

impl std::fmt::Debug for MockChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockChat")
            .field("scripted", &self.script.lock().map(|s| s.len()).unwrap_or(0))
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embedding_is_deterministic() {
        let provider = MockEmbedding::new(64);
        let a = provider.embed("customer prefers email").await.unwrap();
        let b = provider.embed("customer prefers email").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dimensions, 64);
    }

    #[tokio::test]
    async fn test_mock_embedding_shared_words_are_closer() {
        let provider = MockEmbedding::new(64);
        let a = provider.embed("customer prefers email contact").await.unwrap();
        let b = provider.embed("email contact for the customer").await.unwrap();
        let c = provider.embed("quarterly revenue projection").await.unwrap();
        let close = a.cosine_similarity(&b).unwrap();
        let far = a.cosine_similarity(&c).unwrap();
        assert!(close > far);
    }

    #[tokio::test]
    async fn test_mock_embedding_pinning() {
        let provider = MockEmbedding::new(3);
        provider.pin("query", vec![1.0, 0.0, 0.0]);
        let v = provider.embed("query").await.unwrap();
        assert_eq!(v.data, vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_mock_embedding_outage() {
        let provider = MockEmbedding::new(8);
        provider.set_failing(true);
        let err = provider.embed("anything").await.unwrap_err();
        assert!(matches!(
            err,
            RenumError::Llm(LlmError::EmbeddingUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_mock_chat_script_order_and_repeat() {
        let chat = MockChat::with_script(vec![
            ChatReply {
                content: "first".to_string(),
                tool_calls: vec![],
                input_tokens: 0,
                output_tokens: 0,
            },
            ChatReply {
                content: "second".to_string(),
                tool_calls: vec![],
                input_tokens: 0,
                output_tokens: 0,
            },
        ]);
        let req = ChatRequest {
            model: "m".to_string(),
            messages: vec![],
            tools: vec![],
            max_tokens: None,
            temperature: None,
        };
        assert_eq!(chat.complete(&req).await.unwrap().content, "first");
        assert_eq!(chat.complete(&req).await.unwrap().content, "second");
        assert_eq!(chat.complete(&req).await.unwrap().content, "second");
        assert_eq!(chat.recorded_requests().len(), 3);
    }
}
