//! Provider implementations

pub mod openai;

use renum_core::{LlmError, RenumError};

/// Helper: build a ModelError.
pub(crate) fn model_error(provider: &str, status: i32, message: impl Into<String>) -> RenumError {
    RenumError::Llm(LlmError::ModelError {
        provider: provider.to_string(),
        status,
        message: message.into(),
    })
}

/// Helper: build a RateLimited error.
pub(crate) fn rate_limited(provider: &str, retry_after_ms: i64) -> RenumError {
    RenumError::Llm(LlmError::RateLimited {
        provider: provider.to_string(),
        retry_after_ms,
    })
}

/// Helper: build an InvalidResponse error.
pub(crate) fn invalid_response(provider: &str, reason: impl Into<String>) -> RenumError {
    RenumError::Llm(LlmError::InvalidResponse {
        provider: provider.to_string(),
        reason: reason.into(),
    })
}

/// Helper: build an EmbeddingUnavailable error.
pub(crate) fn embedding_unavailable(reason: impl Into<String>) -> RenumError {
    RenumError::Llm(LlmError::EmbeddingUnavailable {
        reason: reason.into(),
    })
}
