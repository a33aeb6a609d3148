//! Error Types for the Renum API
//!
//! Structured error responses shared by REST and WebSocket surfaces.
//! Every API error serializes as `{kind, message, details?}` with a stable
//! kind and an HTTP status derived from it.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use renum_core::{RenumError, StorageError};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR KIND ENUM
// ============================================================================

/// Stable error kinds for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Request lacks valid authentication credentials
    Unauthenticated,

    /// Request is authenticated but lacks permission for the resource
    Forbidden,

    /// Requested entity does not exist (or belongs to another tenant)
    NotFound,

    /// Request validation failed
    Validation,

    /// Operation conflicts with current state (e.g. duplicate wizard submission)
    Conflict,

    /// Embedding dimension does not match the configured dimension
    DimensionMismatch,

    /// Embedding provider is unavailable
    EmbeddingUnavailable,

    /// LLM request failed
    ModelError,

    /// Tool execution failed
    ToolError,

    /// Operation exceeded its time budget
    Timeout,

    /// Persistence integrity violation
    Integrity,

    /// Request rate limit exceeded
    RateLimited,

    /// Internal server error
    Internal,
}

impl ErrorKind {
    /// Get the HTTP status code for this error kind.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Validation | ErrorKind::DimensionMismatch => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::EmbeddingUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::ModelError => StatusCode::BAD_GATEWAY,
            ErrorKind::ToolError => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Integrity | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a default message for this error kind.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::Unauthenticated => "Authentication required",
            ErrorKind::Forbidden => "Access forbidden",
            ErrorKind::NotFound => "Entity not found",
            ErrorKind::Validation => "Request validation failed",
            ErrorKind::Conflict => "Operation conflicts with current state",
            ErrorKind::DimensionMismatch => "Embedding dimension mismatch",
            ErrorKind::EmbeddingUnavailable => "Embedding provider unavailable",
            ErrorKind::ModelError => "Model request failed",
            ErrorKind::ToolError => "Tool execution failed",
            ErrorKind::Timeout => "Operation timed out",
            ErrorKind::RateLimited => "Rate limit exceeded",
            ErrorKind::Integrity => "Persistence integrity violation",
            ErrorKind::Internal => "Internal server error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiError {
    /// Error kind categorizing the error
    pub kind: ErrorKind,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (field errors, degraded subsystems, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the kind's default message.
    pub fn from_kind(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: kind.default_message().to_string(),
            details: None,
        }
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.kind.status_code()
    }

    // ========================================================================
    // Convenience constructors
    // ========================================================================

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(ErrorKind::Validation, format!("Required field missing: {}", field))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(kind = %self.kind, message = %self.message, "API error");
        }
        (status, Json(self)).into_response()
    }
}

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<RenumError> for ApiError {
    fn from(err: RenumError) -> Self {
        match &err {
            RenumError::Storage(StorageError::NotFound { .. }) => {
                ApiError::new(ErrorKind::NotFound, format!("{}", err))
            }
            RenumError::Storage(StorageError::Integrity { .. }) => {
                ApiError::new(ErrorKind::Integrity, format!("{}", err))
            }
            RenumError::Storage(_) => ApiError::new(ErrorKind::Internal, format!("{}", err)),
            RenumError::Llm(renum_core::LlmError::EmbeddingUnavailable { .. }) => {
                ApiError::new(ErrorKind::EmbeddingUnavailable, format!("{}", err))
            }
            RenumError::Llm(_) => ApiError::new(ErrorKind::ModelError, format!("{}", err)),
            RenumError::Vault(_) => ApiError::new(ErrorKind::Validation, format!("{}", err)),
            RenumError::Validation(_) => ApiError::new(ErrorKind::Validation, format!("{}", err)),
            RenumError::Tool(renum_core::ToolError::UnknownTool { .. }) => {
                ApiError::new(ErrorKind::Validation, format!("{}", err))
            }
            RenumError::Tool(_) => ApiError::new(ErrorKind::ToolError, format!("{}", err)),
            RenumError::Vector(renum_core::VectorError::DimensionMismatch { .. }) => {
                ApiError::new(ErrorKind::DimensionMismatch, format!("{}", err))
            }
            RenumError::Vector(_) => ApiError::new(ErrorKind::Validation, format!("{}", err)),
            RenumError::Config(_) => ApiError::new(ErrorKind::Internal, format!("{}", err)),
        }
    }
}

impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        ApiError::new(
            ErrorKind::Internal,
            format!("Database pool error: {}", err),
        )
    }
}

impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db_error) = err.as_db_error() {
            use tokio_postgres::error::SqlState;
            if db_error.code() == &SqlState::UNIQUE_VIOLATION {
                return ApiError::new(ErrorKind::Conflict, db_error.message().to_string());
            }
            if db_error.code() == &SqlState::FOREIGN_KEY_VIOLATION
                || db_error.code() == &SqlState::CHECK_VIOLATION
            {
                return ApiError::new(ErrorKind::Integrity, db_error.message().to_string());
            }
        }
        ApiError::new(ErrorKind::Internal, format!("Database error: {}", err))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::new(ErrorKind::Internal, format!("Serialization error: {}", err))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use renum_core::{LlmError, VectorError};

    #[test]
    fn test_kind_status_mapping() {
        assert_eq!(ErrorKind::Unauthenticated.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorKind::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorKind::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorKind::Validation.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::Conflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorKind::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::EmbeddingUnavailable).unwrap();
        assert_eq!(json, "\"embedding_unavailable\"");
    }

    #[test]
    fn test_error_shape() {
        let err = ApiError::validation("content is required")
            .with_details(serde_json::json!({ "field": "content" }));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "validation");
        assert_eq!(json["message"], "content is required");
        assert_eq!(json["details"]["field"], "content");
    }

    #[test]
    fn test_details_omitted_when_absent() {
        let json = serde_json::to_value(ApiError::from_kind(ErrorKind::NotFound)).unwrap();
        assert!(json.get("details").is_none());
    }

    #[test]
    fn test_renum_error_conversion() {
        let dim = RenumError::Vector(VectorError::DimensionMismatch {
            expected: 384,
            got: 3,
        });
        assert_eq!(ApiError::from(dim).kind, ErrorKind::DimensionMismatch);

        let emb = RenumError::Llm(LlmError::EmbeddingUnavailable {
            reason: "503".to_string(),
        });
        assert_eq!(ApiError::from(emb).kind, ErrorKind::EmbeddingUnavailable);

        let not_found = RenumError::Storage(StorageError::NotFound {
            entity_type: renum_core::EntityType::Conversation,
            id: uuid::Uuid::nil(),
        });
        assert_eq!(ApiError::from(not_found).kind, ErrorKind::NotFound);
    }
}
