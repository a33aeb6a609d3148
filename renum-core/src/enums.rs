//! Enum types for Renum entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CORE ENUMS
// ============================================================================

/// Entity type discriminator for error reporting and polymorphic references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum EntityType {
    Tenant,
    Profile,
    Agent,
    SubAgent,
    Conversation,
    Message,
    MemoryChunk,
    KnowledgeDocument,
    KnowledgeChunk,
    BehaviorPattern,
    KnowledgeSnapshot,
    IntegrationCredential,
    InteractionLog,
}

/// Delivery channel a conversation lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Whatsapp,
    Email,
    Web,
}

impl Channel {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Whatsapp => "whatsapp",
            Self::Email => "email",
            Self::Web => "web",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s {
            "whatsapp" => Ok(Self::Whatsapp),
            "email" => Ok(Self::Email),
            "web" => Ok(Self::Web),
            _ => Err(EnumParseError::new("channel", s)),
        }
    }
}

impl FromStr for Channel {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// Conversation lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Pending,
    Closed,
}

impl ConversationStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Pending => "pending",
            Self::Closed => "closed",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s {
            "active" => Ok(Self::Active),
            "pending" => Ok(Self::Pending),
            "closed" => Ok(Self::Closed),
            _ => Err(EnumParseError::new("conversation_status", s)),
        }
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum MessageSender {
    Admin,
    Client,
    System,
}

impl MessageSender {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Client => "client",
            Self::System => "system",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s {
            "admin" => Ok(Self::Admin),
            "client" => Ok(Self::Client),
            "system" => Ok(Self::System),
            _ => Err(EnumParseError::new("message_sender", s)),
        }
    }
}

/// Payload type of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    File,
}

impl MessageKind {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "file" => Ok(Self::File),
            _ => Err(EnumParseError::new("message_kind", s)),
        }
    }
}

/// Role of an authenticated user profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Client,
    Guest,
}

impl UserRole {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Client => "client",
            Self::Guest => "guest",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s {
            "admin" => Ok(Self::Admin),
            "client" => Ok(Self::Client),
            "guest" => Ok(Self::Guest),
            _ => Err(EnumParseError::new("user_role", s)),
        }
    }
}

/// Ingestion status of a knowledge document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Indexing,
    Ready,
    Error,
}

impl DocumentStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Indexing => "indexing",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s {
            "indexing" => Ok(Self::Indexing),
            "ready" => Ok(Self::Ready),
            "error" => Ok(Self::Error),
            _ => Err(EnumParseError::new("document_status", s)),
        }
    }
}

/// Outcome of one orchestrated turn, as recorded by the learning logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum TurnOutcome {
    Completed,
    Degraded,
    Failed,
}

impl TurnOutcome {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, EnumParseError> {
        match s {
            "completed" => Ok(Self::Completed),
            "degraded" => Ok(Self::Degraded),
            "failed" => Ok(Self::Failed),
            _ => Err(EnumParseError::new("turn_outcome", s)),
        }
    }
}

// ============================================================================
// OPEN ENUMERATIONS
// ============================================================================

/// Semantic category of a memory chunk.
///
/// The set is open: values observed in the data that do not match a known
/// category round-trip through `Other` unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(from = "String", into = "String")]
pub enum MemoryType {
    Fact,
    Preference,
    Episode,
    Instruction,
    Other(String),
}

impl MemoryType {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &str {
        match self {
            Self::Fact => "fact",
            Self::Preference => "preference",
            Self::Episode => "episode",
            Self::Instruction => "instruction",
            Self::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for MemoryType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "fact" => Self::Fact,
            "preference" => Self::Preference,
            "episode" => Self::Episode,
            "instruction" => Self::Instruction,
            _ => Self::Other(s),
        }
    }
}

impl From<MemoryType> for String {
    fn from(t: MemoryType) -> Self {
        t.as_db_str().to_string()
    }
}

/// Behavior pattern signal category mined from interaction logs.
///
/// The set is open by design: new signal categories show up in the data
/// before anyone names them, so unknown values are carried verbatim in
/// `Other` rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(from = "String", into = "String")]
pub enum PatternType {
    Question,
    Complaint,
    Handoff,
    Confirmation,
    Error,
    Other(String),
}

impl PatternType {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &str {
        match self {
            Self::Question => "question",
            Self::Complaint => "complaint",
            Self::Handoff => "handoff",
            Self::Confirmation => "confirmation",
            Self::Error => "error",
            Self::Other(s) => s.as_str(),
        }
    }

    /// Stable sort key: known categories keep a fixed position, observed
    /// categories follow in lexicographic order.
    pub fn sort_rank(&self) -> (u8, &str) {
        match self {
            Self::Question => (0, "question"),
            Self::Complaint => (1, "complaint"),
            Self::Handoff => (2, "handoff"),
            Self::Confirmation => (3, "confirmation"),
            Self::Error => (4, "error"),
            Self::Other(s) => (5, s.as_str()),
        }
    }
}

impl From<String> for PatternType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "question" => Self::Question,
            "complaint" => Self::Complaint,
            "handoff" => Self::Handoff,
            "confirmation" => Self::Confirmation,
            "error" => Self::Error,
            _ => Self::Other(s),
        }
    }
}

impl From<PatternType> for String {
    fn from(t: PatternType) -> Self {
        t.as_db_str().to_string()
    }
}

// ============================================================================
// PARSE ERROR
// ============================================================================

/// Error parsing an enum from its database string representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumParseError {
    /// Name of the enumeration being parsed.
    pub what: &'static str,
    /// The offending value.
    pub value: String,
}

impl EnumParseError {
    fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for EnumParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.what, self.value)
    }
}

impl std::error::Error for EnumParseError {}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_roundtrip() {
        for channel in [Channel::Whatsapp, Channel::Email, Channel::Web] {
            let s = channel.as_db_str();
            let parsed = Channel::from_db_str(s).unwrap();
            assert_eq!(channel, parsed);
        }
    }

    #[test]
    fn test_channel_rejects_unknown() {
        let err = Channel::from_db_str("telegram").unwrap_err();
        assert_eq!(err.what, "channel");
        assert_eq!(err.value, "telegram");
    }

    #[test]
    fn test_conversation_status_roundtrip() {
        for status in [
            ConversationStatus::Active,
            ConversationStatus::Pending,
            ConversationStatus::Closed,
        ] {
            let parsed = ConversationStatus::from_db_str(status.as_db_str()).unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn test_message_sender_roundtrip() {
        for sender in [
            MessageSender::Admin,
            MessageSender::Client,
            MessageSender::System,
        ] {
            let parsed = MessageSender::from_db_str(sender.as_db_str()).unwrap();
            assert_eq!(sender, parsed);
        }
    }

    #[test]
    fn test_document_status_roundtrip() {
        for status in [
            DocumentStatus::Indexing,
            DocumentStatus::Ready,
            DocumentStatus::Error,
        ] {
            let parsed = DocumentStatus::from_db_str(status.as_db_str()).unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn test_pattern_type_known_values() {
        assert_eq!(PatternType::from(String::from("question")), PatternType::Question);
        assert_eq!(PatternType::from(String::from("complaint")), PatternType::Complaint);
        assert_eq!(PatternType::from(String::from("error")), PatternType::Error);
    }

    #[test]
    fn test_pattern_type_open_set() {
        let observed = PatternType::from(String::from("upsell_request"));
        assert_eq!(observed, PatternType::Other("upsell_request".to_string()));
        assert_eq!(observed.as_db_str(), "upsell_request");
    }

    #[test]
    fn test_pattern_type_sort_rank_is_stable() {
        let mut patterns = vec![
            PatternType::Other("zeta".to_string()),
            PatternType::Error,
            PatternType::Question,
            PatternType::Other("alpha".to_string()),
        ];
        patterns.sort_by(|a, b| a.sort_rank().cmp(&b.sort_rank()));
        assert_eq!(
            patterns,
            vec![
                PatternType::Question,
                PatternType::Error,
                PatternType::Other("alpha".to_string()),
                PatternType::Other("zeta".to_string()),
            ]
        );
    }

    #[test]
    fn test_memory_type_open_set() {
        let known = MemoryType::from(String::from("preference"));
        assert_eq!(known, MemoryType::Preference);

        let observed = MemoryType::from(String::from("escalation_note"));
        assert_eq!(observed.as_db_str(), "escalation_note");
    }

    #[test]
    fn test_pattern_type_serde_as_string() {
        let json = serde_json::to_string(&PatternType::Handoff).unwrap();
        assert_eq!(json, "\"handoff\"");

        let parsed: PatternType = serde_json::from_str("\"follow_up\"").unwrap();
        assert_eq!(parsed, PatternType::Other("follow_up".to_string()));
    }
}
