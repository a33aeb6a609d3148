//! WebSocket Frame Types
//!
//! Frames cross the wire as `{type, payload, timestamp}` with SCREAMING
//! snake type tags. Inbound and outbound frames share one enumeration; the
//! server ignores outbound-only types arriving from clients.

use crate::error::ApiError;
use chrono::Utc;
use renum_core::{Channel, ConversationId, Message, TenantId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// One WebSocket event, adjacently tagged as `{type, payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WsEvent {
    // ========================================================================
    // Inbound (client -> server)
    // ========================================================================
    SendMessage {
        conversation_id: Option<ConversationId>,
        content: String,
        channel: Channel,
    },
    TypingStart {
        conversation_id: ConversationId,
    },
    TypingStop {
        conversation_id: ConversationId,
    },
    MarkRead {
        conversation_id: ConversationId,
    },

    // ========================================================================
    // Outbound (server -> client)
    // ========================================================================
    NewMessage {
        conversation_id: ConversationId,
        message: Message,
    },
    UserTyping {
        conversation_id: ConversationId,
        user_id: UserId,
    },
    UserStoppedTyping {
        conversation_id: ConversationId,
        user_id: UserId,
    },
    PresenceUpdate {
        user_id: UserId,
        online: bool,
    },
    Error {
        error: ApiError,
    },
    Connected {
        user_id: UserId,
        tenant_id: TenantId,
    },
}

impl WsEvent {
    /// The wire tag of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SendMessage { .. } => "SEND_MESSAGE",
            Self::TypingStart { .. } => "TYPING_START",
            Self::TypingStop { .. } => "TYPING_STOP",
            Self::MarkRead { .. } => "MARK_READ",
            Self::NewMessage { .. } => "NEW_MESSAGE",
            Self::UserTyping { .. } => "USER_TYPING",
            Self::UserStoppedTyping { .. } => "USER_STOPPED_TYPING",
            Self::PresenceUpdate { .. } => "PRESENCE_UPDATE",
            Self::Error { .. } => "ERROR",
            Self::Connected { .. } => "CONNECTED",
        }
    }
}

/// One frame on the wire: the event plus its timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsFrame {
    #[serde(flatten)]
    pub event: WsEvent,
    pub timestamp: Timestamp,
}

impl WsFrame {
    /// Stamp an event with the current time.
    pub fn now(event: WsEvent) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
        }
    }
}

/// Internal broadcast envelope: the frame plus its tenant scope, so each
/// socket task can filter without parsing payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct Broadcast {
    pub tenant_id: TenantId,
    pub frame: WsFrame,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use renum_core::new_entity_id;

    #[test]
    fn test_frame_wire_shape() {
        let frame = WsFrame::now(WsEvent::TypingStart {
            conversation_id: new_entity_id(),
        });
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "TYPING_START");
        assert!(json["payload"]["conversation_id"].is_string());
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_inbound_frame_parses() {
        let conversation_id = new_entity_id();
        let raw = format!(
            r#"{{"type":"SEND_MESSAGE","payload":{{"conversation_id":"{}","content":"oi","channel":"web"}},"timestamp":"2026-01-01T00:00:00Z"}}"#,
            conversation_id
        );
        let frame: WsFrame = serde_json::from_str(&raw).unwrap();
        match frame.event {
            WsEvent::SendMessage {
                conversation_id: id,
                ref content,
                channel,
            } => {
                assert_eq!(id, Some(conversation_id));
                assert_eq!(content, "oi");
                assert_eq!(channel, Channel::Web);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_event_type_tags_match_serde() {
        let event = WsEvent::PresenceUpdate {
            user_id: new_entity_id(),
            online: true,
        };
        let json = serde_json::to_value(WsFrame::now(event.clone())).unwrap();
        assert_eq!(json["type"], event.event_type());
    }

    #[test]
    fn test_error_frame_carries_api_error_shape() {
        let frame = WsFrame::now(WsEvent::Error {
            error: ApiError::validation("bad frame"),
        });
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "ERROR");
        assert_eq!(json["payload"]["error"]["kind"], "validation");
    }
}
