//! Realtime Fan-out
//!
//! WebSocket broadcast of conversation events. One socket per authenticated
//! user; a tokio broadcast channel distributes `Broadcast` envelopes and
//! each socket task filters by tenant before writing to its sink.
//!
//! Disconnection is silent and nothing is buffered across reconnects;
//! clients refetch history over REST.

use crate::auth::Principal;
use crate::error::{ApiError, ApiResult};
use crate::events::{Broadcast, WsEvent, WsFrame};
use crate::orchestrator::{ConversationStore, InboundTurn, Orchestrator};
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures_util::{SinkExt, StreamExt};
use renum_core::TenantId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

// ============================================================================
// STATE
// ============================================================================

/// WebSocket state shared across the application.
pub struct WsState {
    tx: broadcast::Sender<Broadcast>,
    connected: AtomicUsize,
}

impl WsState {
    /// Create a new WebSocket state with the specified channel capacity.
    ///
    /// The capacity bounds how many events a slow consumer can fall behind
    /// before it starts dropping frames.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            tx,
            connected: AtomicUsize::new(0),
        }
    }

    /// Broadcast a frame to every subscriber of the tenant.
    ///
    /// Non-blocking; with no subscribers the frame is dropped, which is
    /// fine - broadcast failure never affects the turn that produced it.
    pub fn broadcast(&self, tenant_id: TenantId, frame: WsFrame) {
        let event_type = frame.event.event_type();
        match self.tx.send(Broadcast { tenant_id, frame }) {
            Ok(receivers) => {
                debug!(event_type, receivers, "Broadcast event");
            }
            Err(_) => {
                debug!(event_type, "No receivers for event");
            }
        }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Broadcast> {
        self.tx.subscribe()
    }

    /// Number of currently connected sockets.
    pub fn connected_count(&self) -> usize {
        self.connected.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for WsState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsState")
            .field("connected", &self.connected_count())
            .finish()
    }
}

// ============================================================================
// HANDLER
// ============================================================================

/// GET /ws - upgrade to a WebSocket connection.
///
/// Requires an authenticated principal with a tenant scope; the socket only
/// ever sees events for that tenant.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Response> {
    let tenant_id = principal.require_tenant()?;
    info!(tenant_id = %tenant_id, user_id = %principal.id, "WebSocket connection request");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, principal, tenant_id)))
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    principal: Principal,
    tenant_id: TenantId,
) {
    info!(tenant_id = %tenant_id, user_id = %principal.id, "WebSocket connected");
    state.ws.connected.fetch_add(1, Ordering::Relaxed);

    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.ws.subscribe();

    // Greet the socket, then tell the rest of the tenant the user is online.
    let connected = WsFrame::now(WsEvent::Connected {
        user_id: principal.id,
        tenant_id,
    });
    if send_frame(&mut sender, &connected).await.is_err() {
        state.ws.connected.fetch_sub(1, Ordering::Relaxed);
        return;
    }
    state.ws.broadcast(
        tenant_id,
        WsFrame::now(WsEvent::PresenceUpdate {
            user_id: principal.id,
            online: true,
        }),
    );

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(envelope) => {
                        if envelope.tenant_id != tenant_id {
                            continue;
                        }
                        if send_frame(&mut sender, &envelope.frame).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(tenant_id = %tenant_id, skipped, "WebSocket client lagged");
                        let frame = WsFrame::now(WsEvent::Error {
                            error: ApiError::internal_error(format!(
                                "Lagged: {} events dropped",
                                skipped
                            )),
                        });
                        if send_frame(&mut sender, &frame).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(WsMessage::Text(text))) => {
                        if let Some(reply) = handle_inbound(
                            &state,
                            &principal,
                            tenant_id,
                            text.as_str(),
                        )
                        .await
                        {
                            if send_frame(&mut sender, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ping/pong/binary ignored
                    Some(Err(e)) => {
                        warn!(tenant_id = %tenant_id, error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }
        }
    }

    state.ws.connected.fetch_sub(1, Ordering::Relaxed);
    state.ws.broadcast(
        tenant_id,
        WsFrame::now(WsEvent::PresenceUpdate {
            user_id: principal.id,
            online: false,
        }),
    );
    info!(tenant_id = %tenant_id, user_id = %principal.id, "WebSocket disconnected");
}

/// Handle one inbound frame. Returns a frame to send back on this socket
/// only for protocol errors; everything else flows through the broadcast.
async fn handle_inbound(
    state: &AppState,
    principal: &Principal,
    tenant_id: TenantId,
    text: &str,
) -> Option<WsFrame> {
    let frame: WsFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            return Some(WsFrame::now(WsEvent::Error {
                error: ApiError::validation(format!("Unparseable frame: {}", e)),
            }));
        }
    };

    match frame.event {
        WsEvent::SendMessage {
            conversation_id,
            content,
            channel,
        } => {
            let turn = InboundTurn {
                tenant_id,
                user_id: principal.id,
                conversation_id,
                agent_id: None,
                content,
                channel,
                idempotency_key: None,
                admin_override: None,
            };
            // The turn persists and broadcasts NEW_MESSAGE on its own; only
            // failures come back on this socket.
            if let Err(error) = Orchestrator::dispatch(state.orchestrator.clone(), turn).await {
                return Some(WsFrame::now(WsEvent::Error { error }));
            }
            None
        }
        WsEvent::TypingStart { conversation_id } => {
            state.ws.broadcast(
                tenant_id,
                WsFrame::now(WsEvent::UserTyping {
                    conversation_id,
                    user_id: principal.id,
                }),
            );
            None
        }
        WsEvent::TypingStop { conversation_id } => {
            state.ws.broadcast(
                tenant_id,
                WsFrame::now(WsEvent::UserStoppedTyping {
                    conversation_id,
                    user_id: principal.id,
                }),
            );
            None
        }
        WsEvent::MarkRead { conversation_id } => {
            if let Err(e) = state
                .conversations
                .mark_read(tenant_id, conversation_id)
                .await
            {
                return Some(WsFrame::now(WsEvent::Error { error: e.into() }));
            }
            None
        }
        other => Some(WsFrame::now(WsEvent::Error {
            error: ApiError::validation(format!(
                "Frame type {} is not accepted from clients",
                other.event_type()
            )),
        })),
    }
}

async fn send_frame(
    sender: &mut futures_util::stream::SplitSink<WebSocket, WsMessage>,
    frame: &WsFrame,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(frame).map_err(axum::Error::new)?;
    sender.send(WsMessage::Text(json.into())).await
}

// =============================================================================
// TESTS
// =============================================================================
