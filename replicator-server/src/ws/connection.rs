//! WebSocket connection handling
//!
//! Each connection runs one loop that reads client frames and forwards room
//! events. A connection subscribes to its room's channel when it joins, so it
//! never sees events emitted before its join and never sees other rooms'
//! traffic. Replies meant for this connection only (bad messages, unknown
//! rooms) are written directly.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{Sink, SinkExt, StreamExt};
use replicator_core::{ReplicatorError, RoomEvent, RoomId, RoomMessage, SessionError};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{AppState, ServerError};

use super::protocol::{
    CODE_INVALID_MESSAGE, CODE_SHUTTING_DOWN, CODE_UNKNOWN_ROOM, ClientEvent, encode_event,
};

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4().to_string();
    let (mut sender, mut receiver) = socket.split();
    let mut room = JoinedRoom::default();

    info!(connection_id = %connection_id, "WebSocket client connected");

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_text_message(
                            &text,
                            &state,
                            &connection_id,
                            &mut room,
                        )
                        .await;
                        if let Some(event) = reply
                            && let Err(e) = send_event(&mut sender, &event).await
                        {
                            debug!(
                                connection_id = %connection_id,
                                error = %e,
                                "Reply not delivered"
                            );
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(connection_id = %connection_id, "WebSocket client sent close frame");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ignore binary and pong messages
                    }
                    Some(Err(e)) => {
                        warn!(connection_id = %connection_id, error = %e, "WebSocket error");
                        break;
                    }
                }
            }

            result = room.recv() => {
                match result {
                    Ok(msg) => {
                        if let Err(e) = send_event(&mut sender, &msg.event).await {
                            debug!(
                                connection_id = %connection_id,
                                error = %e,
                                "Room event not delivered"
                            );
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(
                            connection_id = %connection_id,
                            skipped = n,
                            "WebSocket client lagged behind room events"
                        );
                    }
                }
            }

            _ = state.closing.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    }

    state.orchestrator.leave(&connection_id).await;
    info!(connection_id = %connection_id, "WebSocket client disconnected");
}

/// Handle a text message from the client
///
/// Returns an event for this connection only, if one is due.
async fn handle_text_message(
    text: &str,
    state: &AppState,
    connection_id: &str,
    room: &mut JoinedRoom,
) -> Option<RoomEvent> {
    let msg = match ClientEvent::parse(text) {
        Ok(msg) => msg,
        Err(e) => {
            debug!(connection_id, error = %e, "Rejected client message");
            return Some(RoomEvent::error(CODE_INVALID_MESSAGE, e.to_string()));
        }
    };

    if let ClientEvent::JoinSession { session_id, role } = msg {
        // Subscribe before joining so the join's own events are delivered
        room.id = Some(session_id.clone());
        room.events = Some(state.bus.subscribe(&session_id));
        state
            .orchestrator
            .join_session(connection_id, session_id, role)
            .await;
        return None;
    }

    if room.id.as_ref() != Some(msg.room_id()) {
        return Some(unknown_room(msg.room_id()));
    }

    match msg {
        ClientEvent::SendFrame { room_id, image } => {
            match state.orchestrator.send_frame(&room_id, &image).await {
                Ok(_) => None,
                // Already reported to the room
                Err(ReplicatorError::Frame(_)) => None,
                Err(e) => {
                    debug!(connection_id, error = %e, "Frame not stored");
                    Some(unknown_room(&room_id))
                }
            }
        }
        ClientEvent::Process3d { session_id } => {
            match state.orchestrator.process_3d(&session_id).await {
                Ok(outcome) => {
                    debug!(connection_id, room_id = %session_id, ?outcome, "process_3d handled");
                    None
                }
                Err(SessionError::ShuttingDown) => Some(RoomEvent::error(
                    CODE_SHUTTING_DOWN,
                    "Server is shutting down",
                )),
                Err(e) => {
                    debug!(connection_id, error = %e, "process_3d rejected");
                    Some(unknown_room(&session_id))
                }
            }
        }
        ClientEvent::JoinSession { .. } => None,
    }
}

/// The room a connection has joined and its room channel subscription
#[derive(Default)]
struct JoinedRoom {
    id: Option<RoomId>,
    events: Option<broadcast::Receiver<RoomMessage>>,
}

impl JoinedRoom {
    /// Next room message; pends forever before the first join
    async fn recv(&mut self) -> Result<RoomMessage, broadcast::error::RecvError> {
        match self.events.as_mut() {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }
}

fn unknown_room(room_id: &RoomId) -> RoomEvent {
    RoomEvent::error(CODE_UNKNOWN_ROOM, format!("Room {room_id} is not joined"))
}

async fn send_event<S>(sender: &mut S, event: &RoomEvent) -> Result<(), ServerError>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = encode_event(event)?;
    sender
        .send(Message::Text(json.into()))
        .await
        .map_err(|e| ServerError::WebSocket(e.to_string()))
}
