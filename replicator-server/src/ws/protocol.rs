//! WebSocket protocol message types
//!
//! Both directions use JSON text frames shaped `{"event": "<name>", "data": {...}}`.
//! Outbound frames are [`RoomEvent`]s; inbound frames parse into [`ClientEvent`].

use replicator_core::{Role, RoomEvent, RoomId};
use serde::{Deserialize, Serialize};

use crate::ServerError;

/// Error codes sent to a single connection
pub const CODE_INVALID_MESSAGE: &str = "INVALID_MESSAGE";
pub const CODE_UNKNOWN_ROOM: &str = "UNKNOWN_ROOM";
pub const CODE_SHUTTING_DOWN: &str = "SHUTTING_DOWN";

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Join a room as a sensor or a viewer
    JoinSession {
        #[serde(rename = "sessionId")]
        session_id: RoomId,
        #[serde(rename = "type")]
        role: Role,
    },

    /// Store a captured frame for a room
    SendFrame {
        #[serde(rename = "roomId")]
        room_id: RoomId,
        /// Data-URL style payload, `data:image/jpeg;base64,...`
        image: String,
    },

    /// Start reconstruction of the room's latest frame
    #[serde(rename = "process_3d")]
    Process3d {
        #[serde(rename = "sessionId")]
        session_id: RoomId,
    },
}

impl ClientEvent {
    /// Parse a text frame
    pub fn parse(text: &str) -> Result<Self, ServerError> {
        serde_json::from_str(text).map_err(|e| ServerError::InvalidMessage(e.to_string()))
    }

    /// Room the message refers to
    pub fn room_id(&self) -> &RoomId {
        match self {
            Self::JoinSession { session_id, .. } => session_id,
            Self::SendFrame { room_id, .. } => room_id,
            Self::Process3d { session_id } => session_id,
        }
    }
}

/// Serialize an outbound event into a text frame
pub fn encode_event(event: &RoomEvent) -> Result<String, ServerError> {
    serde_json::to_string(event).map_err(|e| ServerError::Internal(e.to_string()))
}
