//! Session struct and state machine
//!
//! A Session is one capture room: the connections that joined it and where
//! the room is in the capture → reconstruction cycle.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Opaque identifier for a connected client
pub type ConnectionId = String;

const MAX_ROOM_ID_LEN: usize = 128;

/// Validated room identifier
///
/// Room ids double as directory names under the output root, so anything that
/// could escape that directory is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, SessionError> {
        let raw = raw.into();
        let valid = !raw.is_empty()
            && raw.len() <= MAX_ROOM_ID_LEN
            && raw != "."
            && raw != ".."
            && !raw.contains(['/', '\\', '\0']);

        if valid {
            Ok(Self(raw))
        } else {
            Err(SessionError::InvalidRoomId(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoomId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for RoomId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        RoomId::parse(raw).map_err(serde::de::Error::custom)
    }
}

/// Role a connection plays in a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Captures and uploads frames
    Sensor,
    /// Receives the generated mesh
    Viewer,
}

/// State of a capture room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Created, nobody has joined yet
    Idle,
    /// Participants present, no frame yet
    AwaitingFrame,
    /// A frame is stored and ready to process
    FrameReceived,
    /// A reconstruction task is in flight
    Processing,
    /// Last reconstruction produced a model
    Completed,
    /// Last reconstruction ended without a model
    Failed,
}

impl SessionState {
    /// Whether `next` is reachable from this state
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        match (self, next) {
            (Idle, AwaitingFrame) => true,
            (Idle | AwaitingFrame | FrameReceived | Completed | Failed, FrameReceived) => true,
            (FrameReceived | Completed | Failed, Processing) => true,
            (Processing, Completed | Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A capture room
#[derive(Debug, Clone)]
pub struct Session {
    room_id: RoomId,
    participants: HashMap<ConnectionId, Role>,
    state: SessionState,
    /// Ticket of the pipeline this session started and has not yet settled
    pipeline: Option<u64>,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            participants: HashMap::new(),
            state: SessionState::Idle,
            pipeline: None,
            created_at: Utc::now(),
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn role_of(&self, connection_id: &str) -> Option<Role> {
        self.participants.get(connection_id).copied()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.participants.values().any(|r| *r == role)
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Add or re-tag a participant
    ///
    /// Returns true when this connection is the room's first sensor.
    pub fn add_participant(&mut self, connection_id: ConnectionId, role: Role) -> bool {
        let first_sensor = role == Role::Sensor
            && !self
                .participants
                .iter()
                .any(|(id, r)| *r == Role::Sensor && *id != connection_id);

        self.participants.insert(connection_id, role);

        if self.state == SessionState::Idle {
            self.state = SessionState::AwaitingFrame;
        }

        first_sensor
    }

    /// Returns the removed participant's role, if it was present
    pub fn remove_participant(&mut self, connection_id: &str) -> Option<Role> {
        self.participants.remove(connection_id)
    }

    /// Move to `next`, rejecting transitions the state machine does not allow
    pub fn transition_to(&mut self, next: SessionState) -> Result<(), SessionError> {
        if !self.state.can_transition_to(next) {
            return Err(SessionError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }

    /// Ticket of the pipeline running for this session, if any
    pub fn pipeline(&self) -> Option<u64> {
        self.pipeline
    }

    /// Move to `Processing` on behalf of the pipeline holding `ticket`
    pub fn begin_pipeline(&mut self, ticket: u64) -> Result<(), SessionError> {
        self.transition_to(SessionState::Processing)?;
        self.pipeline = Some(ticket);
        Ok(())
    }

    /// Settle the pipeline holding `ticket` into `next`
    ///
    /// Returns false, leaving the session untouched, when `ticket` was not
    /// started by this session.
    pub fn finish_pipeline(&mut self, ticket: u64, next: SessionState) -> bool {
        if self.pipeline != Some(ticket) {
            return false;
        }
        self.pipeline = None;
        self.transition_to(next).is_ok()
    }
}
