//! SessionRegistry tracks room membership
//!
//! Rooms are created on first join and dropped when their last participant
//! leaves. All membership changes go through a single write lock, so
//! concurrent joins and leaves never lose updates.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::SessionError;

use super::state::{ConnectionId, Role, RoomId, Session, SessionState};

/// Result of a connection leaving its room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveOutcome {
    pub room_id: RoomId,
    pub role: Role,
    /// The room had no participants left and was dropped
    pub room_closed: bool,
}

/// Result of a connection joining a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinResult {
    /// This connection is the room's first sensor
    pub first_sensor: bool,
    /// Room the connection was moved out of, if any
    pub left: Option<LeaveOutcome>,
}

#[derive(Default)]
struct Rooms {
    sessions: HashMap<RoomId, Session>,
    memberships: HashMap<ConnectionId, RoomId>,
}

impl Rooms {
    fn remove_connection(&mut self, connection_id: &str) -> Option<LeaveOutcome> {
        let room_id = self.memberships.remove(connection_id)?;
        let session = self.sessions.get_mut(&room_id)?;
        let role = session.remove_participant(connection_id)?;

        let room_closed = session.is_empty();
        if room_closed {
            self.sessions.remove(&room_id);
        }

        Some(LeaveOutcome {
            room_id,
            role,
            room_closed,
        })
    }
}

/// Registry of live capture rooms
#[derive(Default)]
pub struct SessionRegistry {
    rooms: RwLock<Rooms>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room, creating the room if needed
    ///
    /// A connection belongs to at most one room; joining a second room moves it.
    pub async fn join(&self, connection_id: &str, room_id: &RoomId, role: Role) -> JoinResult {
        let mut rooms = self.rooms.write().await;

        let moving = rooms
            .memberships
            .get(connection_id)
            .is_some_and(|current| current != room_id);
        let left = if moving {
            rooms.remove_connection(connection_id)
        } else {
            None
        };

        let session = rooms
            .sessions
            .entry(room_id.clone())
            .or_insert_with(|| Session::new(room_id.clone()));
        let first_sensor = session.add_participant(connection_id.to_string(), role);

        rooms
            .memberships
            .insert(connection_id.to_string(), room_id.clone());

        debug!(room_id = %room_id, connection_id, ?role, "Joined room");

        JoinResult { first_sensor, left }
    }

    /// Remove a connection from whichever room it belongs to
    pub async fn leave(&self, connection_id: &str) -> Option<LeaveOutcome> {
        let outcome = self.rooms.write().await.remove_connection(connection_id);
        if let Some(outcome) = &outcome {
            debug!(
                room_id = %outcome.room_id,
                connection_id,
                room_closed = outcome.room_closed,
                "Left room"
            );
        }
        outcome
    }

    /// Room the connection currently belongs to
    pub async fn room_of(&self, connection_id: &str) -> Option<RoomId> {
        self.rooms.read().await.memberships.get(connection_id).cloned()
    }

    pub async fn contains(&self, room_id: &RoomId) -> bool {
        self.rooms.read().await.sessions.contains_key(room_id)
    }

    /// Get session state by room
    pub async fn state(&self, room_id: &RoomId) -> Result<SessionState, SessionError> {
        self.with_session(room_id, |session| session.state()).await
    }

    /// Run `f` against a room under the write lock
    pub async fn with_session<F, R>(&self, room_id: &RoomId, f: F) -> Result<R, SessionError>
    where
        F: FnOnce(&mut Session) -> R,
    {
        let mut rooms = self.rooms.write().await;
        let session = rooms
            .sessions
            .get_mut(room_id)
            .ok_or_else(|| SessionError::UnknownRoom(room_id.to_string()))?;
        Ok(f(session))
    }

    /// Move a room to `next`
    pub async fn transition(
        &self,
        room_id: &RoomId,
        next: SessionState,
    ) -> Result<(), SessionError> {
        self.with_session(room_id, |session| session.transition_to(next))
            .await?
    }

    /// Number of live rooms
    pub async fn session_count(&self) -> usize {
        self.rooms.read().await.sessions.len()
    }

    /// Ids of all live rooms
    pub async fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.read().await.sessions.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn room(id: &str) -> RoomId {
        RoomId::parse(id).unwrap()
    }

    // ==================== Join Tests ====================

    #[tokio::test]
    async fn join_creates_room() {
        let registry = SessionRegistry::new();

        let result = registry.join("c1", &room("r1"), Role::Sensor).await;

        assert!(result.first_sensor);
        assert!(result.left.is_none());
        assert!(registry.contains(&room("r1")).await);
        assert_eq!(registry.room_of("c1").await, Some(room("r1")));
        assert_eq!(
            registry.state(&room("r1")).await.unwrap(),
            SessionState::AwaitingFrame
        );
    }

    #[tokio::test]
    async fn second_sensor_is_not_first() {
        let registry = SessionRegistry::new();

        registry.join("c1", &room("r1"), Role::Sensor).await;
        let result = registry.join("c2", &room("r1"), Role::Sensor).await;

        assert!(!result.first_sensor);
    }

    #[tokio::test]
    async fn joining_another_room_moves_connection() {
        let registry = SessionRegistry::new();

        registry.join("c1", &room("r1"), Role::Viewer).await;
        let result = registry.join("c1", &room("r2"), Role::Viewer).await;

        let left = result.left.unwrap();
        assert_eq!(left.room_id, room("r1"));
        assert!(left.room_closed);
        assert!(!registry.contains(&room("r1")).await);
        assert_eq!(registry.room_of("c1").await, Some(room("r2")));
    }

    // ==================== Leave Tests ====================

    #[tokio::test]
    async fn leave_keeps_room_with_remaining_participants() {
        let registry = SessionRegistry::new();
        registry.join("c1", &room("r1"), Role::Sensor).await;
        registry.join("c2", &room("r1"), Role::Viewer).await;

        let outcome = registry.leave("c1").await.unwrap();

        assert_eq!(outcome.role, Role::Sensor);
        assert!(!outcome.room_closed);
        assert!(registry.contains(&room("r1")).await);
    }

    #[tokio::test]
    async fn last_leave_closes_room() {
        let registry = SessionRegistry::new();
        registry.join("c1", &room("r1"), Role::Sensor).await;

        let outcome = registry.leave("c1").await.unwrap();

        assert!(outcome.room_closed);
        assert_eq!(registry.session_count().await, 0);
        assert!(registry.room_of("c1").await.is_none());
    }

    #[tokio::test]
    async fn leave_unknown_connection_is_noop() {
        let registry = SessionRegistry::new();
        assert!(registry.leave("ghost").await.is_none());
    }

    // ==================== State Tests ====================

    #[tokio::test]
    async fn transition_unknown_room_fails() {
        let registry = SessionRegistry::new();

        let err = registry
            .transition(&room("nope"), SessionState::FrameReceived)
            .await
            .unwrap_err();

        assert_eq!(err, SessionError::UnknownRoom("nope".to_string()));
    }

    #[tokio::test]
    async fn concurrent_joins_are_not_lost() {
        let registry = Arc::new(SessionRegistry::new());
        let r1 = room("r1");

        let handles: Vec<_> = (0..50)
            .map(|i| {
                let registry = Arc::clone(&registry);
                let r1 = r1.clone();
                tokio::spawn(async move {
                    registry.join(&format!("c{i}"), &r1, Role::Viewer).await;
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let count = registry
            .with_session(&r1, |s| s.participant_count())
            .await
            .unwrap();
        assert_eq!(count, 50);
    }
}
