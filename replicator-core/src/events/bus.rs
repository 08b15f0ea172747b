//! Room fan-out
//!
//! The orchestrator only knows [`RoomBroadcaster::emit_to_room`]; the gateway
//! decides which connections see a message. [`RoomBus`] is the in-process
//! implementation: one broadcast channel per room, so traffic in one room can
//! never push another room's events out of a subscriber's buffer. A separate
//! firehose channel carries every room's events in emission order for
//! monitoring.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tokio::sync::broadcast;
use tracing::trace;

use crate::session::RoomId;

use super::types::{RoomEvent, RoomMessage};

/// Outbound primitive used by the orchestrator
pub trait RoomBroadcaster: Send + Sync {
    /// Deliver `event` to every participant of `room_id`
    ///
    /// Events for a room with no participants are dropped.
    fn emit_to_room(&self, room_id: &RoomId, event: RoomEvent);
}

/// Broadcast-channel backed [`RoomBroadcaster`]
pub struct RoomBus {
    capacity: usize,
    rooms: Mutex<HashMap<RoomId, broadcast::Sender<RoomMessage>>>,
    firehose: broadcast::Sender<RoomMessage>,
}

impl RoomBus {
    /// Create a bus whose per-room channels hold `capacity` messages
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (firehose, _) = broadcast::channel(capacity);
        Self {
            capacity,
            rooms: Mutex::new(HashMap::new()),
            firehose,
        }
    }

    /// Subscribe to one room's messages
    ///
    /// The room's channel is created on first subscription. Channels whose
    /// subscribers have all gone are dropped here and on emit.
    pub fn subscribe(&self, room_id: &RoomId) -> broadcast::Receiver<RoomMessage> {
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        rooms.retain(|_, tx| tx.receiver_count() > 0);
        rooms
            .entry(room_id.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Subscribe to messages for all rooms
    pub fn subscribe_all(&self) -> broadcast::Receiver<RoomMessage> {
        self.firehose.subscribe()
    }

    /// Number of rooms with a live channel
    pub fn room_count(&self) -> usize {
        self.rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of live subscribers to `room_id`
    pub fn receiver_count(&self, room_id: &RoomId) -> usize {
        self.rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(room_id)
            .map_or(0, |tx| tx.receiver_count())
    }
}

impl Default for RoomBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl RoomBroadcaster for RoomBus {
    fn emit_to_room(&self, room_id: &RoomId, event: RoomEvent) {
        trace!(room_id = %room_id, event = event.name(), "Emitting room event");
        let message = RoomMessage {
            room_id: room_id.clone(),
            event,
        };

        {
            let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(tx) = rooms.get(room_id)
                && tx.send(message.clone()).is_err()
            {
                rooms.remove(room_id);
            }
        }

        // No subscribers means nobody is listening; that is fine
        let _ = self.firehose.send(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(id: &str) -> RoomId {
        RoomId::parse(id).unwrap()
    }

    #[tokio::test]
    async fn subscriber_receives_events_in_order() {
        let bus = RoomBus::new(16);
        let mut rx = bus.subscribe(&room("r1"));

        bus.emit_to_room(&room("r1"), RoomEvent::processing("one"));
        bus.emit_to_room(&room("r1"), RoomEvent::processing("two"));

        assert_eq!(rx.recv().await.unwrap().event, RoomEvent::processing("one"));
        assert_eq!(rx.recv().await.unwrap().event, RoomEvent::processing("two"));
    }

    #[tokio::test]
    async fn room_subscriber_only_sees_its_room() {
        let bus = RoomBus::new(16);
        let mut rx = bus.subscribe(&room("r1"));

        bus.emit_to_room(&room("r2"), RoomEvent::connected());
        bus.emit_to_room(&room("r1"), RoomEvent::processing("mine"));

        let message = rx.recv().await.unwrap();
        assert_eq!(message.room_id, room("r1"));
        assert_eq!(message.event, RoomEvent::processing("mine"));
        assert!(rx.is_empty());
    }

    #[tokio::test]
    async fn busy_neighbour_cannot_evict_terminal_event() {
        let bus = RoomBus::new(4);
        let mut quiet = bus.subscribe(&room("quiet"));
        let _noisy = bus.subscribe(&room("noisy"));

        for count in 0..2000 {
            let event = RoomEvent::FrameReceived {
                count,
                preview: None,
            };
            bus.emit_to_room(&room("noisy"), event);
        }
        bus.emit_to_room(
            &room("quiet"),
            RoomEvent::ModelReady {
                url: "/files/quiet/reconstruction.glb".to_string(),
            },
        );

        assert_eq!(
            quiet.recv().await.unwrap().event,
            RoomEvent::ModelReady {
                url: "/files/quiet/reconstruction.glb".to_string()
            }
        );
    }

    #[tokio::test]
    async fn firehose_sees_every_room() {
        let bus = RoomBus::new(16);
        let mut rx = bus.subscribe_all();

        bus.emit_to_room(&room("r1"), RoomEvent::connected());
        bus.emit_to_room(&room("r2"), RoomEvent::connected());

        assert_eq!(rx.recv().await.unwrap().room_id, room("r1"));
        assert_eq!(rx.recv().await.unwrap().room_id, room("r2"));
    }

    #[test]
    fn abandoned_room_channel_is_dropped() {
        let bus = RoomBus::new(16);
        let rx = bus.subscribe(&room("r1"));
        assert_eq!(bus.receiver_count(&room("r1")), 1);

        drop(rx);
        bus.emit_to_room(&room("r1"), RoomEvent::connected());

        assert_eq!(bus.room_count(), 0);
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let bus = RoomBus::new(16);
        bus.emit_to_room(&room("r1"), RoomEvent::connected());
        assert_eq!(bus.receiver_count(&room("r1")), 0);
        assert_eq!(bus.room_count(), 0);
    }
}
