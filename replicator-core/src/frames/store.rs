//! FrameStore keeps the most recent capture for each room
//!
//! Frames arrive as data-URL style strings (`<mime-prefix>,<base64>`). The
//! payload is decoded before any lock is taken, so a bad payload can never
//! disturb the frame already stored for the room.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::FrameError;
use crate::session::RoomId;

/// A decoded camera frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub room_id: RoomId,
    /// Media type from the payload prefix, e.g. `image/jpeg`
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

/// Path the latest frame of a room is served under
///
/// `count` only varies the query string so clients never reuse a cached
/// preview.
pub fn frame_preview_url(room_id: &RoomId, count: u64) -> String {
    format!("/frames/{room_id}/latest?n={count}")
}

/// Decode a `data:<mime>;base64,<data>` payload
///
/// Returns the media type (when the prefix carries one) and the raw bytes.
pub fn decode_data_url(payload: &str) -> Result<(Option<String>, Vec<u8>), FrameError> {
    let (header, encoded) = payload
        .split_once(',')
        .ok_or_else(|| FrameError::MalformedPayload("missing ',' separator".to_string()))?;

    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| FrameError::Decode(e.to_string()))?;
    if bytes.is_empty() {
        return Err(FrameError::Decode("empty image".to_string()));
    }

    let mime = header
        .strip_prefix("data:")
        .map(|rest| rest.split(';').next().unwrap_or_default())
        .filter(|mime| !mime.is_empty())
        .map(str::to_string);

    Ok((mime, bytes))
}

struct Slot {
    frame: Arc<Frame>,
    /// Frames received for the room so far
    count: u64,
}

/// Latest-frame-per-room store (last write wins)
#[derive(Default)]
pub struct FrameStore {
    slots: RwLock<HashMap<RoomId, Slot>>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode and store a frame, replacing the room's previous one
    ///
    /// Returns the running number of frames received for the room.
    pub async fn store_frame(&self, room_id: &RoomId, payload: &str) -> Result<u64, FrameError> {
        let (mime, bytes) = decode_data_url(payload)?;
        let frame = Arc::new(Frame {
            room_id: room_id.clone(),
            mime,
            bytes,
            received_at: Utc::now(),
        });

        let mut slots = self.slots.write().await;
        let count = match slots.get_mut(room_id) {
            Some(slot) => {
                slot.frame = frame;
                slot.count += 1;
                slot.count
            }
            None => {
                slots.insert(room_id.clone(), Slot { frame, count: 1 });
                1
            }
        };

        Ok(count)
    }

    /// Current frame for the room
    pub async fn load_frame(&self, room_id: &RoomId) -> Result<Arc<Frame>, FrameError> {
        self.slots
            .read()
            .await
            .get(room_id)
            .map(|slot| Arc::clone(&slot.frame))
            .ok_or_else(|| FrameError::NotFound(room_id.to_string()))
    }

    /// Frames received for the room so far
    pub async fn frame_count(&self, room_id: &RoomId) -> u64 {
        self.slots
            .read()
            .await
            .get(room_id)
            .map_or(0, |slot| slot.count)
    }

    /// Drop the room's frame
    pub async fn remove(&self, room_id: &RoomId) -> bool {
        self.slots.write().await.remove(room_id).is_some()
    }

    /// Drop frames for rooms not in `live`, returning how many were dropped
    pub async fn retain_rooms(&self, live: &HashSet<RoomId>) -> usize {
        let mut slots = self.slots.write().await;
        let before = slots.len();
        slots.retain(|room_id, _| live.contains(room_id));
        before - slots.len()
    }

    /// Number of rooms holding a frame
    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }
}
