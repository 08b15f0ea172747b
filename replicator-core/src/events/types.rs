//! Events emitted to room participants

use serde::{Deserialize, Serialize};

use crate::session::RoomId;

/// Step label emitted before the upload phase
pub const STEP_UPLOADING: &str = "Uploading...";
/// Step label emitted before submit/poll/fetch
pub const STEP_GENERATING: &str = "Generating Mesh...";
/// Step label emitted by the offline pipeline
pub const STEP_GENERATING_OFFLINE: &str = "Generating Mesh... (offline)";
/// Terminal label for any non-success outcome
pub const STEP_FAILED: &str = "Failed";
/// Label for a `process_3d` rejected because one is already running
pub const STEP_BUSY: &str = "Busy";
/// Label for a `process_3d` on a room without a frame
pub const STEP_NO_IMAGE: &str = "Error: No image found";

/// Server → room event
///
/// Serialized as `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RoomEvent {
    /// A sensor connected to the room
    SessionStatus { status: String },

    /// A frame was stored; `count` is the running total for the room
    ///
    /// `preview` is a fetchable reference to the stored frame.
    FrameReceived {
        count: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        preview: Option<String>,
    },

    /// Pipeline progress label
    ProcessingStatus { step: String },

    /// Final success signal with a fetchable model reference
    ModelReady { url: String },

    /// Recoverable input error
    Error { code: String, message: String },
}

impl RoomEvent {
    pub fn connected() -> Self {
        Self::SessionStatus {
            status: "connected".to_string(),
        }
    }

    pub fn processing(step: impl Into<String>) -> Self {
        Self::ProcessingStatus { step: step.into() }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionStatus { .. } => "session_status",
            Self::FrameReceived { .. } => "frame_received",
            Self::ProcessingStatus { .. } => "processing_status",
            Self::ModelReady { .. } => "model_ready",
            Self::Error { .. } => "error",
        }
    }
}

/// An event addressed to a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMessage {
    pub room_id: RoomId,
    pub event: RoomEvent,
}
