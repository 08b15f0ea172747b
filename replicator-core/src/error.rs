//! Error types for replicator-core

use thiserror::Error;

/// Top-level error type for replicator-core
#[derive(Error, Debug)]
pub enum ReplicatorError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Mesh generation error: {0}")]
    Mesh(#[from] MeshError),
}

/// Errors related to room membership and the per-room state machine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Room not found: {0}")]
    UnknownRoom(String),

    #[error("Invalid room id: {0}")]
    InvalidRoomId(String),

    #[error("Connection {0} has not joined a room")]
    NotInRoom(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Room {0} already has a reconstruction in progress")]
    Busy(String),

    #[error("Shutting down, no new pipelines are accepted")]
    ShuttingDown,
}

/// Errors from decoding and storing captured frames
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Malformed frame payload: {0}")]
    MalformedPayload(String),

    #[error("Frame could not be decoded: {0}")]
    Decode(String),

    #[error("No frame captured for room {0}")]
    NotFound(String),
}

/// Errors from the external image host and reconstruction service
#[derive(Error, Debug)]
pub enum MeshError {
    #[error("Image upload failed: {0}")]
    Upload(String),

    #[error("Task submission rejected with code {code}")]
    Submit { code: i64 },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Upstream returned code {code}")]
    Upstream { code: i64 },

    #[error("Task succeeded without a model URL")]
    MissingModelUrl,

    #[error("Model download failed: {0}")]
    Download(String),

    #[error("Balance query failed: {0}")]
    Balance(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
