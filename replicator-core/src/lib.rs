//! replicator-core: Core library for the replicator capture service
//!
//! This crate provides the pieces that coordinate a capture room:
//!
//! - **Session registry** - [`SessionRegistry`] tracks which connection belongs to which room
//! - **Frame store** - [`FrameStore`] keeps the latest captured frame per room
//! - **Mesh generation** - [`MeshClient`] drives the upload → submit → poll → fetch pipeline
//! - **Orchestration** - [`Orchestrator`] sequences the pipeline and reports progress to rooms
//! - **Room events** - [`RoomEvent`] and [`RoomBus`] for fanning events out to participants
//!
//! # Architecture
//!
//! ```text
//! inbound event ──► Orchestrator ──► SessionRegistry / FrameStore
//!                        │
//!                        ├──► MeshGenerator (spawned pipeline task)
//!                        │
//!                        └──► RoomBroadcaster ──► room participants
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod frames;
pub mod janitor;
pub mod mesh;
pub mod orchestrator;
pub mod session;

pub use config::{JanitorConfig, OrchestratorConfig, PipelineMode, PollPolicy};
pub use error::{FrameError, MeshError, ReplicatorError, SessionError};
pub use events::{RoomBroadcaster, RoomBus, RoomEvent, RoomMessage};
pub use frames::{Frame, FrameStore, decode_data_url, frame_preview_url};
pub use janitor::Janitor;
pub use mesh::{
    MeshClient, MeshClientConfig, MeshGenerator, MeshOutcome, ReconstructionTask, TaskStatus,
};
pub use orchestrator::{JoinOutcome, Orchestrator, ProcessOutcome};
pub use session::{
    ConnectionId, JoinResult, LeaveOutcome, Role, RoomId, Session, SessionRegistry, SessionState,
};
