//! Room membership and per-room state

pub mod registry;
pub mod state;

pub use registry::{JoinResult, LeaveOutcome, SessionRegistry};
pub use state::{ConnectionId, Role, RoomId, Session, SessionState};
