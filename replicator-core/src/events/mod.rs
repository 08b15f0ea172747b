//! Room-scoped event system

pub mod bus;
pub mod types;

pub use bus::{RoomBroadcaster, RoomBus};
pub use types::{RoomEvent, RoomMessage};
