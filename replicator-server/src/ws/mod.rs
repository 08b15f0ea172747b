//! WebSocket module for real-time room traffic

mod connection;
mod protocol;

pub use connection::ws_handler;
pub use protocol::{
    CODE_INVALID_MESSAGE, CODE_SHUTTING_DOWN, CODE_UNKNOWN_ROOM, ClientEvent, encode_event,
};
