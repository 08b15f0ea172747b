//! Captured frame storage

pub mod store;

pub use store::{Frame, FrameStore, decode_data_url, frame_preview_url};
