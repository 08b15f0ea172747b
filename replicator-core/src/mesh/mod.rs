//! Mesh generation against the external image host and reconstruction service

pub mod client;
pub mod poll;
pub mod types;

pub use client::{MeshClient, MeshClientConfig, MeshGenerator};
pub use poll::{StatusReport, poll_until_terminal};
pub use types::{MeshOutcome, ReconstructionTask, TaskStatus};
