//! Orchestrator configuration
//!
//! Everything that changes how a pipeline runs is carried here and handed to
//! the [`Orchestrator`](crate::Orchestrator) at construction.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Model returned by the offline pipeline
pub const CANNED_MODEL_URL: &str =
    "https://raw.githack.com/KhronosGroup/glTF-Sample-Models/master/2.0/Duck/glTF-Binary/Duck.glb";

/// Default directory for per-room output
pub const DEFAULT_OUTPUT_DIR: &str = "scans";

/// How `process_3d` produces a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineMode {
    /// Call the image host and the reconstruction service
    Live,
    /// Skip all upstream calls and return `model_url` after `delay`
    Offline { model_url: String, delay: Duration },
}

impl PipelineMode {
    /// Offline mode with the canned model and a short delay
    pub fn offline() -> Self {
        Self::Offline {
            model_url: CANNED_MODEL_URL.to_string(),
            delay: Duration::from_millis(2500),
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline { .. })
    }
}

/// Fixed-interval polling budget for a reconstruction task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Delay before each status query
    #[serde(with = "duration_secs")]
    pub interval: Duration,
    /// Status queries allowed before the task is declared timed out
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(4),
            max_attempts: 120,
        }
    }
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Upper bound on time spent polling
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// Housekeeping for abandoned room output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JanitorConfig {
    /// How often the sweep runs
    pub interval: Duration,
    /// Output directories older than this are removed
    pub max_age: Duration,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(600),
            max_age: Duration::from_secs(3600),
        }
    }
}

/// Configuration for the session orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub mode: PipelineMode,
    /// Root directory; each room writes under `output_dir/<room_id>/`
    pub output_dir: PathBuf,
    /// Upper bound on pipelines running at once; extra ones wait for a slot
    pub max_concurrent_pipelines: usize,
    pub janitor: JanitorConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            mode: PipelineMode::Live,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            max_concurrent_pipelines: 4,
            janitor: JanitorConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Switch to offline mode with the canned model
    #[must_use]
    pub fn offline(mut self) -> Self {
        self.mode = PipelineMode::offline();
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: PipelineMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_max_concurrent_pipelines(mut self, max: usize) -> Self {
        self.max_concurrent_pipelines = max.max(1);
        self
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
