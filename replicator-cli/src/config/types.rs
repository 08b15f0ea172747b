use std::path::PathBuf;
use std::time::Duration;

use replicator_core::config::DEFAULT_OUTPUT_DIR;
use replicator_core::mesh::client::{DEFAULT_API_BASE, DEFAULT_UPLOAD_URL};
use replicator_core::{JanitorConfig, MeshClientConfig, OrchestratorConfig, PollPolicy};
use serde::{Deserialize, Serialize};

/// Default port for the replicator server
pub const DEFAULT_PORT: u16 = 5005;
/// Default host for the replicator server
pub const DEFAULT_HOST: &str = "0.0.0.0";

const DEFAULT_MAX_PIPELINES: usize = 4;
const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 30;

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawReplicatorConfig {
    #[serde(default)]
    pub server: RawServerSection,

    #[serde(default)]
    pub api: RawApiSection,

    #[serde(default)]
    pub poll: RawPollSection,

    #[serde(default)]
    pub janitor: RawJanitorSection,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub output_dir: Option<PathBuf>,
    pub offline: Option<bool>,
    pub max_concurrent_pipelines: Option<usize>,
    pub drain_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawApiSection {
    pub tripo_api_key: Option<String>,
    pub imgbb_api_key: Option<String>,
    pub api_base: Option<String>,
    pub upload_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawPollSection {
    /// Seconds between status queries
    pub interval: Option<f64>,
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawJanitorSection {
    pub interval_secs: Option<u64>,
    pub max_age_secs: Option<u64>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReplicatorConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub api: ApiSection,

    #[serde(default)]
    pub poll: PollPolicy,

    #[serde(default)]
    pub janitor: JanitorSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    /// Root of per-room output
    pub output_dir: PathBuf,
    /// Skip upstream services and return a canned model
    pub offline: bool,
    pub max_concurrent_pipelines: usize,
    /// Seconds shutdown waits for running pipelines
    pub drain_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            offline: false,
            max_concurrent_pipelines: DEFAULT_MAX_PIPELINES,
            drain_timeout_secs: DEFAULT_DRAIN_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tripo_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imgbb_api_key: Option<String>,
    pub api_base: String,
    pub upload_url: String,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            tripo_api_key: None,
            imgbb_api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JanitorSection {
    pub interval_secs: u64,
    pub max_age_secs: u64,
}

impl Default for JanitorSection {
    fn default() -> Self {
        let defaults = JanitorConfig::default();
        Self {
            interval_secs: defaults.interval.as_secs(),
            max_age_secs: defaults.max_age.as_secs(),
        }
    }
}

impl ReplicatorConfig {
    /// Copy with API keys masked, for display
    pub fn redacted(&self) -> Self {
        let mask = |key: &Option<String>| key.as_ref().map(|_| "<redacted>".to_string());
        let mut config = self.clone();
        config.api.tripo_api_key = mask(&self.api.tripo_api_key);
        config.api.imgbb_api_key = mask(&self.api.imgbb_api_key);
        config
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let mut config = OrchestratorConfig::default()
            .with_output_dir(&self.server.output_dir)
            .with_max_concurrent_pipelines(self.server.max_concurrent_pipelines);
        if self.server.offline {
            config = config.offline();
        }
        config.janitor = JanitorConfig {
            interval: Duration::from_secs(self.janitor.interval_secs),
            max_age: Duration::from_secs(self.janitor.max_age_secs),
        };
        config
    }

    pub fn mesh_client_config(&self) -> MeshClientConfig {
        MeshClientConfig::new(
            self.api.tripo_api_key.clone().unwrap_or_default(),
            self.api.imgbb_api_key.clone().unwrap_or_default(),
        )
        .with_api_base(&self.api.api_base)
        .with_upload_url(&self.api.upload_url)
        .with_poll(self.poll)
    }

    pub fn server_config(&self) -> replicator_server::ServerConfig {
        let mut config = replicator_server::ServerConfig::new(&self.server.host, self.server.port);
        config.drain_timeout = Duration::from_secs(self.server.drain_timeout_secs);
        config
    }
}
