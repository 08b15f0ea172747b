use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use replicator_core::PollPolicy;

use super::types::{
    ApiSection, DEFAULT_HOST, DEFAULT_PORT, JanitorSection, RawApiSection, RawJanitorSection,
    RawPollSection, RawReplicatorConfig, RawServerSection, ReplicatorConfig, ServerSection,
};

/// Environment variables read on top of the config files
const ENV_TRIPO_API_KEY: &str = "TRIPO_API_KEY";
const ENV_IMGBB_API_KEY: &str = "IMGBB_API_KEY";
const ENV_PORT: &str = "PORT";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project + environment)
    pub fn load() -> Result<ReplicatorConfig> {
        let mut raw = RawReplicatorConfig::default();

        // Layer 1: User config
        if let Some(user_path) = Self::user_config_path()
            && user_path.exists()
        {
            raw = Self::merge_raw(raw, Self::read_raw(&user_path)?);
        }

        // Layer 2: Project config
        let project_path = Self::project_config_path();
        if project_path.exists() {
            raw = Self::merge_raw(raw, Self::read_raw(&project_path)?);
        }

        // Layer 3: Environment
        let raw = Self::apply_env(raw, |key| std::env::var(key).ok())?;

        Ok(Self::finalize(raw))
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "replicator").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get project config path
    /// Can be overridden with REPLICATOR_PROJECT_CONFIG_DIR env var
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("REPLICATOR_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".replicator/config.toml")
        }
    }

    fn read_raw(path: &Path) -> Result<RawReplicatorConfig> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Overlay environment values; `lookup` returns a variable's value if set
    fn apply_env<F>(mut raw: RawReplicatorConfig, lookup: F) -> Result<RawReplicatorConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(key) = non_empty(ENV_TRIPO_API_KEY) {
            raw.api.tripo_api_key = Some(key);
        }
        if let Some(key) = non_empty(ENV_IMGBB_API_KEY) {
            raw.api.imgbb_api_key = Some(key);
        }
        if let Some(port) = non_empty(ENV_PORT) {
            let port = port
                .trim()
                .parse()
                .with_context(|| format!("{ENV_PORT} is not a valid port: {port}"))?;
            raw.server.port = Some(port);
        }

        Ok(raw)
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawReplicatorConfig, overlay: RawReplicatorConfig) -> RawReplicatorConfig {
        RawReplicatorConfig {
            server: RawServerSection {
                host: overlay.server.host.or(base.server.host),
                port: overlay.server.port.or(base.server.port),
                output_dir: overlay.server.output_dir.or(base.server.output_dir),
                offline: overlay.server.offline.or(base.server.offline),
                max_concurrent_pipelines: overlay
                    .server
                    .max_concurrent_pipelines
                    .or(base.server.max_concurrent_pipelines),
                drain_timeout_secs: overlay
                    .server
                    .drain_timeout_secs
                    .or(base.server.drain_timeout_secs),
            },
            api: RawApiSection {
                tripo_api_key: overlay.api.tripo_api_key.or(base.api.tripo_api_key),
                imgbb_api_key: overlay.api.imgbb_api_key.or(base.api.imgbb_api_key),
                api_base: overlay.api.api_base.or(base.api.api_base),
                upload_url: overlay.api.upload_url.or(base.api.upload_url),
            },
            poll: RawPollSection {
                interval: overlay.poll.interval.or(base.poll.interval),
                max_attempts: overlay.poll.max_attempts.or(base.poll.max_attempts),
            },
            janitor: RawJanitorSection {
                interval_secs: overlay.janitor.interval_secs.or(base.janitor.interval_secs),
                max_age_secs: overlay.janitor.max_age_secs.or(base.janitor.max_age_secs),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawReplicatorConfig) -> ReplicatorConfig {
        let server = ServerSection::default();
        let api = ApiSection::default();
        let poll = PollPolicy::default();
        let janitor = JanitorSection::default();

        ReplicatorConfig {
            server: ServerSection {
                host: raw.server.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port: raw.server.port.unwrap_or(DEFAULT_PORT),
                output_dir: raw.server.output_dir.unwrap_or(server.output_dir),
                offline: raw.server.offline.unwrap_or(server.offline),
                max_concurrent_pipelines: raw
                    .server
                    .max_concurrent_pipelines
                    .unwrap_or(server.max_concurrent_pipelines),
                drain_timeout_secs: raw
                    .server
                    .drain_timeout_secs
                    .unwrap_or(server.drain_timeout_secs),
            },
            api: ApiSection {
                tripo_api_key: raw.api.tripo_api_key,
                imgbb_api_key: raw.api.imgbb_api_key,
                api_base: raw.api.api_base.unwrap_or(api.api_base),
                upload_url: raw.api.upload_url.unwrap_or(api.upload_url),
            },
            poll: PollPolicy::new(
                raw.poll
                    .interval
                    .filter(|secs| secs.is_finite() && *secs > 0.0)
                    .map(Duration::from_secs_f64)
                    .unwrap_or(poll.interval),
                raw.poll.max_attempts.unwrap_or(poll.max_attempts),
            ),
            janitor: JanitorSection {
                interval_secs: raw.janitor.interval_secs.unwrap_or(janitor.interval_secs),
                max_age_secs: raw.janitor.max_age_secs.unwrap_or(janitor.max_age_secs),
            },
        }
    }

    /// Load config from a specific path (for testing)
    #[cfg(test)]
    pub fn load_from_path(path: &Path) -> Result<ReplicatorConfig> {
        if path.exists() {
            Ok(Self::finalize(Self::read_raw(path)?))
        } else {
            Ok(ReplicatorConfig::default())
        }
    }
}
