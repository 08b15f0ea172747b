//! Replicator serve command
//!
//! Runs the server in the foreground:
//! - WebSocket rooms for sensors and viewers on `/ws`
//! - Credit check, health and generated model files over HTTP

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Args;
use replicator_server::{AppState, ReplicatorServer};
use tracing::{info, warn};

use crate::config::{ConfigLoader, ReplicatorConfig};

/// Arguments for the serve command
#[derive(Debug, Default, Args)]
pub struct ServeArgs {
    /// Port to listen on (overrides config and PORT)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Return a canned model instead of calling upstream services
    #[arg(long)]
    pub offline: bool,

    /// Directory for per-room output
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

impl ServeArgs {
    /// Layer command-line flags over loaded configuration
    fn apply(&self, mut config: ReplicatorConfig) -> ReplicatorConfig {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if self.offline {
            config.server.offline = true;
        }
        if let Some(dir) = &self.output_dir {
            config.server.output_dir = dir.clone();
        }
        config
    }
}

/// Live mode needs both upstream keys
fn check_credentials(config: &ReplicatorConfig) -> Result<()> {
    if config.server.offline {
        return Ok(());
    }
    if config.api.tripo_api_key.is_none() {
        bail!("TRIPO_API_KEY is not set; set it or run with --offline");
    }
    if config.api.imgbb_api_key.is_none() {
        bail!("IMGBB_API_KEY is not set; set it or run with --offline");
    }
    Ok(())
}

/// Run the serve command
pub async fn run(args: ServeArgs) -> Result<()> {
    let config = args.apply(ConfigLoader::load()?);
    check_credentials(&config)?;

    if config.server.offline {
        warn!("Offline mode: pipelines return a canned model");
    }
    info!(
        "Starting replicator server on {}:{} (output: {})",
        config.server.host,
        config.server.port,
        config.server.output_dir.display()
    );

    let state = Arc::new(AppState::new(
        config.orchestrator_config(),
        config.mesh_client_config(),
    ));
    let server = ReplicatorServer::with_state(config.server_config(), state);
    server.run().await.map_err(Into::into)
}
