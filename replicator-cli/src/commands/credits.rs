//! Credit balance on the reconstruction service

use anyhow::{Result, bail};
use replicator_core::MeshClient;
use replicator_server::http::MIN_CREDITS;

use crate::config::ConfigLoader;

/// Print the remaining credits
pub async fn run() -> Result<()> {
    let config = ConfigLoader::load()?;
    if config.api.tripo_api_key.is_none() {
        bail!("TRIPO_API_KEY is not set");
    }

    let client = MeshClient::new(config.mesh_client_config());
    let balance = client.check_balance().await?;

    println!("Credits: {}", balance);
    if balance < MIN_CREDITS {
        println!("Not enough for a reconstruction (needs {})", MIN_CREDITS);
    }
    Ok(())
}
