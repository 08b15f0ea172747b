//! Shared test utilities for replicator-server integration tests

pub mod client;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use replicator_core::{MeshClientConfig, OrchestratorConfig, PipelineMode};
use replicator_server::{AppState, ReplicatorServer, ServerConfig};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Canned model returned by test servers
#[allow(dead_code)]
pub const TEST_MODEL_URL: &str = "https://models.test/duck.glb";

/// Creates an offline test server with a short pipeline delay
///
/// The returned directory holds the server's output and is removed on drop.
#[allow(dead_code)]
pub async fn create_test_server() -> (Arc<AppState>, SocketAddr, TempDir) {
    create_test_server_with_delay(Duration::from_millis(50)).await
}

/// Creates an offline test server whose pipeline takes `delay`
#[allow(dead_code)]
pub async fn create_test_server_with_delay(
    delay: Duration,
) -> (Arc<AppState>, SocketAddr, TempDir) {
    let output = tempfile::tempdir().unwrap();
    let config = OrchestratorConfig::default()
        .with_output_dir(output.path())
        .with_mode(PipelineMode::Offline {
            model_url: TEST_MODEL_URL.to_string(),
            delay,
        });
    let state = Arc::new(AppState::new(config, MeshClientConfig::new("", "")));

    let server = ReplicatorServer::with_state(ServerConfig::default(), Arc::clone(&state));
    let addr = spawn_server(server).await;

    (state, addr, output)
}

/// Spawns server in background task, returns bound address
async fn spawn_server(server: ReplicatorServer) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = server.run_with_listener(listener).await;
    });

    // Brief delay to ensure server is accepting connections
    tokio::time::sleep(Duration::from_millis(10)).await;

    addr
}
