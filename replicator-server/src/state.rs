//! Shared application state for the replicator server

use std::sync::Arc;

use chrono::{DateTime, Utc};
use replicator_core::{
    MeshClient, MeshClientConfig, MeshGenerator, Orchestrator, OrchestratorConfig, RoomBus,
};
use tokio_util::sync::CancellationToken;

/// Shared application state accessible by all handlers
#[derive(Clone)]
pub struct AppState {
    /// Room lifecycle and pipeline coordinator
    pub orchestrator: Arc<Orchestrator>,
    /// Room event fan-out; every WebSocket connection subscribes
    pub bus: Arc<RoomBus>,
    /// Client used for the credit check
    pub mesh_client: Arc<MeshClient>,
    /// Cancelled when open WebSocket connections should close
    pub closing: CancellationToken,
    /// When the server started
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create state whose pipelines run through a [`MeshClient`]
    pub fn new(config: OrchestratorConfig, mesh: MeshClientConfig) -> Self {
        let mesh_client = Arc::new(MeshClient::new(mesh));
        let generator: Arc<dyn MeshGenerator> = mesh_client.clone();
        Self::with_generator(config, generator, mesh_client)
    }

    /// Offline state for tests: canned model, no upstream calls
    pub fn new_for_testing() -> Self {
        Self::new(
            OrchestratorConfig::default().offline(),
            MeshClientConfig::new("", ""),
        )
    }

    /// Create state with a custom pipeline generator (for testing)
    pub fn with_generator(
        config: OrchestratorConfig,
        generator: Arc<dyn MeshGenerator>,
        mesh_client: Arc<MeshClient>,
    ) -> Self {
        let bus = Arc::new(RoomBus::default());
        let orchestrator = Arc::new(Orchestrator::new(config, generator, bus.clone()));
        Self {
            orchestrator,
            bus,
            mesh_client,
            closing: CancellationToken::new(),
            started_at: Utc::now(),
        }
    }

    /// Returns how long the server has been running
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }

    pub fn is_offline(&self) -> bool {
        self.orchestrator.config().mode.is_offline()
    }
}
