//! replicator-server - HTTP and WebSocket gateway for capture rooms
//!
//! This crate owns the [`Orchestrator`](replicator_core::Orchestrator) and the
//! room event bus. Sensors and viewers connect to `/ws`; generated models are
//! served from `/files`.

mod error;
pub mod http;
mod state;
pub mod ws;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};

pub use error::ServerError;
pub use http::create_router;
pub use state::AppState;

/// The main replicator server
pub struct ReplicatorServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl ReplicatorServer {
    /// Create a server around prepared state
    pub fn with_state(config: ServerConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the shared application state
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Run the server until Ctrl-C, binding to the configured address
    ///
    /// On Ctrl-C new pipelines are refused and running ones get
    /// `drain_timeout` to finish before connections close.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.clone(),
                source: e,
            })?;

        info!("replicator server listening on {}", addr);

        let state = Arc::clone(&self.state);
        let drain_timeout = self.config.drain_timeout;
        let shutdown = async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            info!(
                active = state.orchestrator.active_pipelines(),
                "Shutdown requested, draining pipelines"
            );
            if !state.orchestrator.drain(drain_timeout).await {
                warn!("Pipelines still running after drain timeout");
            }
        };

        self.serve(listener, shutdown).await
    }

    /// Run on an already bound listener until the process ends (for testing)
    pub async fn run_with_listener(self, listener: TcpListener) -> Result<(), ServerError> {
        self.serve(listener, std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then close connections
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let janitor = self.state.orchestrator.spawn_janitor();
        let closing = self.state.closing.clone();
        let router = create_router(Arc::clone(&self.state));

        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                closing.cancel();
            })
            .await
            .map_err(|e| ServerError::Internal(e.to_string()));

        self.state.orchestrator.shutdown();
        janitor.abort();
        info!("replicator server stopped");
        result
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// How long shutdown waits for running pipelines
    pub drain_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5005,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Create a new ServerConfig with the specified host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Returns the socket address string (e.g., "0.0.0.0:5005")
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5005);
    }

    #[test]
    fn test_server_config_addr() {
        let config = ServerConfig::new("127.0.0.1", 8080);
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_server_with_state() {
        let config = ServerConfig::new("127.0.0.1", 9000);
        let state = Arc::new(AppState::new_for_testing());
        let server = ReplicatorServer::with_state(config, Arc::clone(&state));
        assert_eq!(server.config().port, 9000);
        assert!(Arc::ptr_eq(&server.state(), &state));
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown_signal() {
        let state = Arc::new(AppState::new_for_testing());
        let server = ReplicatorServer::with_state(ServerConfig::default(), Arc::clone(&state));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        server.serve(listener, async {}).await.unwrap();

        assert!(state.orchestrator.is_shutting_down());
        assert!(state.closing.is_cancelled());
    }
}
