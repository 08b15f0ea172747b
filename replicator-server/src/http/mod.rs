//! HTTP server module

mod api;
mod files;

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;

use crate::AppState;
use crate::ws::ws_handler;

pub use api::{AvailabilityResponse, HealthResponse, MIN_CREDITS};

/// Create the HTTP router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/ping", get(api::ping))
        .route("/api/health", get(api::health))
        .route("/check-availability", get(api::check_availability))
        .route("/files/:room_id/:filename", get(files::room_file))
        .route("/frames/:room_id/latest", get(files::latest_frame))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum_test::TestServer;
    use replicator_core::{MeshClient, MeshClientConfig, OrchestratorConfig};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn offline_state(output_dir: &Path) -> Arc<AppState> {
        Arc::new(AppState::new(
            OrchestratorConfig::default()
                .offline()
                .with_output_dir(output_dir),
            MeshClientConfig::new("", ""),
        ))
    }

    fn live_state(upstream: &MockServer) -> Arc<AppState> {
        let mesh = MeshClientConfig::new("tripo-key", "imgbb-key")
            .with_api_base(format!("{}/v2/openapi", upstream.uri()));
        let client = Arc::new(MeshClient::new(mesh));
        Arc::new(AppState::with_generator(
            OrchestratorConfig::default(),
            client.clone(),
            client,
        ))
    }

    async fn mount_balance(upstream: &MockServer, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/v2/openapi/user/balance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(upstream)
            .await;
    }

    // ==================== Liveness Tests ====================

    #[tokio::test]
    async fn test_ping_returns_pong() {
        let dir = tempfile::tempdir().unwrap();
        let server = TestServer::new(create_router(offline_state(dir.path()))).unwrap();

        let response = server.get("/ping").await;

        response.assert_status_ok();
        response.assert_text("pong");
    }

    #[tokio::test]
    async fn test_health_reports_rooms_and_pipelines() {
        let dir = tempfile::tempdir().unwrap();
        let server = TestServer::new(create_router(offline_state(dir.path()))).unwrap();

        let response = server.get("/api/health").await;

        response.assert_status_ok();
        let health: HealthResponse = response.json();
        assert_eq!(health.status, "ok");
        assert_eq!(health.active_rooms, 0);
        assert_eq!(health.active_pipelines, 0);
        assert!(health.offline);
    }

    // ==================== Availability Tests ====================

    #[tokio::test]
    async fn test_availability_offline_makes_no_upstream_call() {
        let dir = tempfile::tempdir().unwrap();
        let server = TestServer::new(create_router(offline_state(dir.path()))).unwrap();

        let body: AvailabilityResponse = server.get("/check-availability").await.json();

        assert!(body.available);
        assert_eq!(body.balance, Some(9999));
    }

    #[tokio::test]
    async fn test_availability_with_enough_credits() {
        let upstream = MockServer::start().await;
        mount_balance(&upstream, json!({"code": 0, "data": {"balance": "120"}})).await;
        let server = TestServer::new(create_router(live_state(&upstream))).unwrap();

        let body: AvailabilityResponse = server.get("/check-availability").await.json();

        assert!(body.available);
        assert_eq!(body.balance, Some(120));
    }

    #[tokio::test]
    async fn test_availability_with_low_credits() {
        let upstream = MockServer::start().await;
        mount_balance(&upstream, json!({"code": 0, "data": {"balance": "12"}})).await;
        let server = TestServer::new(create_router(live_state(&upstream))).unwrap();

        let body: AvailabilityResponse = server.get("/check-availability").await.json();

        assert!(!body.available);
        assert_eq!(body.reason.as_deref(), Some("insufficient_credits"));
    }

    #[tokio::test]
    async fn test_availability_upstream_error_is_still_200() {
        let upstream = MockServer::start().await;
        mount_balance(&upstream, json!({"code": 1002})).await;
        let server = TestServer::new(create_router(live_state(&upstream))).unwrap();

        let response = server.get("/check-availability").await;

        response.assert_status_ok();
        let body: AvailabilityResponse = response.json();
        assert!(!body.available);
        assert_eq!(body.reason.as_deref(), Some("api_error"));
        assert_eq!(body.balance, None);
    }

    // ==================== File Serving Tests ====================

    #[tokio::test]
    async fn test_serves_room_model() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("r1")).unwrap();
        std::fs::write(dir.path().join("r1/reconstruction.glb"), b"glTF").unwrap();
        let server = TestServer::new(create_router(offline_state(dir.path()))).unwrap();

        let response = server.get("/files/r1/reconstruction.glb").await;

        response.assert_status_ok();
        assert_eq!(response.as_bytes().as_ref(), b"glTF");
    }

    #[tokio::test]
    async fn test_missing_room_file_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let server = TestServer::new(create_router(offline_state(dir.path()))).unwrap();

        let response = server.get("/files/r1/reconstruction.glb").await;

        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serves_latest_frame() {
        let dir = tempfile::tempdir().unwrap();
        let state = offline_state(dir.path());
        let room = replicator_core::RoomId::parse("r1").unwrap();
        state
            .orchestrator
            .join_session("c1", room.clone(), replicator_core::Role::Sensor)
            .await;
        state
            .orchestrator
            .send_frame(&room, "data:image/png;base64,AAAA")
            .await
            .unwrap();
        let server = TestServer::new(create_router(state)).unwrap();

        let response = server.get("/frames/r1/latest").add_query_param("n", 1).await;

        response.assert_status_ok();
        assert_eq!(response.header("content-type"), "image/png");
        assert_eq!(response.as_bytes().as_ref(), &[0u8, 0, 0]);
    }

    #[tokio::test]
    async fn test_latest_frame_without_capture_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let server = TestServer::new(create_router(offline_state(dir.path()))).unwrap();

        let response = server.get("/frames/r1/latest").await;

        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dot_dot_room_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let server = TestServer::new(create_router(offline_state(dir.path()))).unwrap();

        let response = server.get("/files/../reconstruction.glb").await;

        assert_ne!(response.status_code(), StatusCode::OK);
    }
}
