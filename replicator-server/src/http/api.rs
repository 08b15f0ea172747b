//! REST API handlers

use std::sync::Arc;

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::AppState;

/// Credits needed to start one reconstruction
pub const MIN_CREDITS: u64 = 30;

/// Balance reported in offline mode
const OFFLINE_BALANCE: u64 = 9999;

/// Liveness probe
pub async fn ping() -> &'static str {
    "pong"
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status of the server
    pub status: String,
    /// Server version
    pub version: String,
    /// Seconds since server started
    pub uptime_seconds: i64,
    /// Rooms with at least one participant
    pub active_rooms: usize,
    /// Pipelines running or waiting for a slot
    pub active_pipelines: usize,
    /// Pipelines skip upstream services
    pub offline: bool,
}

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let active_rooms = state.orchestrator.registry().session_count().await;

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        active_rooms,
        active_pipelines: state.orchestrator.active_pipelines(),
        offline: state.is_offline(),
    })
}

/// Whether a reconstruction can be started right now
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AvailabilityResponse {
    fn from_balance(balance: u64) -> Self {
        let available = balance >= MIN_CREDITS;
        Self {
            available,
            balance: Some(balance),
            reason: (!available).then(|| "insufficient_credits".to_string()),
        }
    }
}

/// GET /check-availability - credit check against the reconstruction service
///
/// Upstream failures are reported in the body; the status is always 200.
pub async fn check_availability(
    State(state): State<Arc<AppState>>,
) -> Json<AvailabilityResponse> {
    if state.is_offline() {
        return Json(AvailabilityResponse::from_balance(OFFLINE_BALANCE));
    }

    match state.mesh_client.check_balance().await {
        Ok(balance) => Json(AvailabilityResponse::from_balance(balance)),
        Err(e) => {
            warn!(error = %e, "Balance check failed");
            Json(AvailabilityResponse {
                available: false,
                balance: None,
                reason: Some("api_error".to_string()),
            })
        }
    }
}
