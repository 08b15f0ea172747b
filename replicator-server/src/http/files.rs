//! Serving generated room output
//!
//! `GET /files/{room_id}/{filename}` reads from `output_dir/room_id/`. Both
//! path components are validated so a request can never leave its room's
//! directory. `GET /frames/{room_id}/latest` serves the room's current frame
//! straight from memory.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use replicator_core::RoomId;
use tracing::warn;

use crate::AppState;

/// Handler for files produced by a room's pipeline
pub async fn room_file(
    State(state): State<Arc<AppState>>,
    Path((room_id, filename)): Path<(String, String)>,
) -> Response {
    let Ok(room_id) = RoomId::parse(&room_id) else {
        return (StatusCode::BAD_REQUEST, "Invalid room id").into_response();
    };
    if !is_plain_file_name(&filename) {
        return (StatusCode::BAD_REQUEST, "Invalid file name").into_response();
    }

    let path = state
        .orchestrator
        .config()
        .output_dir
        .join(room_id.as_str())
        .join(&filename);

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(&filename).first_or_octet_stream();
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, mime.as_ref())
                .body(Body::from(bytes))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, "File not found").into_response()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read room file");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Handler for a room's most recent captured frame
pub async fn latest_frame(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Response {
    let Ok(room_id) = RoomId::parse(&room_id) else {
        return (StatusCode::BAD_REQUEST, "Invalid room id").into_response();
    };

    let Ok(frame) = state.orchestrator.frames().load_frame(&room_id).await else {
        return (StatusCode::NOT_FOUND, "No frame captured").into_response();
    };

    let mime = frame.mime.as_deref().unwrap_or("application/octet-stream");
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime)
        .header(header::CACHE_CONTROL, "no-store")
        .body(Body::from(frame.bytes.clone()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_file_names() {
        assert!(is_plain_file_name("reconstruction.glb"));
        assert!(is_plain_file_name("preview.v2.png"));
    }

    #[test]
    fn test_rejects_path_like_names() {
        assert!(!is_plain_file_name(""));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name("a/b.glb"));
        assert!(!is_plain_file_name("..\\secret"));
    }
}
