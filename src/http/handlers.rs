use super::state::AppState;
use crate::error::LiveError;
use crate::session::{LiveStatus, SessionStats};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::{error, info};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct LiveStatusResponse {
    /// Display string: OFFLINE, CONNECTING, LISTENING, ERROR, DISCONNECTED
    pub status: LiveStatus,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: LiveStatus,
}

fn status_response(state: &AppState) -> LiveStatusResponse {
    let stats = state.live.stats();
    LiveStatusResponse {
        status: stats.status,
        stats,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /live/connect
/// Go live: open the microphone and connect to the model
pub async fn connect(State(state): State<AppState>) -> impl IntoResponse {
    info!("Live connect requested");

    match state.live.connect().await {
        Ok(()) => (StatusCode::OK, Json(status_response(&state))).into_response(),
        Err(e) => {
            error!("Failed to go live: {}", e);
            let code = match e {
                LiveError::Permission(_) | LiveError::Playback(_) => StatusCode::SERVICE_UNAVAILABLE,
                LiveError::Transport(_) => StatusCode::BAD_GATEWAY,
                LiveError::Decode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                code,
                Json(ErrorResponse {
                    error: e.to_string(),
                    status: state.live.status(),
                }),
            )
                .into_response()
        }
    }
}

/// POST /live/disconnect
/// Stop the live session (no-op when offline)
pub async fn disconnect(State(state): State<AppState>) -> impl IntoResponse {
    info!("Live disconnect requested");

    state.live.disconnect().await;

    (StatusCode::OK, Json(status_response(&state)))
}

/// GET /live/status
/// Current status string and session statistics
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(status_response(&state)))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
