use super::state::AppState;
use crate::session::UserIntent;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::{info, warn};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Queue an intent and answer with the view as it stands
///
/// The intent is handled asynchronously; clients poll `GET /session` (or the
/// returned view's successors) to observe its effect.
fn submit(state: &AppState, intent: UserIntent) -> axum::response::Response {
    info!("HTTP intent: {:?}", intent);

    if !state.session.send(intent) {
        warn!("Session controller is not running");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "Session controller is not running".to_string(),
            }),
        )
            .into_response();
    }

    (StatusCode::ACCEPTED, Json(state.session.view())).into_response()
}

/// POST /session/recording/start
pub async fn start_recording(State(state): State<AppState>) -> impl IntoResponse {
    submit(&state, UserIntent::Start)
}

/// POST /session/recording/stop
pub async fn stop_recording(State(state): State<AppState>) -> impl IntoResponse {
    submit(&state, UserIntent::Stop)
}

/// POST /session/recording/toggle
pub async fn toggle_recording(State(state): State<AppState>) -> impl IntoResponse {
    submit(&state, UserIntent::ToggleRecording)
}

/// POST /session/history/toggle
pub async fn toggle_history(State(state): State<AppState>) -> impl IntoResponse {
    submit(&state, UserIntent::ToggleHistoryView)
}

/// GET /session
/// Current session view
pub async fn get_session(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.session.view()))
}

/// GET /session/history
/// Full conversation log in arrival order
pub async fn get_history(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.session.view().history))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
