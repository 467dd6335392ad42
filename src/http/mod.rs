//! HTTP API for external presentation layers
//!
//! This module exposes the session controller over a local REST API:
//! - GET /session - Current session view
//! - GET /session/history - Conversation log
//! - POST /session/recording/start - Start recording
//! - POST /session/recording/stop - Stop recording
//! - POST /session/recording/toggle - Toggle recording
//! - POST /session/history/toggle - Show/hide the history panel
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
