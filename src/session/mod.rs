//! Conversation session management
//!
//! This module provides the `SessionController` which owns and coordinates:
//! - Microphone capture and chunk forwarding
//! - The conversation channel to the remote service
//! - Playback of assistant speech, including barge-in
//! - The conversation log and its live-transcript projection
//!
//! Callers interact with a running controller through a `SessionHandle`.

mod config;
mod controller;
mod handle;
mod stats;

pub use config::SessionOptions;
pub use controller::{SessionComponents, SessionController};
pub use handle::{SessionHandle, UserIntent};
pub use stats::{SessionPhase, SessionStats, SessionView};
