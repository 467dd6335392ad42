use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Behavior switches for a conversation session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Cadence at which captured audio is cut into outbound chunks
    /// Default: 1 second
    pub chunk_interval: Duration,

    /// Write the conversation log through to the history store
    pub persist_history: bool,

    /// Maintain the live-transcript projection (latest text, any role)
    pub live_transcript: bool,

    /// Clear the live transcript when recording stops
    pub reset_on_stop: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            chunk_interval: Duration::from_millis(1000),
            persist_history: true,
            live_transcript: true,
            reset_on_stop: false,
        }
    }
}
