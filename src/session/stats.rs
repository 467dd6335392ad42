use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::history::Turn;
use crate::transport::ChannelState;

/// Orchestration state of the session controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Stopped,
    Starting,
    Active,
    Stopping,
}

/// Statistics about the current (or most recent) recording
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    /// Identifier of the recording, assigned on start
    pub session_id: Option<String>,

    /// When the recording started
    pub started_at: Option<DateTime<Utc>>,

    /// Audio chunks forwarded to the channel
    pub chunks_sent: u64,

    /// Audio chunks dropped because the channel was not open
    pub chunks_dropped: u64,

    /// Inbound events processed
    pub events_received: u64,

    /// Number of times speech was interrupted by the user (barge-in)
    pub interruptions: u64,
}

/// Everything a presentation layer needs to render the session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub phase: SessionPhase,

    /// Microphone is capturing
    pub is_recording: bool,

    /// Assistant speech is playing
    pub is_speaking: bool,

    pub channel_state: ChannelState,

    /// Latest text received, regardless of role
    pub live_transcript: String,

    /// Full conversation log
    pub history: Vec<Turn>,

    /// Whether the history panel is shown
    pub history_visible: bool,

    /// The channel dropped while recording
    pub disconnected: bool,

    /// Most recent user-visible failure
    pub last_error: Option<String>,

    pub stats: SessionStats,
}

impl SessionView {
    pub fn new(history: Vec<Turn>) -> Self {
        Self {
            phase: SessionPhase::Stopped,
            is_recording: false,
            is_speaking: false,
            channel_state: ChannelState::Closed,
            live_transcript: String::new(),
            history,
            history_visible: false,
            disconnected: false,
            last_error: None,
            stats: SessionStats::default(),
        }
    }
}
