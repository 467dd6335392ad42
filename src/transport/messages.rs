use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConversationError, Result};
use crate::history::Role;

/// Event received from the conversation service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundEvent {
    /// Transcribed user speech or assistant reply text
    Text { role: Role, content: String },
    /// Synthesized speech available at `content` (URL)
    Audio { content: String },
}

/// Lifecycle and payload notifications from an open channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Opened,
    Message(InboundEvent),
    /// Raw playable audio delivered out of band
    Binary(Vec<u8>),
    Closed,
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
    Errored,
}

const KNOWN_TYPES: &[&str] = &["text", "audio"];

/// Parse one inbound text frame
///
/// Returns `Ok(None)` for well-formed frames with an unknown `type` so newer
/// servers can add event kinds without breaking older clients.
pub fn parse_inbound(text: &str) -> Result<Option<InboundEvent>> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ConversationError::MalformedEvent(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| ConversationError::MalformedEvent("missing \"type\" field".into()))?;

    if !KNOWN_TYPES.contains(&kind) {
        debug!("Ignoring inbound event of unknown type {:?}", kind);
        return Ok(None);
    }

    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| ConversationError::MalformedEvent(e.to_string()))
}
