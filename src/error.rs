//! Conversation error types.

/// Errors that can occur while running a conversation session.
#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    /// Microphone could not be acquired (permission denied, device busy, no device).
    #[error("Failed to acquire audio input: {0}")]
    AcquisitionFailed(String),

    /// The conversation channel could not be opened.
    #[error("Failed to open conversation channel: {0}")]
    ChannelOpenFailed(String),

    /// The conversation channel failed after it was opened.
    #[error("Conversation channel error: {0}")]
    ChannelError(String),

    /// An inbound frame was not valid JSON or did not match a known shape.
    #[error("Malformed inbound event: {0}")]
    MalformedEvent(String),

    /// Referenced audio content could not be retrieved.
    #[error("Failed to fetch audio from {url}: {reason}")]
    AudioFetchFailed { url: String, reason: String },

    /// Audio could not be decoded or played.
    #[error("Playback failed: {0}")]
    PlaybackFailed(String),

    /// The conversation log could not be written or read.
    #[error("Failed to persist conversation history: {0}")]
    HistoryPersistFailed(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConversationError>;
