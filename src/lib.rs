pub mod audio;
pub mod config;
pub mod error;
pub mod fetch;
pub mod history;
pub mod http;
pub mod session;
pub mod transport;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioChunk, AudioSource,
    PlaybackController, PlaybackSink, RodioSink,
};
pub use config::Config;
pub use error::{ConversationError, Result};
pub use fetch::{AudioFetcher, HttpFetcher};
pub use history::{ConversationLog, HistoryStore, JsonFileStore, Role, Turn};
pub use http::{create_router, AppState};
pub use session::{
    SessionComponents, SessionController, SessionHandle, SessionOptions, SessionPhase,
    SessionStats, SessionView, UserIntent,
};
pub use transport::{Channel, ChannelEvent, ChannelState, InboundEvent, Transport, WsTransport};
