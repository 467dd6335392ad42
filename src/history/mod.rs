//! Conversation history
//!
//! The [`ConversationLog`] is the canonical transcript: an append-only list of
//! attributed turns in arrival order, persisted as a whole after every append
//! and restored once when the session controller is created.

mod log;
mod store;

pub use log::{ConversationLog, Role, Turn};
pub use store::{HistoryStore, JsonFileStore};
