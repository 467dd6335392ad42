use tokio::sync::mpsc;

use super::messages::{ChannelEvent, ChannelState};
use crate::error::Result;

/// Opens persistent channels to the conversation service
///
/// Reconnection is not handled here: every session start opens a fresh
/// channel.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Open a channel. Lifecycle and inbound events are delivered on `events`
    /// in arrival order, starting with [`ChannelEvent::Opened`].
    async fn open(&self, events: mpsc::UnboundedSender<ChannelEvent>) -> Result<Box<dyn Channel>>;

    /// Get transport name for logging
    fn name(&self) -> &str;
}

/// An open bidirectional channel
pub trait Channel: Send + Sync {
    /// Send one binary frame. Returns `false` (and does nothing) unless the
    /// channel is open.
    fn send(&self, bytes: Vec<u8>) -> bool;

    /// Close the channel. Safe to call repeatedly.
    fn close(&self);

    fn state(&self) -> ChannelState;
}
