//! Conversation service transport
//!
//! Outbound: raw binary audio chunks, one frame per chunk.
//! Inbound: JSON text frames (`{"type":"text",...}` / `{"type":"audio",...}`)
//! and optional binary frames carrying playable audio.

pub mod channel;
pub mod messages;
pub mod websocket;

pub use channel::{Channel, Transport};
pub use messages::{parse_inbound, ChannelEvent, ChannelState, InboundEvent};
pub use websocket::WsTransport;
