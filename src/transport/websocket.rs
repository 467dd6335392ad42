use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::channel::{Channel, Transport};
use super::messages::{parse_inbound, ChannelEvent, ChannelState};
use crate::error::{ConversationError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport to the conversation service
pub struct WsTransport {
    url: String,
    connect_timeout: Duration,
}

impl WsTransport {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn open(&self, events: mpsc::UnboundedSender<ChannelEvent>) -> Result<Box<dyn Channel>> {
        info!("Connecting to {}", self.url);

        let (stream, _response) =
            match tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str())).await
            {
                Ok(Ok(connected)) => connected,
                Ok(Err(e)) => return Err(ConversationError::ChannelOpenFailed(e.to_string())),
                Err(_) => {
                    return Err(ConversationError::ChannelOpenFailed(format!(
                        "timed out after {}ms",
                        self.connect_timeout.as_millis()
                    )))
                }
            };

        info!("Connected to {}", self.url);

        Ok(Box::new(WsChannel::spawn(stream, events)))
    }

    fn name(&self) -> &str {
        "websocket"
    }
}

enum Outbound {
    Frame(Vec<u8>),
    Close,
}

/// An open WebSocket channel
///
/// A writer task drains outbound frames in send order; a reader task parses
/// inbound frames and forwards them as [`ChannelEvent`]s.
pub struct WsChannel {
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    state: Arc<Mutex<ChannelState>>,
    reader: JoinHandle<()>,
}

impl WsChannel {
    fn spawn(stream: WsStream, events: mpsc::UnboundedSender<ChannelEvent>) -> Self {
        let (write, read) = stream.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(ChannelState::Open));

        let _ = events.send(ChannelEvent::Opened);

        tokio::spawn(write_loop(write, outbound_rx));
        let reader = tokio::spawn(read_loop(read, events, Arc::clone(&state), outbound_tx.clone()));

        Self {
            outbound_tx,
            state,
            reader,
        }
    }
}

impl Channel for WsChannel {
    fn send(&self, bytes: Vec<u8>) -> bool {
        if self.state() != ChannelState::Open {
            debug!("Dropping {} byte frame, channel not open", bytes.len());
            return false;
        }
        self.outbound_tx.send(Outbound::Frame(bytes)).is_ok()
    }

    fn close(&self) {
        let was_open = transition(&self.state, ChannelState::Closed);
        if was_open {
            info!("Closing channel");
            let _ = self.outbound_tx.send(Outbound::Close);
        }
        self.reader.abort();
    }

    fn state(&self) -> ChannelState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(ChannelState::Errored)
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Move an open channel into a terminal state. Returns `true` if it was open.
fn transition(state: &Mutex<ChannelState>, to: ChannelState) -> bool {
    match state.lock() {
        Ok(mut current) => match *current {
            ChannelState::Open | ChannelState::Connecting => {
                *current = to;
                true
            }
            ChannelState::Closed | ChannelState::Errored => false,
        },
        Err(_) => false,
    }
}

async fn write_loop(
    mut write: SplitSink<WsStream, Message>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(outbound) = outbound_rx.recv().await {
        match outbound {
            Outbound::Frame(bytes) => {
                let len = bytes.len();
                if let Err(e) = write.send(Message::Binary(bytes)).await {
                    warn!("Failed to send {} byte frame: {}", len, e);
                    break;
                }
                debug!("Sent {} byte frame", len);
            }
            Outbound::Close => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    debug!("Close frame not delivered: {}", e);
                }
                break;
            }
        }
    }

    let _ = write.close().await;
    debug!("Channel writer stopped");
}

async fn read_loop(
    mut read: SplitStream<WsStream>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    state: Arc<Mutex<ChannelState>>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
) {
    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => match parse_inbound(text.as_str()) {
                Ok(Some(event)) => {
                    let _ = events.send(ChannelEvent::Message(event));
                }
                Ok(None) => {}
                Err(e) => warn!("Dropping inbound frame: {}", e),
            },
            Ok(Message::Binary(data)) => {
                let _ = events.send(ChannelEvent::Binary(data.to_vec()));
            }
            Ok(Message::Close(frame)) => {
                info!("Server closed channel: {:?}", frame);
                break;
            }
            Ok(_) => {} // ping/pong handled by tungstenite
            Err(e) => {
                error!("Channel error: {}", e);
                if transition(&state, ChannelState::Errored) {
                    let _ = events.send(ChannelEvent::Error(e.to_string()));
                    let _ = events.send(ChannelEvent::Closed);
                    let _ = outbound_tx.send(Outbound::Close);
                }
                return;
            }
        }
    }

    if transition(&state, ChannelState::Closed) {
        let _ = events.send(ChannelEvent::Closed);
        let _ = outbound_tx.send(Outbound::Close);
    }
    debug!("Channel reader stopped");
}
