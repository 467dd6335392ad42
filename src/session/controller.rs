use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::SessionOptions;
use super::handle::{SessionHandle, UserIntent};
use super::stats::{SessionPhase, SessionStats, SessionView};
use crate::audio::{
    decode_audio, AudioBackend, AudioChunk, DecodedAudio, PlaybackController, PlaybackEnd,
    PlaybackHandle, PlaybackSink,
};
use crate::error::{ConversationError, Result};
use crate::fetch::AudioFetcher;
use crate::history::{ConversationLog, HistoryStore, Turn};
use crate::transport::{Channel, ChannelEvent, ChannelState, InboundEvent, Transport};

/// External collaborators a session is wired to
pub struct SessionComponents {
    pub transport: Box<dyn Transport>,
    pub capture: Box<dyn AudioBackend>,
    pub sink: Box<dyn PlaybackSink>,
    pub fetcher: Arc<dyn AudioFetcher>,
    /// Used only when `SessionOptions::persist_history` is set
    pub history: Option<Box<dyn HistoryStore>>,
}

/// Where assistant speech comes from
enum AudioRef {
    Url(String),
    Inline(Vec<u8>),
}

/// Completions of work started off the event loop
enum InternalEvent {
    AudioReady {
        generation: u64,
        seq: u64,
        result: Result<DecodedAudio>,
    },
    PlaybackEnded(PlaybackHandle, PlaybackEnd),
}

/// One unit of work for the event loop
enum ControllerEvent {
    Intent(UserIntent),
    Channel(ChannelEvent),
    ChannelGone,
    Chunk(AudioChunk),
    CaptureEnded,
    Internal(InternalEvent),
}

/// Result of the concurrent acquisition on start
enum StartOutcome {
    Acquired(Result<Box<dyn Channel>>, Result<mpsc::Receiver<AudioChunk>>),
    /// Abandoned by a user intent before both resources were acquired
    Cancelled { shutdown: bool },
}

enum StopReason {
    User,
    ChannelClosed,
    ChannelError(String),
    CaptureEnded,
    Shutdown,
}

/// Orchestrates capture, the conversation channel, playback and the log
///
/// The controller runs as a single task and exclusively owns every resource.
/// Each loop iteration takes exactly one event (user intent, channel event,
/// capture chunk or internal completion) and dispatches it to one handler, so
/// handlers never interleave. Start and stop await their device/network work
/// before the next event is read, which serializes start/stop pairs.
pub struct SessionController {
    options: SessionOptions,
    transport: Box<dyn Transport>,
    capture: Box<dyn AudioBackend>,
    playback: PlaybackController,
    fetcher: Arc<dyn AudioFetcher>,
    log: ConversationLog,

    view: SessionView,
    view_tx: watch::Sender<SessionView>,

    intents: mpsc::UnboundedReceiver<UserIntent>,
    internal_tx: mpsc::UnboundedSender<InternalEvent>,
    internal_rx: mpsc::UnboundedReceiver<InternalEvent>,

    /// Resources of the active recording
    channel: Option<Box<dyn Channel>>,
    channel_events: Option<mpsc::UnboundedReceiver<ChannelEvent>>,
    capture_chunks: Option<mpsc::Receiver<AudioChunk>>,

    /// Bumped on every start and teardown; stale audio is discarded
    generation: u64,
    /// Sequence of the most recent audio event
    audio_seq: u64,
    /// Sequence of the audio currently (or last) started
    last_started_seq: u64,

    /// Set once disposal has run; the loop exits after the current event
    exiting: bool,
}

impl SessionController {
    /// Create a controller and its handle. History is restored here, before
    /// anything else touches the log.
    pub fn new(components: SessionComponents, options: SessionOptions) -> (Self, SessionHandle) {
        let log = match (options.persist_history, components.history) {
            (true, Some(store)) => ConversationLog::persistent(store),
            _ => ConversationLog::in_memory(),
        };

        let view = SessionView::new(log.snapshot());
        let (view_tx, view_rx) = watch::channel(view.clone());
        let (intent_tx, intents) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        info!(
            "Session controller created (transport: {}, capture: {}, {} turns of history)",
            components.transport.name(),
            components.capture.name(),
            log.len()
        );

        let controller = Self {
            options,
            transport: components.transport,
            capture: components.capture,
            playback: PlaybackController::new(components.sink),
            fetcher: components.fetcher,
            log,
            view,
            view_tx,
            intents,
            internal_tx,
            internal_rx,
            channel: None,
            channel_events: None,
            capture_chunks: None,
            generation: 0,
            audio_seq: 0,
            last_started_seq: 0,
            exiting: false,
        };

        (controller, SessionHandle::new(intent_tx, view_rx))
    }

    /// Create a controller and run it on the tokio runtime
    pub fn spawn(
        components: SessionComponents,
        options: SessionOptions,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (controller, handle) = Self::new(components, options);
        (handle, tokio::spawn(controller.run()))
    }

    /// Process events until shutdown (or until every handle is dropped)
    pub async fn run(mut self) {
        info!("Session controller running");

        loop {
            let event = self.next_event().await;
            if !self.dispatch(event).await {
                break;
            }
        }

        info!("Session controller stopped");
    }

    async fn next_event(&mut self) -> ControllerEvent {
        tokio::select! {
            biased;

            intent = self.intents.recv() => {
                ControllerEvent::Intent(intent.unwrap_or(UserIntent::Shutdown))
            }
            Some(internal) = self.internal_rx.recv() => ControllerEvent::Internal(internal),
            event = recv_channel_event(&mut self.channel_events) => {
                event.map_or(ControllerEvent::ChannelGone, ControllerEvent::Channel)
            }
            chunk = recv_chunk(&mut self.capture_chunks) => {
                chunk.map_or(ControllerEvent::CaptureEnded, ControllerEvent::Chunk)
            }
        }
    }

    /// Route one event to its handler. Returns `false` once the controller
    /// should exit.
    async fn dispatch(&mut self, event: ControllerEvent) -> bool {
        match event {
            ControllerEvent::Intent(UserIntent::Start) => self.on_start().await,
            ControllerEvent::Intent(UserIntent::Stop) => self.on_stop().await,
            ControllerEvent::Intent(UserIntent::ToggleRecording) => {
                self.on_toggle_recording().await
            }
            ControllerEvent::Intent(UserIntent::ToggleHistoryView) => self.on_toggle_history(),
            ControllerEvent::Intent(UserIntent::Shutdown) => {
                self.dispose().await;
                self.exiting = true;
            }
            ControllerEvent::Channel(event) => self.on_channel_event(event).await,
            ControllerEvent::ChannelGone => self.on_channel_event(ChannelEvent::Closed).await,
            ControllerEvent::Chunk(chunk) => self.on_chunk(chunk),
            ControllerEvent::CaptureEnded => self.on_capture_ended().await,
            ControllerEvent::Internal(InternalEvent::AudioReady {
                generation,
                seq,
                result,
            }) => self.on_audio_ready(generation, seq, result),
            ControllerEvent::Internal(InternalEvent::PlaybackEnded(handle, end)) => {
                self.on_playback_ended(handle, end)
            }
        }

        !self.exiting
    }

    // ── Intents ────────────────────────────────────────────────────

    async fn on_start(&mut self) {
        if self.view.phase != SessionPhase::Stopped {
            debug!("Start ignored while {:?}", self.view.phase);
            return;
        }

        self.generation += 1;
        let session_id = format!("conversation-{}", uuid::Uuid::new_v4());
        info!("Starting session {}", session_id);

        self.view.phase = SessionPhase::Starting;
        self.view.channel_state = ChannelState::Connecting;
        self.view.disconnected = false;
        self.view.last_error = None;
        self.publish();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let interval = self.options.chunk_interval;

        let (channel, capture) = match self.acquire(events_tx, interval).await {
            StartOutcome::Acquired(channel, capture) => (channel, capture),
            StartOutcome::Cancelled { shutdown } => {
                self.cancel_start(shutdown).await;
                return;
            }
        };

        match (channel, capture) {
            (Ok(channel), Ok(chunks)) => {
                self.channel = Some(channel);
                self.channel_events = Some(events_rx);
                self.capture_chunks = Some(chunks);

                self.view.phase = SessionPhase::Active;
                self.view.is_recording = true;
                self.view.channel_state = ChannelState::Open;
                self.view.stats = SessionStats {
                    session_id: Some(session_id.clone()),
                    started_at: Some(Utc::now()),
                    ..SessionStats::default()
                };

                info!("Session {} active", session_id);
            }
            (Ok(channel), Err(capture_err)) => {
                channel.close();
                self.fail_start(capture_err, ChannelState::Closed);
            }
            (Err(channel_err), Ok(chunks)) => {
                drop(chunks);
                if let Err(e) = self.capture.stop().await {
                    error!("Failed to release capture after channel failure: {}", e);
                }
                self.fail_start(channel_err, ChannelState::Errored);
            }
            (Err(channel_err), Err(capture_err)) => {
                warn!("Channel also failed: {}", channel_err);
                self.fail_start(capture_err, ChannelState::Errored);
            }
        }

        self.publish();
    }

    /// Acquire channel and microphone concurrently while still reading intents
    ///
    /// A stop, toggle or shutdown abandons the pending acquisition. Whatever
    /// completed inside the dropped join is released by its `Drop`; the
    /// capture backend is stopped by the caller.
    async fn acquire(
        &mut self,
        events: mpsc::UnboundedSender<ChannelEvent>,
        interval: Duration,
    ) -> StartOutcome {
        let transport = &self.transport;
        let capture = &mut self.capture;
        let acquisition =
            async move { tokio::join!(transport.open(events), capture.start(interval)) };
        tokio::pin!(acquisition);

        loop {
            tokio::select! {
                biased;

                intent = self.intents.recv() => match intent.unwrap_or(UserIntent::Shutdown) {
                    UserIntent::Stop | UserIntent::ToggleRecording => {
                        return StartOutcome::Cancelled { shutdown: false };
                    }
                    UserIntent::Shutdown => return StartOutcome::Cancelled { shutdown: true },
                    UserIntent::ToggleHistoryView => {
                        self.view.history_visible = !self.view.history_visible;
                        self.view_tx.send_replace(self.view.clone());
                    }
                    UserIntent::Start => debug!("Start ignored while starting"),
                },
                (channel, chunks) = &mut acquisition => {
                    return StartOutcome::Acquired(channel, chunks);
                }
            }
        }
    }

    async fn cancel_start(&mut self, shutdown: bool) {
        info!("Start cancelled");

        if let Err(e) = self.capture.stop().await {
            error!("Failed to release capture after cancelled start: {}", e);
        }

        self.generation += 1;
        self.view.phase = SessionPhase::Stopped;
        self.view.is_recording = false;
        self.view.channel_state = ChannelState::Closed;
        self.publish();

        if shutdown {
            self.dispose().await;
            self.exiting = true;
        }
    }

    fn fail_start(&mut self, err: ConversationError, channel_state: ChannelState) {
        error!("Session failed to start: {}", err);

        self.generation += 1;
        self.view.phase = SessionPhase::Stopped;
        self.view.is_recording = false;
        self.view.channel_state = channel_state;
        self.view.last_error = Some(err.to_string());
    }

    async fn on_stop(&mut self) {
        if self.view.phase != SessionPhase::Active {
            debug!("Stop ignored while {:?}", self.view.phase);
            return;
        }

        self.teardown(StopReason::User).await;
    }

    async fn on_toggle_recording(&mut self) {
        match self.view.phase {
            SessionPhase::Stopped => self.on_start().await,
            SessionPhase::Active => self.on_stop().await,
            phase => debug!("Toggle ignored while {:?}", phase),
        }
    }

    fn on_toggle_history(&mut self) {
        self.view.history_visible = !self.view.history_visible;
        self.publish();
    }

    // ── Channel ────────────────────────────────────────────────────

    async fn on_channel_event(&mut self, event: ChannelEvent) {
        if self.view.phase != SessionPhase::Active {
            debug!("Ignoring channel event while {:?}", self.view.phase);
            return;
        }

        match event {
            ChannelEvent::Opened => {
                self.view.channel_state = ChannelState::Open;
                self.publish();
            }
            ChannelEvent::Message(InboundEvent::Text { role, content }) => {
                self.view.stats.events_received += 1;

                if self.options.live_transcript {
                    self.view.live_transcript = content.clone();
                }
                self.log.append(Turn::new(role, content));
                self.view.history = self.log.snapshot();
                self.publish();
            }
            ChannelEvent::Message(InboundEvent::Audio { content }) => {
                self.view.stats.events_received += 1;
                self.request_audio(AudioRef::Url(content));
            }
            ChannelEvent::Binary(bytes) => {
                self.view.stats.events_received += 1;
                self.request_audio(AudioRef::Inline(bytes));
            }
            ChannelEvent::Closed => {
                warn!("Channel closed while recording");
                self.teardown(StopReason::ChannelClosed).await;
            }
            ChannelEvent::Error(reason) => {
                warn!("Channel failed while recording: {}", reason);
                self.teardown(StopReason::ChannelError(reason)).await;
            }
        }
    }

    // ── Capture ────────────────────────────────────────────────────

    fn on_chunk(&mut self, chunk: AudioChunk) {
        if self.view.phase != SessionPhase::Active || !self.view.is_recording {
            return;
        }

        // Barge-in: the user is speaking, silence the assistant first
        if self.playback.interrupt() {
            self.view.is_speaking = false;
            self.view.stats.interruptions += 1;
            info!("Barge-in on chunk {}, playback interrupted", chunk.sequence);
        }

        let sequence = chunk.sequence;
        let sent = self
            .channel
            .as_ref()
            .is_some_and(|channel| channel.send(chunk.bytes));

        if sent {
            self.view.stats.chunks_sent += 1;
            debug!("Forwarded chunk {}", sequence);
        } else {
            self.view.stats.chunks_dropped += 1;
            debug!("Dropped chunk {}, channel not open", sequence);
        }

        self.publish();
    }

    async fn on_capture_ended(&mut self) {
        if self.view.phase == SessionPhase::Active {
            warn!("Capture stream ended while recording");
            self.teardown(StopReason::CaptureEnded).await;
        }
    }

    // ── Playback ───────────────────────────────────────────────────

    /// Fetch and decode assistant speech off the event loop
    fn request_audio(&mut self, source: AudioRef) {
        self.audio_seq += 1;
        let seq = self.audio_seq;
        let generation = self.generation;
        let fetcher = Arc::clone(&self.fetcher);
        let internal_tx = self.internal_tx.clone();

        tokio::spawn(async move {
            let result = load_audio(fetcher, source).await;
            let _ = internal_tx.send(InternalEvent::AudioReady {
                generation,
                seq,
                result,
            });
        });
    }

    fn on_audio_ready(&mut self, generation: u64, seq: u64, result: Result<DecodedAudio>) {
        if generation != self.generation || self.view.phase != SessionPhase::Active {
            debug!("Discarding audio {} from an ended session", seq);
            return;
        }

        if seq <= self.last_started_seq {
            debug!("Discarding audio {}, newer speech already started", seq);
            return;
        }

        let audio = match result {
            Ok(audio) => audio,
            Err(e) => {
                warn!("Skipping audio {}: {}", seq, e);
                return;
            }
        };

        let internal_tx = self.internal_tx.clone();
        let on_done = Box::new(move |handle, end| {
            let _ = internal_tx.send(InternalEvent::PlaybackEnded(handle, end));
        });

        match self.playback.play(audio, on_done) {
            Ok(_) => {
                self.last_started_seq = seq;
                self.view.is_speaking = true;
            }
            Err(e) => {
                warn!("Skipping audio {}: {}", seq, e);
                self.view.is_speaking = false;
            }
        }

        self.publish();
    }

    fn on_playback_ended(&mut self, handle: PlaybackHandle, end: PlaybackEnd) {
        let was_active = match end {
            PlaybackEnd::Finished => self.playback.on_completion(handle),
            PlaybackEnd::Failed(reason) => self.playback.on_error(handle, &reason),
        };

        if was_active {
            self.view.is_speaking = false;
            self.publish();
        }
    }

    // ── Teardown ───────────────────────────────────────────────────

    /// Release the channel, capture and playback of the current recording
    ///
    /// Forwarding stops and the channel is closed before anything is awaited;
    /// the controller reads no further events until the capture device is
    /// released.
    async fn teardown(&mut self, reason: StopReason) {
        info!("Stopping session");

        self.view.phase = SessionPhase::Stopping;
        self.view.is_recording = false;

        self.capture_chunks = None;
        self.channel_events = None;
        if let Some(channel) = self.channel.take() {
            channel.close();
        }

        self.playback.interrupt();
        self.view.is_speaking = false;

        // Audio still being fetched belongs to this recording
        self.generation += 1;

        self.publish();

        if let Err(e) = self.capture.stop().await {
            error!("Failed to stop capture: {}", e);
        }

        if self.options.reset_on_stop {
            self.view.live_transcript.clear();
        }

        match reason {
            StopReason::User | StopReason::Shutdown => {
                self.view.channel_state = ChannelState::Closed;
            }
            StopReason::ChannelClosed => {
                self.view.channel_state = ChannelState::Closed;
                self.view.disconnected = true;
                self.view.last_error = Some("disconnected: channel closed".to_string());
            }
            StopReason::ChannelError(reason) => {
                self.view.channel_state = ChannelState::Errored;
                self.view.disconnected = true;
                self.view.last_error = Some(format!(
                    "disconnected: {}",
                    ConversationError::ChannelError(reason)
                ));
            }
            StopReason::CaptureEnded => {
                self.view.channel_state = ChannelState::Closed;
                self.view.last_error = Some("audio capture ended".to_string());
            }
        }

        self.view.phase = SessionPhase::Stopped;
        self.publish();

        info!(
            "Session stopped ({} chunks sent, {} events received)",
            self.view.stats.chunks_sent, self.view.stats.events_received
        );
    }

    /// Unconditional release of all external resources
    async fn dispose(&mut self) {
        info!("Disposing session controller");

        if self.view.phase == SessionPhase::Active {
            self.teardown(StopReason::Shutdown).await;
        }

        // Whatever a partial start or a failed teardown may have left behind
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
        self.playback.interrupt();
        if let Err(e) = self.capture.stop().await {
            error!("Failed to stop capture during disposal: {}", e);
        }

        self.view.is_speaking = false;
        self.view.is_recording = false;
        self.publish();
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.view.clone());
    }
}

async fn load_audio(fetcher: Arc<dyn AudioFetcher>, source: AudioRef) -> Result<DecodedAudio> {
    let bytes = match source {
        AudioRef::Url(url) => {
            debug!("Fetching audio from {}", url);
            fetcher.fetch(&url).await?
        }
        AudioRef::Inline(bytes) => bytes,
    };

    tokio::task::spawn_blocking(move || decode_audio(bytes))
        .await
        .map_err(|e| ConversationError::PlaybackFailed(format!("decoder task failed: {e}")))?
}

async fn recv_channel_event(
    rx: &mut Option<mpsc::UnboundedReceiver<ChannelEvent>>,
) -> Option<ChannelEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn recv_chunk(rx: &mut Option<mpsc::Receiver<AudioChunk>>) -> Option<AudioChunk> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
