// Mock implementations of the session seams: no audio hardware or network.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use loqa_converse::audio::{
    encode_wav, AudioBackend, AudioChunk, DecodedAudio, PlaybackDoneCallback, PlaybackEnd,
    PlaybackHandle, PlaybackSink,
};
use loqa_converse::error::ConversationError;
use loqa_converse::fetch::AudioFetcher;
use loqa_converse::history::HistoryStore;
use loqa_converse::session::{
    SessionComponents, SessionController, SessionHandle, SessionOptions, SessionView,
};
use loqa_converse::transport::{Channel, ChannelEvent, ChannelState, Transport};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Shared record of everything the mocks were asked to do
#[derive(Default)]
pub struct Recorder {
    ops: Mutex<Vec<String>>,

    pub channel_opens: AtomicUsize,
    pub channel_live: AtomicUsize,
    pub channel_max: AtomicUsize,
    pub capture_live: AtomicUsize,
    pub capture_max: AtomicUsize,

    pub fail_channel: AtomicBool,
    pub fail_capture: AtomicBool,
    pub fail_playback: AtomicBool,
    /// Makes the open channel refuse sends without emitting any event
    pub link_down: AtomicBool,
    /// Extra time the transport takes to connect, in milliseconds
    pub connect_delay_ms: AtomicU64,

    events: Mutex<Option<mpsc::UnboundedSender<ChannelEvent>>>,
    chunks: Mutex<Option<mpsc::Sender<AudioChunk>>>,
    pending_done: Mutex<HashMap<PlaybackHandle, PlaybackDoneCallback>>,
    pub sent: Mutex<Vec<Vec<u8>>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, op: impl Into<String>) {
        self.ops.lock().unwrap().push(op.into());
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.ops().iter().filter(|op| op.starts_with(prefix)).count()
    }

    pub fn position(&self, op: &str) -> Option<usize> {
        self.ops().iter().position(|o| o == op)
    }

    /// Deliver an event on the most recently opened channel
    pub fn emit(&self, event: ChannelEvent) -> bool {
        match self.events.lock().unwrap().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Emit one captured chunk from the running capture
    pub async fn push_chunk(&self, bytes: Vec<u8>) -> bool {
        let tx = self.chunks.lock().unwrap().clone();
        let Some(tx) = tx else {
            return false;
        };

        let chunk = AudioChunk {
            sequence: 0,
            bytes,
            timestamp_ms: 0,
            duration_ms: 1000,
        };
        tx.send(chunk).await.is_ok()
    }

    /// End the capture stream as if the device went away
    pub fn end_capture(&self) {
        self.chunks.lock().unwrap().take();
    }

    /// Report natural completion of a playback
    pub fn finish_playback(&self, handle: PlaybackHandle) -> bool {
        self.end_playback(handle, PlaybackEnd::Finished)
    }

    /// Report an output device failure during a playback
    pub fn fail_playback(&self, handle: PlaybackHandle, reason: &str) -> bool {
        self.end_playback(handle, PlaybackEnd::Failed(reason.to_string()))
    }

    fn end_playback(&self, handle: PlaybackHandle, end: PlaybackEnd) -> bool {
        let on_done = self.pending_done.lock().unwrap().remove(&handle);
        match on_done {
            Some(on_done) => {
                on_done(handle, end);
                true
            }
            None => false,
        }
    }
}

fn raise(live: &AtomicUsize, max: &AtomicUsize) {
    let now = live.fetch_add(1, Ordering::SeqCst) + 1;
    max.fetch_max(now, Ordering::SeqCst);
}

// ── Transport ──────────────────────────────────────────────────────

pub struct MockTransport {
    recorder: Arc<Recorder>,
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn open(
        &self,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> loqa_converse::Result<Box<dyn Channel>> {
        self.recorder.channel_opens.fetch_add(1, Ordering::SeqCst);
        let delay = 5 + self.recorder.connect_delay_ms.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(delay)).await;

        if self.recorder.fail_channel.load(Ordering::SeqCst) {
            self.recorder.record("channel refused");
            return Err(ConversationError::ChannelOpenFailed(
                "connection refused".to_string(),
            ));
        }

        raise(&self.recorder.channel_live, &self.recorder.channel_max);
        self.recorder.record("channel open");

        let _ = events.send(ChannelEvent::Opened);
        *self.recorder.events.lock().unwrap() = Some(events);

        Ok(Box::new(MockChannel {
            recorder: Arc::clone(&self.recorder),
            closed: AtomicBool::new(false),
        }))
    }

    fn name(&self) -> &str {
        "mock transport"
    }
}

pub struct MockChannel {
    recorder: Arc<Recorder>,
    closed: AtomicBool,
}

impl Channel for MockChannel {
    fn send(&self, bytes: Vec<u8>) -> bool {
        if self.closed.load(Ordering::SeqCst) || self.recorder.link_down.load(Ordering::SeqCst) {
            return false;
        }
        self.recorder.record("send");
        self.recorder.sent.lock().unwrap().push(bytes);
        true
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.recorder.channel_live.fetch_sub(1, Ordering::SeqCst);
            self.recorder.record("channel close");
        }
    }

    fn state(&self) -> ChannelState {
        if self.closed.load(Ordering::SeqCst) {
            ChannelState::Closed
        } else {
            ChannelState::Open
        }
    }
}

impl Drop for MockChannel {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Capture ────────────────────────────────────────────────────────

pub struct MockCapture {
    recorder: Arc<Recorder>,
    capturing: bool,
}

#[async_trait::async_trait]
impl AudioBackend for MockCapture {
    async fn start(
        &mut self,
        _interval: Duration,
    ) -> loqa_converse::Result<mpsc::Receiver<AudioChunk>> {
        tokio::time::sleep(Duration::from_millis(5)).await;

        if self.recorder.fail_capture.load(Ordering::SeqCst) {
            self.recorder.record("capture denied");
            return Err(ConversationError::AcquisitionFailed(
                "microphone permission denied".to_string(),
            ));
        }
        if self.capturing {
            self.recorder.record("capture double start");
            return Err(ConversationError::AcquisitionFailed("already capturing".to_string()));
        }

        raise(&self.recorder.capture_live, &self.recorder.capture_max);
        self.recorder.record("capture start");

        let (tx, rx) = mpsc::channel(32);
        *self.recorder.chunks.lock().unwrap() = Some(tx);
        self.capturing = true;

        Ok(rx)
    }

    async fn stop(&mut self) -> loqa_converse::Result<()> {
        if self.capturing {
            self.capturing = false;
            self.recorder.chunks.lock().unwrap().take();
            self.recorder.capture_live.fetch_sub(1, Ordering::SeqCst);
            self.recorder.record("capture stop");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "mock capture"
    }
}

// ── Playback ───────────────────────────────────────────────────────

pub struct MockSink {
    recorder: Arc<Recorder>,
}

impl MockSink {
    pub fn new(recorder: Arc<Recorder>) -> Self {
        Self { recorder }
    }
}

impl PlaybackSink for MockSink {
    fn start(
        &self,
        handle: PlaybackHandle,
        _audio: DecodedAudio,
        on_done: PlaybackDoneCallback,
    ) -> loqa_converse::Result<()> {
        if self.recorder.fail_playback.load(Ordering::SeqCst) {
            return Err(ConversationError::PlaybackFailed("output device lost".to_string()));
        }
        self.recorder.record(format!("play {}", handle));
        self.recorder.pending_done.lock().unwrap().insert(handle, on_done);
        Ok(())
    }

    fn stop(&self, handle: PlaybackHandle) {
        self.recorder.record(format!("stop {}", handle));
        self.recorder.pending_done.lock().unwrap().remove(&handle);
    }
}

// ── Fetcher ────────────────────────────────────────────────────────

/// Serves a fixed WAV body; URLs containing "slow" take 300ms, URLs
/// containing "missing" fail
pub struct MockFetcher {
    recorder: Arc<Recorder>,
    body: Vec<u8>,
}

#[async_trait::async_trait]
impl AudioFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> loqa_converse::Result<Vec<u8>> {
        if url.contains("slow") {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        self.recorder.record(format!("fetch {}", url));

        if url.contains("missing") {
            return Err(ConversationError::AudioFetchFailed {
                url: url.to_string(),
                reason: "404 Not Found".to_string(),
            });
        }
        Ok(self.body.clone())
    }
}

// ── Harness ────────────────────────────────────────────────────────

/// Half a second of a 440Hz tone as a 16kHz mono WAV
pub fn speech_wav() -> Vec<u8> {
    let samples: Vec<i16> = (0..8000)
        .map(|i| {
            let t = i as f32 / 16000.0;
            ((t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 8000.0) as i16
        })
        .collect();
    encode_wav(&samples, 16000, 1).unwrap()
}

pub struct Harness {
    pub handle: SessionHandle,
    pub task: JoinHandle<()>,
    pub recorder: Arc<Recorder>,
}

pub fn spawn_session(
    recorder: Arc<Recorder>,
    options: SessionOptions,
    history: Option<Box<dyn HistoryStore>>,
) -> Harness {
    let components = SessionComponents {
        transport: Box::new(MockTransport {
            recorder: Arc::clone(&recorder),
        }),
        capture: Box::new(MockCapture {
            recorder: Arc::clone(&recorder),
            capturing: false,
        }),
        sink: Box::new(MockSink::new(Arc::clone(&recorder))),
        fetcher: Arc::new(MockFetcher {
            recorder: Arc::clone(&recorder),
            body: speech_wav(),
        }),
        history,
    };

    let (handle, task) = SessionController::spawn(components, options);
    Harness {
        handle,
        task,
        recorder,
    }
}

/// Wait (up to 2s) until the published view satisfies `pred`
pub async fn wait_for(
    handle: &SessionHandle,
    pred: impl FnMut(&SessionView) -> bool,
) -> Result<SessionView> {
    let mut views = handle.subscribe();
    let view = tokio::time::timeout(Duration::from_secs(2), views.wait_for(pred)).await??;
    Ok(view.clone())
}
