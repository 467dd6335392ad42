//! Speech playback on the default output device via `rodio`.
//!
//! `rodio::OutputStream` is `!Send` on some platforms. It is created on a
//! dedicated audio thread and every sink operation is routed there through a
//! command channel, so [`RodioSink`] itself is `Send + Sync`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use tracing::{debug, error, info};

use super::decode::DecodedAudio;
use super::playback::{PlaybackDoneCallback, PlaybackEnd, PlaybackHandle, PlaybackSink};
use crate::error::{ConversationError, Result};

enum SinkCommand {
    Start {
        handle: PlaybackHandle,
        audio: DecodedAudio,
        on_done: PlaybackDoneCallback,
        reply: mpsc::Sender<Result<()>>,
    },
    Stop(PlaybackHandle),
    Shutdown,
}

/// One playing buffer on the audio thread
struct ActivePlayback {
    handle: PlaybackHandle,
    sink: Arc<Sink>,
    stopped: Arc<AtomicBool>,
}

impl ActivePlayback {
    fn stop(self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.sink.stop();
    }
}

pub struct RodioSink {
    cmd_tx: mpsc::Sender<SinkCommand>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RodioSink {
    /// Open the default output device on a dedicated thread
    pub fn spawn() -> Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (init_tx, init_rx) = mpsc::channel();

        let thread = thread::Builder::new()
            .name("loqa-playback".into())
            .spawn(move || run(cmd_rx, init_tx))
            .map_err(|e| {
                ConversationError::PlaybackFailed(format!("failed to spawn playback thread: {e}"))
            })?;

        init_rx.recv().map_err(|_| {
            ConversationError::PlaybackFailed("playback thread exited during startup".into())
        })??;

        info!("Audio playback initialized on default output device");

        Ok(Self {
            cmd_tx,
            thread: Some(thread),
        })
    }
}

impl PlaybackSink for RodioSink {
    fn start(
        &self,
        handle: PlaybackHandle,
        audio: DecodedAudio,
        on_done: PlaybackDoneCallback,
    ) -> Result<()> {
        let (reply, reply_rx) = mpsc::channel();
        self.cmd_tx
            .send(SinkCommand::Start {
                handle,
                audio,
                on_done,
                reply,
            })
            .map_err(|_| ConversationError::PlaybackFailed("playback thread is gone".into()))?;

        reply_rx
            .recv()
            .map_err(|_| ConversationError::PlaybackFailed("playback thread is gone".into()))?
    }

    fn stop(&self, handle: PlaybackHandle) {
        let _ = self.cmd_tx.send(SinkCommand::Stop(handle));
    }
}

impl Drop for RodioSink {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(SinkCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run(cmd_rx: mpsc::Receiver<SinkCommand>, init_tx: mpsc::Sender<Result<()>>) {
    let (_stream, stream_handle) = match OutputStream::try_default() {
        Ok(opened) => opened,
        Err(e) => {
            let _ = init_tx.send(Err(ConversationError::PlaybackFailed(e.to_string())));
            return;
        }
    };

    if init_tx.send(Ok(())).is_err() {
        return;
    }

    let mut active: Option<ActivePlayback> = None;

    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            SinkCommand::Start {
                handle,
                audio,
                on_done,
                reply,
            } => {
                // Never two buffers on the device at once
                if let Some(previous) = active.take() {
                    previous.stop();
                }

                let result = Sink::try_new(&stream_handle)
                    .map_err(|e| ConversationError::PlaybackFailed(e.to_string()))
                    .map(|sink| {
                        sink.append(SamplesBuffer::new(
                            audio.channels,
                            audio.sample_rate,
                            audio.samples,
                        ));
                        let playback = ActivePlayback {
                            handle,
                            sink: Arc::new(sink),
                            stopped: Arc::new(AtomicBool::new(false)),
                        };
                        spawn_completion_watcher(&playback, on_done);
                        playback
                    });

                let _ = reply.send(result.map(|playback| {
                    active = Some(playback);
                }));
            }

            SinkCommand::Stop(handle) => {
                if active.as_ref().is_some_and(|p| p.handle == handle) {
                    if let Some(playback) = active.take() {
                        playback.stop();
                        debug!("Playback {} released", handle);
                    }
                }
            }

            SinkCommand::Shutdown => break,
        }
    }

    if let Some(playback) = active.take() {
        playback.stop();
    }
    debug!("Playback thread shutting down");
}

/// Wait for the sink to drain on a helper thread, then report completion
/// unless the playback was stopped first.
///
/// If no watcher can be spawned the end of the playback would never be
/// observed, so it is reported as failed right away.
fn spawn_completion_watcher(playback: &ActivePlayback, on_done: PlaybackDoneCallback) {
    let sink = Arc::clone(&playback.sink);
    let stopped = Arc::clone(&playback.stopped);
    let handle = playback.handle;

    let pending = Arc::new(Mutex::new(Some(on_done)));
    let watcher_pending = Arc::clone(&pending);

    let spawned = thread::Builder::new()
        .name("loqa-playback-watch".into())
        .spawn(move || {
            sink.sleep_until_end();
            if !stopped.load(Ordering::SeqCst) {
                if let Some(on_done) = take_callback(&watcher_pending) {
                    on_done(handle, PlaybackEnd::Finished);
                }
            }
        });

    if let Err(e) = spawned {
        error!("Failed to spawn playback watcher: {}", e);
        if let Some(on_done) = take_callback(&pending) {
            on_done(handle, PlaybackEnd::Failed(format!("no completion watcher: {e}")));
        }
    }
}

fn take_callback(slot: &Mutex<Option<PlaybackDoneCallback>>) -> Option<PlaybackDoneCallback> {
    slot.lock().ok().and_then(|mut pending| pending.take())
}
