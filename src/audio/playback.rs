//! Playback arbitration for assistant speech.
//!
//! [`PlaybackController`] owns at most one active playback handle. Starting
//! new speech always stops and releases the previous handle first, and an
//! interrupt (barge-in) returns to idle synchronously without waiting for the
//! output device to confirm.

use std::fmt;

use tracing::{debug, info, warn};

use super::decode::DecodedAudio;
use crate::error::Result;

/// Identifies one playback started through a [`PlaybackSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackHandle(pub u64);

impl fmt::Display for PlaybackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a started playback ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEnd {
    /// Drained naturally
    Finished,
    /// The device failed after playback started
    Failed(String),
}

/// Callback invoked once when a playback ends on its own
pub type PlaybackDoneCallback = Box<dyn FnOnce(PlaybackHandle, PlaybackEnd) + Send + 'static>;

/// Output device abstraction
///
/// Implementations must not invoke `on_done` for a handle that was stopped
/// through [`PlaybackSink::stop`].
pub trait PlaybackSink: Send + Sync {
    /// Begin playing decoded audio under `handle`
    fn start(
        &self,
        handle: PlaybackHandle,
        audio: DecodedAudio,
        on_done: PlaybackDoneCallback,
    ) -> Result<()>;

    /// Stop and release `handle`. Unknown or finished handles are ignored.
    fn stop(&self, handle: PlaybackHandle);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing(PlaybackHandle),
}

pub struct PlaybackController {
    sink: Box<dyn PlaybackSink>,
    state: PlaybackState,
    next_handle: u64,
}

impl PlaybackController {
    pub fn new(sink: Box<dyn PlaybackSink>) -> Self {
        Self {
            sink,
            state: PlaybackState::Idle,
            next_handle: 1,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Whether assistant speech is currently playing
    pub fn is_speaking(&self) -> bool {
        matches!(self.state, PlaybackState::Playing(_))
    }

    /// Play decoded audio, replacing whatever is playing
    ///
    /// The previous handle is stopped before the new one starts. On failure
    /// the controller is left idle.
    pub fn play(
        &mut self,
        audio: DecodedAudio,
        on_done: PlaybackDoneCallback,
    ) -> Result<PlaybackHandle> {
        if let PlaybackState::Playing(previous) = self.state {
            debug!("Replacing playback {}", previous);
            self.sink.stop(previous);
            self.state = PlaybackState::Idle;
        }

        let handle = PlaybackHandle(self.next_handle);
        self.next_handle += 1;

        let duration_ms = audio.duration_ms();
        if let Err(e) = self.sink.start(handle, audio, on_done) {
            warn!("Playback {} failed to start: {}", handle, e);
            return Err(e);
        }

        self.state = PlaybackState::Playing(handle);
        info!("Playback {} started ({}ms)", handle, duration_ms);

        Ok(handle)
    }

    /// Stop playback immediately (barge-in or teardown)
    ///
    /// Returns `true` if something was playing.
    pub fn interrupt(&mut self) -> bool {
        match self.state {
            PlaybackState::Playing(handle) => {
                self.sink.stop(handle);
                self.state = PlaybackState::Idle;
                info!("Playback {} interrupted", handle);
                true
            }
            PlaybackState::Idle => false,
        }
    }

    /// Natural end of `handle`
    ///
    /// Returns `true` if it was the active handle; completions of replaced or
    /// interrupted handles are ignored.
    pub fn on_completion(&mut self, handle: PlaybackHandle) -> bool {
        if self.state == PlaybackState::Playing(handle) {
            self.state = PlaybackState::Idle;
            debug!("Playback {} finished", handle);
            true
        } else {
            debug!("Ignoring completion of stale playback {}", handle);
            false
        }
    }

    /// Device error reported for `handle` after it started
    pub fn on_error(&mut self, handle: PlaybackHandle, reason: &str) -> bool {
        if self.state == PlaybackState::Playing(handle) {
            warn!("Playback {} aborted: {}", handle, reason);
            self.sink.stop(handle);
            self.state = PlaybackState::Idle;
            true
        } else {
            false
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.interrupt();
    }
}
