use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::Result;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// One encoded chunk of captured audio, ready to be sent over the channel
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Emission order within a capture run (0-indexed)
    pub sequence: u64,
    /// Complete WAV container (never empty)
    pub bytes: Vec<u8>,
    /// Timestamp of the first frame in this chunk
    pub timestamp_ms: u64,
    /// Audio duration carried by this chunk
    pub duration_ms: u64,
}

/// Configuration for audio backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Sample rate of emitted chunks (capture is downsampled if needed)
    pub target_sample_rate: u32,
    /// Channel count of emitted chunks (1 = mono, 2 = stereo)
    pub target_channels: u16,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000, // 16kHz speech
            target_channels: 1,        // Mono
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: cpal default input device
/// - File: replays a WAV file in real time (headless runs, demos)
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver yielding one encoded chunk per `interval`.
    /// On failure no device resources are held.
    async fn start(&mut self, interval: Duration) -> Result<mpsc::Receiver<AudioChunk>>;

    /// Stop capturing audio and release the device. Safe to call repeatedly.
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create audio backend for the requested source
    pub fn create(source: AudioSource, config: AudioBackendConfig) -> Box<dyn AudioBackend> {
        match source {
            AudioSource::Microphone => {
                Box::new(super::microphone::MicrophoneBackend::new(config))
            }
            AudioSource::File(path) => Box::new(super::file::FileBackend::new(path, config)),
        }
    }
}

/// Audio source type
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Microphone input (default input device)
    Microphone,
    /// File input (replayed in real time)
    File(PathBuf),
}
