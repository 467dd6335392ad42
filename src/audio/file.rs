use std::path::{Path, PathBuf};
use std::time::Duration;

use hound::WavReader;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioChunk, AudioFrame};
use super::chunk::{run_chunker, ChunkEncoder};
use super::convert::{effective_format, process_frame};
use crate::error::{ConversationError, Result};

/// Duration of each frame fed to the chunker during replay
const REPLAY_FRAME_MS: u64 = 20;

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).map_err(|e| {
            ConversationError::AcquisitionFailed(format!("{}: {}", path.display(), e))
        })?;

        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(ConversationError::AcquisitionFailed(format!(
                "{}: expected 16-bit PCM, got {}-bit {:?}",
                path.display(),
                spec.bits_per_sample,
                spec.sample_format
            )));
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| {
                ConversationError::AcquisitionFailed(format!("{}: {}", path.display(), e))
            })?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Split the file into consecutive frames of `frame_ms` each
    pub fn frames(&self, frame_ms: u64) -> Vec<AudioFrame> {
        let samples_per_frame =
            (self.sample_rate as u64 * frame_ms / 1000) as usize * self.channels.max(1) as usize;
        if samples_per_frame == 0 {
            return Vec::new();
        }

        self.samples
            .chunks(samples_per_frame)
            .enumerate()
            .map(|(i, chunk)| AudioFrame {
                samples: chunk.to_vec(),
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms: i as u64 * frame_ms,
            })
            .collect()
    }
}

/// Replays a WAV file as if it were captured live
///
/// The chunk stream ends once the file has been fully replayed.
pub struct FileBackend {
    path: PathBuf,
    config: AudioBackendConfig,
    tasks: Vec<JoinHandle<()>>,
    capturing: bool,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>, config: AudioBackendConfig) -> Self {
        Self {
            path: path.into(),
            config,
            tasks: Vec::new(),
            capturing: false,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self, interval: Duration) -> Result<mpsc::Receiver<AudioChunk>> {
        if self.capturing {
            return Err(ConversationError::AcquisitionFailed(
                "file replay is already running".to_string(),
            ));
        }

        let audio = AudioFile::open(&self.path)?;
        let (sample_rate, channels) = effective_format(
            audio.sample_rate,
            audio.channels,
            self.config.target_sample_rate,
            self.config.target_channels,
        );

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (chunk_tx, chunk_rx) = mpsc::channel(32);

        let target_rate = self.config.target_sample_rate;
        let target_channels = self.config.target_channels;
        let frames = audio.frames(REPLAY_FRAME_MS);

        let replay = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(REPLAY_FRAME_MS));
            for frame in frames {
                ticker.tick().await;
                if frame_tx
                    .send(process_frame(frame, target_rate, target_channels))
                    .is_err()
                {
                    return;
                }
            }
            info!("File replay finished");
        });

        let chunker = tokio::spawn(run_chunker(
            frame_rx,
            chunk_tx,
            interval,
            ChunkEncoder::new(sample_rate, channels),
        ));

        self.tasks = vec![replay, chunker];
        self.capturing = true;

        info!("Replaying {} as capture input", audio.path);

        Ok(chunk_rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.capturing {
            return Ok(());
        }

        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.capturing = false;

        info!("File replay stopped");

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "file replay"
    }
}

impl Drop for FileBackend {
    fn drop(&mut self) {
        if !self.tasks.is_empty() {
            warn!("File backend dropped while replaying");
            for task in self.tasks.drain(..) {
                task.abort();
            }
        }
    }
}
