//! Microphone capture backend via `cpal`.
//!
//! `cpal::Stream` is `!Send` on some platforms, so the stream lives on a
//! dedicated OS thread for its entire lifetime. The thread reports whether
//! acquisition succeeded exactly once, then parks until asked to stop.

use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioChunk, AudioFrame};
use super::chunk::{run_chunker, ChunkEncoder};
use super::convert::{effective_format, process_frame};
use crate::error::{ConversationError, Result};

/// Capacity of the outbound chunk queue between chunker and session
const CHUNK_QUEUE_CAPACITY: usize = 32;

/// Microphone backend using the default input device
pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    capture_thread: Option<thread::JoinHandle<()>>,
    stop_tx: Option<std_mpsc::Sender<()>>,
    chunker: Option<JoinHandle<()>>,
    capturing: bool,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Self {
        info!(
            "Microphone backend initialized ({}Hz, {} channels)",
            config.target_sample_rate, config.target_channels
        );

        Self {
            config,
            capture_thread: None,
            stop_tx: None,
            chunker: None,
            capturing: false,
        }
    }

    /// Signal the capture thread and abort the chunker. Returns the thread
    /// handle so the caller decides how to wait for it.
    fn signal_stop(&mut self) -> Option<thread::JoinHandle<()>> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(chunker) = self.chunker.take() {
            chunker.abort();
        }
        self.capturing = false;
        self.capture_thread.take()
    }

    /// Blocking release, used only from `Drop`
    fn release(&mut self) {
        if let Some(thread) = self.signal_stop() {
            if thread.join().is_err() {
                error!("Capture thread panicked");
            }
        }
    }
}

/// Wait for the capture thread on the blocking pool so the runtime keeps
/// serving other tasks while the device closes.
async fn join_capture_thread(thread: thread::JoinHandle<()>) {
    match tokio::task::spawn_blocking(move || thread.join()).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => error!("Capture thread panicked"),
        Err(e) => error!("Failed to join capture thread: {}", e),
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self, interval: Duration) -> Result<mpsc::Receiver<AudioChunk>> {
        if self.capturing {
            return Err(ConversationError::AcquisitionFailed(
                "microphone is already capturing".to_string(),
            ));
        }

        info!("Starting microphone capture");

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (init_tx, init_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel();
        let config = self.config.clone();

        let capture_thread = thread::Builder::new()
            .name("loqa-capture".into())
            .spawn(move || run_capture_thread(config, frame_tx, init_tx, stop_rx))
            .map_err(|e| {
                ConversationError::AcquisitionFailed(format!("failed to spawn capture thread: {e}"))
            })?;

        let format = match init_rx.await {
            Ok(Ok(format)) => format,
            Ok(Err(e)) => {
                join_capture_thread(capture_thread).await;
                return Err(e);
            }
            Err(_) => {
                join_capture_thread(capture_thread).await;
                return Err(ConversationError::AcquisitionFailed(
                    "capture thread exited during startup".to_string(),
                ));
            }
        };

        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_QUEUE_CAPACITY);
        let encoder = ChunkEncoder::new(format.0, format.1);
        let chunker = tokio::spawn(run_chunker(frame_rx, chunk_tx, interval, encoder));

        self.capture_thread = Some(capture_thread);
        self.stop_tx = Some(stop_tx);
        self.chunker = Some(chunker);
        self.capturing = true;

        info!(
            "Microphone capture started ({}Hz, {} channels, {}ms chunks)",
            format.0,
            format.1,
            interval.as_millis()
        );

        Ok(chunk_rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.capturing {
            return Ok(());
        }

        info!("Stopping microphone capture");
        if let Some(thread) = self.signal_stop() {
            join_capture_thread(thread).await;
        }
        info!("Microphone released");

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "microphone (cpal)"
    }
}

impl Drop for MicrophoneBackend {
    fn drop(&mut self) {
        if self.capturing {
            warn!("Microphone backend dropped while capturing, releasing device");
            self.release();
        }
    }
}

/// Body of the capture thread. Owns the cpal stream until stop is requested.
fn run_capture_thread(
    config: AudioBackendConfig,
    frame_tx: mpsc::UnboundedSender<AudioFrame>,
    init_tx: oneshot::Sender<Result<(u32, u16)>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let (stream, format) = match open_input_stream(&config, frame_tx) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = init_tx.send(Err(e));
            return;
        }
    };

    if init_tx.send(Ok(format)).is_err() {
        // Caller gave up waiting
        return;
    }

    // Block until stop is requested or the backend is dropped
    let _ = stop_rx.recv();

    drop(stream);
    debug!("Capture thread exiting");
}

fn open_input_stream(
    config: &AudioBackendConfig,
    frame_tx: mpsc::UnboundedSender<AudioFrame>,
) -> Result<(Stream, (u32, u16))> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| ConversationError::AcquisitionFailed("no audio input device found".into()))?;

    let supported = device
        .default_input_config()
        .map_err(|e| ConversationError::AcquisitionFailed(e.to_string()))?;

    let device_rate = supported.sample_rate().0;
    let device_channels = supported.channels();
    let sample_format = supported.sample_format();
    let stream_config: StreamConfig = supported.into();

    info!(
        "Input device: {} ({}Hz, {} channels, {:?})",
        device.name().unwrap_or_default(),
        device_rate,
        device_channels,
        sample_format
    );

    let sink = FrameSink {
        frame_tx,
        started: Instant::now(),
        device_rate,
        device_channels,
        target_rate: config.target_sample_rate,
        target_channels: config.target_channels,
    };

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, sink),
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, sink),
        SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, sink),
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, sink),
        other => {
            return Err(ConversationError::AcquisitionFailed(format!(
                "unsupported sample format: {other:?}"
            )))
        }
    }
    .map_err(|e| ConversationError::AcquisitionFailed(e.to_string()))?;

    stream
        .play()
        .map_err(|e| ConversationError::AcquisitionFailed(e.to_string()))?;

    let format = effective_format(
        device_rate,
        device_channels,
        config.target_sample_rate,
        config.target_channels,
    );

    Ok((stream, format))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    sink: FrameSink,
) -> std::result::Result<Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let samples: Vec<i16> = data.iter().map(|&s| i16::from_sample(s)).collect();
            sink.push(samples);
        },
        |err| error!("Audio input stream error: {}", err),
        None,
    )
}

/// Converts raw device buffers into target-format frames
struct FrameSink {
    frame_tx: mpsc::UnboundedSender<AudioFrame>,
    started: Instant,
    device_rate: u32,
    device_channels: u16,
    target_rate: u32,
    target_channels: u16,
}

impl FrameSink {
    fn push(&self, samples: Vec<i16>) {
        if samples.is_empty() {
            return;
        }

        let frame = AudioFrame {
            samples,
            sample_rate: self.device_rate,
            channels: self.device_channels,
            timestamp_ms: self.started.elapsed().as_millis() as u64,
        };

        // Receiver is gone once the chunker stops; nothing to do then
        let _ = self
            .frame_tx
            .send(process_frame(frame, self.target_rate, self.target_channels));
    }
}
