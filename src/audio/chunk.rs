use std::io::Cursor;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::backend::{AudioChunk, AudioFrame};
use crate::error::{ConversationError, Result};

/// Encode interleaved 16-bit samples as a complete in-memory WAV file
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| ConversationError::AcquisitionFailed(format!("WAV encoder: {e}")))?;

        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| ConversationError::AcquisitionFailed(format!("WAV encoder: {e}")))?;
        }

        writer
            .finalize()
            .map_err(|e| ConversationError::AcquisitionFailed(format!("WAV encoder: {e}")))?;
    }

    Ok(cursor.into_inner())
}

/// Accumulates audio frames and emits them as encoded chunks
///
/// Frames must already be in the target format; the encoder only buffers
/// and wraps them.
pub struct ChunkEncoder {
    sample_rate: u32,
    channels: u16,
    pending: Vec<i16>,
    pending_start_ms: Option<u64>,
    next_sequence: u64,
}

impl ChunkEncoder {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            pending: Vec::new(),
            pending_start_ms: None,
            next_sequence: 0,
        }
    }

    /// Buffer one frame
    pub fn push(&mut self, frame: &AudioFrame) {
        if self.pending_start_ms.is_none() {
            self.pending_start_ms = Some(frame.timestamp_ms);
        }
        self.pending.extend_from_slice(&frame.samples);
    }

    /// Number of buffered samples (all channels)
    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }

    /// Encode everything buffered so far
    ///
    /// Returns `None` when nothing was buffered; an empty chunk is never emitted.
    pub fn flush(&mut self) -> Result<Option<AudioChunk>> {
        if self.pending.is_empty() {
            return Ok(None);
        }

        let samples = std::mem::take(&mut self.pending);
        let timestamp_ms = self.pending_start_ms.take().unwrap_or_default();
        let frames = samples.len() as u64 / self.channels.max(1) as u64;
        let duration_ms = frames * 1000 / self.sample_rate.max(1) as u64;

        let bytes = encode_wav(&samples, self.sample_rate, self.channels)?;

        let chunk = AudioChunk {
            sequence: self.next_sequence,
            bytes,
            timestamp_ms,
            duration_ms,
        };
        self.next_sequence += 1;

        Ok(Some(chunk))
    }
}

/// Drive a chunk encoder from a frame stream on a fixed cadence
///
/// Runs until the frame stream ends or the chunk receiver is dropped. The
/// final partial interval is flushed when the frame stream ends.
pub async fn run_chunker(
    mut frame_rx: mpsc::UnboundedReceiver<AudioFrame>,
    chunk_tx: mpsc::Sender<AudioChunk>,
    interval: Duration,
    mut encoder: ChunkEncoder,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    info!("Chunker started ({}ms interval)", interval.as_millis());

    loop {
        tokio::select! {
            frame = frame_rx.recv() => match frame {
                Some(frame) => encoder.push(&frame),
                None => break,
            },
            _ = ticker.tick() => {
                if !emit(&mut encoder, &chunk_tx).await {
                    info!("Chunk receiver dropped, chunker stopping");
                    return;
                }
            }
        }
    }

    // Capture ended: flush the final partial interval
    emit(&mut encoder, &chunk_tx).await;

    info!("Chunker stopped");
}

async fn emit(encoder: &mut ChunkEncoder, chunk_tx: &mpsc::Sender<AudioChunk>) -> bool {
    match encoder.flush() {
        Ok(Some(chunk)) => {
            debug!(
                "Chunk {} ready ({} bytes, {}ms)",
                chunk.sequence,
                chunk.bytes.len(),
                chunk.duration_ms
            );
            chunk_tx.send(chunk).await.is_ok()
        }
        Ok(None) => !chunk_tx.is_closed(),
        Err(e) => {
            warn!("Failed to encode chunk: {}", e);
            !chunk_tx.is_closed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(samples: Vec<i16>, timestamp_ms: u64) -> AudioFrame {
        AudioFrame {
            samples,
            sample_rate: 16000,
            channels: 1,
            timestamp_ms,
        }
    }

    #[test]
    fn test_flush_empty_returns_none() {
        let mut encoder = ChunkEncoder::new(16000, 1);
        assert!(encoder.flush().unwrap().is_none());
    }

    #[test]
    fn test_flush_assigns_sequence_and_duration() {
        let mut encoder = ChunkEncoder::new(16000, 1);

        encoder.push(&frame(vec![0; 1600], 200));
        encoder.push(&frame(vec![0; 1600], 300));
        let first = encoder.flush().unwrap().unwrap();

        encoder.push(&frame(vec![0; 800], 400));
        let second = encoder.flush().unwrap().unwrap();

        assert_eq!(first.sequence, 0);
        assert_eq!(first.timestamp_ms, 200);
        assert_eq!(first.duration_ms, 200);
        assert_eq!(second.sequence, 1);
        assert_eq!(second.timestamp_ms, 400);
        assert_eq!(second.duration_ms, 50);
        assert_eq!(encoder.pending_samples(), 0);
    }

    #[test]
    fn test_encode_wav_has_riff_header() {
        let bytes = encode_wav(&[1, 2, 3, 4], 16000, 1).unwrap();

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        // header + 4 samples * 2 bytes
        assert!(bytes.len() >= 44 + 8);
    }
}
