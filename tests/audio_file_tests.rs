// Integration tests for WAV file input, chunk encoding and speech decoding
//
// Test audio is generated into a temporary directory with hound, so no
// fixtures or audio hardware are needed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use loqa_converse::audio::{
    decode_audio, encode_wav, AudioBackendConfig, AudioBackendFactory, AudioFile, AudioSource,
};
use loqa_converse::error::ConversationError;
use tempfile::TempDir;

fn write_tone(path: &Path, sample_rate: u32, channels: u16, millis: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;

    let frames = sample_rate * millis / 1000;
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let sample = ((t * 220.0 * 2.0 * std::f32::consts::PI).sin() * 10000.0) as i16;
        for _ in 0..channels {
            writer.write_sample(sample)?;
        }
    }
    writer.finalize()?;

    Ok(())
}

fn tone_file(
    dir: &TempDir,
    name: &str,
    sample_rate: u32,
    channels: u16,
    millis: u32,
) -> Result<PathBuf> {
    let path = dir.path().join(name);
    write_tone(&path, sample_rate, channels, millis)?;
    Ok(path)
}

#[test]
fn test_audio_file_open() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = tone_file(&temp_dir, "tone.wav", 16000, 2, 500)?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.sample_rate, 16000);
    assert_eq!(audio.channels, 2);
    assert_eq!(audio.samples.len(), 16000);
    assert!((audio.duration_seconds - 0.5).abs() < 0.001);
    assert!(audio.path.contains("tone.wav"));

    Ok(())
}

#[test]
fn test_audio_file_frames_cover_all_samples() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = tone_file(&temp_dir, "tone.wav", 16000, 1, 250)?;
    let audio = AudioFile::open(&path)?;

    let frames = audio.frames(20);

    // 250ms in 20ms frames: 12 full frames and one 10ms remainder
    assert_eq!(frames.len(), 13);
    assert_eq!(frames[0].samples.len(), 320);
    assert_eq!(frames[12].samples.len(), 160);
    assert_eq!(frames[3].timestamp_ms, 60);

    let total: usize = frames.iter().map(|f| f.samples.len()).sum();
    assert_eq!(total, audio.samples.len());

    Ok(())
}

#[test]
fn test_audio_file_nonexistent() {
    let result = AudioFile::open("/nonexistent/path/to/audio.wav");
    assert!(matches!(result, Err(ConversationError::AcquisitionFailed(_))));
}

#[test]
fn test_audio_file_rejects_float_samples() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("float.wav");

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;
    for _ in 0..160 {
        writer.write_sample(0.25f32)?;
    }
    writer.finalize()?;

    let result = AudioFile::open(&path);
    assert!(matches!(result, Err(ConversationError::AcquisitionFailed(_))));

    Ok(())
}

#[test]
fn test_decode_encoded_chunk() -> Result<()> {
    let samples: Vec<i16> = (0..3200).map(|i| (i % 200) as i16 * 100).collect();
    let bytes = encode_wav(&samples, 16000, 1)?;

    let decoded = decode_audio(bytes)?;

    assert_eq!(decoded.sample_rate, 16000);
    assert_eq!(decoded.channels, 1);
    assert_eq!(decoded.samples.len(), 3200);
    assert_eq!(decoded.duration_ms(), 200);

    Ok(())
}

#[test]
fn test_decode_rejects_empty_payload() {
    let result = decode_audio(Vec::new());
    assert!(matches!(result, Err(ConversationError::PlaybackFailed(_))));
}

#[test]
fn test_decode_rejects_garbage() {
    let result = decode_audio(b"this is not audio at all".to_vec());
    assert!(matches!(result, Err(ConversationError::PlaybackFailed(_))));
}

#[tokio::test]
async fn test_file_backend_replays_in_chunks() -> Result<()> {
    let temp_dir = TempDir::new()?;
    // Stereo 32kHz input is converted to 16kHz mono
    let path = tone_file(&temp_dir, "speech.wav", 32000, 2, 600)?;

    let mut backend =
        AudioBackendFactory::create(AudioSource::File(path), AudioBackendConfig::default());
    assert_eq!(backend.name(), "file replay");

    let mut chunks = backend.start(Duration::from_millis(200)).await?;
    assert!(backend.is_capturing());

    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(chunk) = chunks.recv().await {
            received.push(chunk);
        }
    })
    .await?;

    assert!(received.len() >= 2, "got {} chunks", received.len());

    let mut total_ms = 0;
    for (i, chunk) in received.iter().enumerate() {
        assert_eq!(chunk.sequence, i as u64);
        assert!(!chunk.bytes.is_empty());

        let decoded = decode_audio(chunk.bytes.clone())?;
        assert_eq!(decoded.sample_rate, 16000);
        assert_eq!(decoded.channels, 1);
        total_ms += decoded.duration_ms();
    }
    assert!((590..=610).contains(&total_ms), "replayed {}ms", total_ms);

    backend.stop().await?;
    backend.stop().await?;
    assert!(!backend.is_capturing());

    Ok(())
}

#[tokio::test]
async fn test_file_backend_missing_file_fails_start() {
    let mut backend = AudioBackendFactory::create(
        AudioSource::File(PathBuf::from("/nonexistent/input.wav")),
        AudioBackendConfig::default(),
    );

    let result = backend.start(Duration::from_millis(100)).await;

    assert!(matches!(result, Err(ConversationError::AcquisitionFailed(_))));
    assert!(!backend.is_capturing());
}
