// Sample format conversion for captured audio
//
// Device capture usually runs at 44.1/48kHz stereo; outbound chunks are
// 16kHz mono. Conversion is deliberately simple: decimation for rate and
// channel averaging for mono.

use super::backend::AudioFrame;

/// Convert a frame to the target rate and channel count
pub fn process_frame(
    frame: AudioFrame,
    target_sample_rate: u32,
    target_channels: u16,
) -> AudioFrame {
    let mut processed = frame;

    if processed.channels != target_channels && target_channels == 1 {
        processed = to_mono(processed);
    }

    if processed.sample_rate != target_sample_rate {
        processed = downsample(processed, target_sample_rate);
    }

    processed
}

/// Downsample audio frame by decimation
pub fn downsample(frame: AudioFrame, target_rate: u32) -> AudioFrame {
    if frame.sample_rate == target_rate || target_rate == 0 {
        return frame;
    }

    let ratio = frame.sample_rate / target_rate;
    if ratio <= 1 {
        return frame; // Can't upsample
    }

    let channels = frame.channels.max(1) as usize;

    // Decimate whole interleaved frames so channels stay aligned
    let downsampled: Vec<i16> = frame
        .samples
        .chunks_exact(channels)
        .step_by(ratio as usize)
        .flatten()
        .copied()
        .collect();

    AudioFrame {
        samples: downsampled,
        sample_rate: frame.sample_rate / ratio,
        channels: frame.channels,
        timestamp_ms: frame.timestamp_ms,
    }
}

/// Convert interleaved multi-channel audio to mono by averaging channels
pub fn to_mono(frame: AudioFrame) -> AudioFrame {
    if frame.channels <= 1 {
        return frame;
    }

    let channels = frame.channels as usize;
    let mono_samples: Vec<i16> = frame
        .samples
        .chunks_exact(channels)
        .map(|chunk| {
            let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect();

    AudioFrame {
        samples: mono_samples,
        sample_rate: frame.sample_rate,
        channels: 1,
        timestamp_ms: frame.timestamp_ms,
    }
}

/// Rate and channel count that `process_frame` produces for a given input format
pub fn effective_format(
    sample_rate: u32,
    channels: u16,
    target_sample_rate: u32,
    target_channels: u16,
) -> (u32, u16) {
    let channels = if channels != target_channels && target_channels == 1 {
        1
    } else {
        channels
    };

    let ratio = if target_sample_rate == 0 {
        1
    } else {
        sample_rate / target_sample_rate
    };
    let sample_rate = if ratio > 1 { sample_rate / ratio } else { sample_rate };

    (sample_rate, channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(samples: Vec<i16>, sample_rate: u32, channels: u16) -> AudioFrame {
        AudioFrame {
            samples,
            sample_rate,
            channels,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_to_mono_averages_pairs() {
        let mono = to_mono(frame(vec![100, 200, -100, -300], 16000, 2));

        assert_eq!(mono.channels, 1);
        assert_eq!(mono.samples, vec![150, -200]);
    }

    #[test]
    fn test_to_mono_keeps_mono_frames() {
        let mono = to_mono(frame(vec![1, 2, 3], 16000, 1));
        assert_eq!(mono.samples, vec![1, 2, 3]);
    }

    #[test]
    fn test_downsample_by_three() {
        let down = downsample(frame(vec![0, 1, 2, 3, 4, 5, 6, 7, 8], 48000, 1), 16000);

        assert_eq!(down.sample_rate, 16000);
        assert_eq!(down.samples, vec![0, 3, 6]);
    }

    #[test]
    fn test_downsample_stereo_keeps_channels_aligned() {
        // [L, R] pairs: (0,10) (1,11) (2,12) (3,13)
        let down = downsample(frame(vec![0, 10, 1, 11, 2, 12, 3, 13], 32000, 2), 16000);

        assert_eq!(down.samples, vec![0, 10, 2, 12]);
    }

    #[test]
    fn test_downsample_never_upsamples() {
        let same = downsample(frame(vec![1, 2, 3], 8000, 1), 16000);
        assert_eq!(same.sample_rate, 8000);
        assert_eq!(same.samples.len(), 3);
    }

    #[test]
    fn test_process_frame_48k_stereo_to_16k_mono() {
        let samples: Vec<i16> = (0..12).map(|i| i * 10).collect();
        let out = process_frame(frame(samples, 48000, 2), 16000, 1);

        assert_eq!(out.channels, 1);
        assert_eq!(out.sample_rate, 16000);
        assert_eq!(out.samples.len(), 2);
    }

    #[test]
    fn test_effective_format_matches_process_frame() {
        for (rate, channels) in [(48000, 2), (44100, 2), (16000, 1), (8000, 1), (32000, 1)] {
            let samples = vec![0i16; 960 * channels as usize];
            let out = process_frame(frame(samples, rate, channels), 16000, 1);
            assert_eq!(
                effective_format(rate, channels, 16000, 1),
                (out.sample_rate, out.channels)
            );
        }
    }
}
