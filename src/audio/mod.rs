pub mod backend;
pub mod chunk;
pub mod convert;
pub mod decode;
pub mod file;
pub mod microphone;
pub mod playback;
pub mod rodio_sink;

pub use backend::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioChunk, AudioFrame, AudioSource,
};
pub use chunk::{encode_wav, ChunkEncoder};
pub use decode::{decode_audio, DecodedAudio};
pub use file::{AudioFile, FileBackend};
pub use microphone::MicrophoneBackend;
pub use playback::{
    PlaybackController, PlaybackDoneCallback, PlaybackEnd, PlaybackHandle, PlaybackSink,
    PlaybackState,
};
pub use rodio_sink::RodioSink;
