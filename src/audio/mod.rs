pub mod backend;
pub mod codec;
pub mod file;
pub mod microphone;
pub mod output;
pub mod playback;

pub use backend::{
    AudioBackend, AudioBackendFactory, AudioFrame, AudioSource, CaptureConfig, CaptureEvent,
    FrameAssembler,
};
pub use codec::{decode_pcm16, encode_pcm16, pcm_mime_type, EncodedChunk};
pub use file::{AudioFile, FileBackend};
pub use microphone::MicrophoneBackend;
pub use output::CpalOutput;
pub use playback::{AudioOutput, PlaybackCursor, PlaybackScheduler, ScheduledChunk};
