use std::time::Duration;

use crate::audio::{AudioSource, CaptureConfig};
use crate::persona::ASTRA_SYSTEM_INSTRUCTION;
use crate::transport::SessionSetup;

/// Default native-audio model for live sessions
pub const DEFAULT_LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Configuration for a live audio session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Remote session setup (model, persona, voice, modalities)
    pub setup: SessionSetup,

    /// Where microphone audio comes from
    pub source: AudioSource,

    /// Outbound sample rate (the Live API expects 16kHz)
    pub capture_sample_rate: u32,

    /// Samples per outbound frame
    pub frame_size: usize,

    /// Rate assumed for inbound chunks that do not declare one
    pub playback_sample_rate: u32,

    /// Frames held while CONNECTING and flushed on open; older ones are dropped
    pub pre_open_frames: usize,

    /// Time allowed from connect() until the remote end reports open
    pub open_timeout: Duration,
}

impl SessionConfig {
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.capture_sample_rate,
            frame_size: self.frame_size,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            setup: SessionSetup {
                system_instruction: Some(ASTRA_SYSTEM_INSTRUCTION.to_string()),
                voice: Some("Puck".to_string()),
                ..SessionSetup::audio(DEFAULT_LIVE_MODEL)
            },
            source: AudioSource::Microphone,
            capture_sample_rate: 16000,
            frame_size: 4096,
            playback_sample_rate: 24000,
            pre_open_frames: 8, // ~2s at 16kHz / 4096
            open_timeout: Duration::from_secs(15),
        }
    }
}
