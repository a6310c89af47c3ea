//! Wire messages for the Live `BidiGenerateContent` WebSocket protocol

use serde::{Deserialize, Serialize};

use crate::audio::EncodedChunk;
use crate::error::{LiveError, LiveResult};

// ============================================================================
// Client -> server
// ============================================================================

/// First message on the socket
#[derive(Debug, Serialize, Deserialize)]
pub struct SetupMessage {
    pub setup: Setup,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    /// "models/<name>"
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Kept raw so one malformed part cannot spoil its siblings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<serde_json::Value>,
}

/// One streamed microphone frame
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<EncodedChunk>,
}

impl RealtimeInputMessage {
    pub fn audio(chunk: EncodedChunk) -> Self {
        Self {
            realtime_input: RealtimeInput {
                media_chunks: vec![chunk],
            },
        }
    }
}

// ============================================================================
// Server -> client
// ============================================================================

/// Any message the server sends; only the fields we act on are modelled
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub error: Option<ServerError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
}

#[derive(Debug, Deserialize)]
pub struct ServerError {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ServerMessage {
    /// Audio parts of the model turn, in order
    ///
    /// A part whose `inlineData` is not a valid chunk comes back as a
    /// `Decode` error in its own slot; non-audio parts are skipped.
    pub fn audio_chunks(self) -> Vec<LiveResult<EncodedChunk>> {
        let Some(turn) = self.server_content.and_then(|content| content.model_turn) else {
            return Vec::new();
        };

        turn.parts
            .into_iter()
            .filter_map(|part| part.inline_data)
            .filter_map(|raw| match serde_json::from_value::<EncodedChunk>(raw) {
                Ok(chunk) if chunk.is_audio() => Some(Ok(chunk)),
                Ok(_) => None,
                Err(e) => Some(Err(LiveError::Decode(format!(
                    "malformed inlineData: {}",
                    e
                )))),
            })
            .collect()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| match (&e.message, e.code) {
            (Some(message), Some(code)) => format!("{} ({})", message, code),
            (Some(message), None) => message.clone(),
            (None, Some(code)) => format!("server error {}", code),
            (None, None) => "server error".to_string(),
        })
    }
}
