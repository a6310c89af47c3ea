// PCM16 <-> base64 transport codec
//
// Outbound microphone frames and inbound model audio share the same wire
// representation: 16-bit signed little-endian PCM, base64 encoded.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{LiveError, LiveResult};

/// Scale between normalized floats and 16-bit PCM
const PCM16_SCALE: f32 = 32768.0;

/// One transport-ready audio segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedChunk {
    /// e.g. "audio/pcm;rate=16000"
    pub mime_type: String,
    /// Base64-encoded PCM16 LE bytes
    pub data: String,
}

impl EncodedChunk {
    /// Encode a block of normalized samples captured at `sample_rate`
    pub fn from_samples(samples: &[f32], sample_rate: u32) -> Self {
        Self {
            mime_type: pcm_mime_type(sample_rate),
            data: encode_pcm16(samples),
        }
    }

    /// Decode back to normalized samples
    pub fn decode(&self) -> LiveResult<Vec<f32>> {
        decode_pcm16(&self.data)
    }

    /// Sample rate declared by the `rate=` parameter of the mime type
    pub fn sample_rate(&self) -> Option<u32> {
        self.mime_type
            .split(';')
            .skip(1)
            .filter_map(|param| param.trim().strip_prefix("rate="))
            .find_map(|rate| rate.trim().parse().ok())
    }

    /// Whether the chunk carries audio at all
    pub fn is_audio(&self) -> bool {
        self.mime_type.starts_with("audio/")
    }
}

/// Mime type for raw PCM at the given rate
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// Quantize one normalized sample to PCM16 (truncates toward zero, saturates)
pub fn quantize(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * PCM16_SCALE) as i16
}

/// Convert one PCM16 sample back to a normalized float
pub fn dequantize(sample: i16) -> f32 {
    sample as f32 / PCM16_SCALE
}

/// Quantize samples and base64 encode the little-endian bytes
pub fn encode_pcm16(samples: &[f32]) -> String {
    let pcm_bytes: Vec<u8> = samples
        .iter()
        .flat_map(|&s| quantize(s).to_le_bytes())
        .collect();

    base64::engine::general_purpose::STANDARD.encode(pcm_bytes)
}

/// Base64 decode and de-quantize PCM16 little-endian bytes
pub fn decode_pcm16(data: &str) -> LiveResult<Vec<f32>> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| LiveError::Decode(format!("bad base64: {}", e)))?;

    if bytes.len() % 2 != 0 {
        return Err(LiveError::Decode(format!(
            "odd PCM16 byte count: {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| dequantize(i16::from_le_bytes([pair[0], pair[1]])))
        .collect())
}
