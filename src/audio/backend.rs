use anyhow::Result;
use tokio::sync::mpsc;

/// Captured audio (mono, normalized to [-1.0, 1.0])
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Normalized samples, one per tick (mono)
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Duration of the frame in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Something the capture pipeline reports to the session
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// A complete frame, in capture order
    Frame(AudioFrame),
    /// The device failed or access was revoked; no more frames follow
    Failed(String),
}

/// Configuration for audio capture
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Sample rate delivered to the session (resampled if the device differs)
    pub sample_rate: u32,
    /// Samples per frame
    pub frame_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // Live API input rate
            frame_size: 4096,   // 256ms at 16kHz
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: cpal default input device
/// - File: replay a WAV file in real time (testing, scripted prompts)
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive frames in capture order.
    /// Sending never blocks the capture side.
    async fn start(&mut self) -> Result<mpsc::UnboundedReceiver<CaptureEvent>>;

    /// Stop capturing audio and release the device
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create a capture backend for the given source
    pub fn create(source: AudioSource, config: CaptureConfig) -> Result<Box<dyn AudioBackend>> {
        match source {
            AudioSource::Microphone => {
                let backend = super::microphone::MicrophoneBackend::new(config);
                Ok(Box::new(backend))
            }

            AudioSource::File(path) => {
                let backend = super::file::FileBackend::open(path, config)?;
                Ok(Box::new(backend))
            }
        }
    }
}

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Default microphone input
    Microphone,
    /// WAV file input (for testing/scripted sessions)
    File(String),
}

/// Turns arbitrarily sized device buffers into fixed-size mono frames
///
/// Input is interleaved at the device rate and channel count. Output frames
/// are exactly `frame_size` samples at `target_rate`, in arrival order.
#[derive(Debug)]
pub struct FrameAssembler {
    device_rate: u32,
    device_channels: u16,
    target_rate: u32,
    frame_size: usize,
    /// Mono samples at the target rate not yet emitted
    pending: Vec<f32>,
    /// Fractional read position into the next device buffer (resampling)
    resample_pos: f64,
    /// Last mono sample of the previous buffer (interpolation across buffers)
    last_sample: Option<f32>,
    samples_emitted: u64,
}

impl FrameAssembler {
    pub fn new(device_rate: u32, device_channels: u16, config: &CaptureConfig) -> Self {
        Self {
            device_rate,
            device_channels: device_channels.max(1),
            target_rate: config.sample_rate,
            frame_size: config.frame_size.max(1),
            pending: Vec::with_capacity(config.frame_size * 2),
            resample_pos: 0.0,
            last_sample: None,
            samples_emitted: 0,
        }
    }

    /// Feed one device buffer, returning every frame it completes
    pub fn push(&mut self, interleaved: &[f32]) -> Vec<AudioFrame> {
        let mono = Self::downmix(interleaved, self.device_channels);
        self.resample_into_pending(&mono);

        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_size {
            let rest = self.pending.split_off(self.frame_size);
            let samples = std::mem::replace(&mut self.pending, rest);

            let timestamp_ms = self.samples_emitted * 1000 / self.target_rate.max(1) as u64;
            self.samples_emitted += samples.len() as u64;

            frames.push(AudioFrame {
                samples,
                sample_rate: self.target_rate,
                timestamp_ms,
            });
        }

        frames
    }

    /// Samples buffered towards the next frame
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Pad the partial frame with silence and emit it (end of input)
    pub fn finish(&mut self) -> Option<AudioFrame> {
        if self.pending.is_empty() {
            return None;
        }

        let padding = self.frame_size - self.pending.len();
        self.pending.extend(std::iter::repeat(0.0).take(padding));
        self.push(&[]).pop()
    }

    /// Average interleaved channels into mono
    fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
        if channels == 1 {
            return interleaved.to_vec();
        }

        interleaved
            .chunks_exact(channels as usize)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }

    /// Linear interpolation from the device rate to the target rate
    fn resample_into_pending(&mut self, mono: &[f32]) {
        if mono.is_empty() {
            return;
        }

        if self.device_rate == self.target_rate {
            self.pending.extend_from_slice(mono);
            return;
        }

        // Source samples advanced per output sample
        let step = self.device_rate as f64 / self.target_rate as f64;

        // Position -1 refers to the last sample of the previous buffer
        let last_idx = mono.len() - 1;
        let sample_at = |idx: isize, last: Option<f32>| -> f32 {
            if idx < 0 {
                last.unwrap_or(mono[0])
            } else {
                mono[(idx as usize).min(last_idx)]
            }
        };

        let mut pos = self.resample_pos;
        while pos <= last_idx as f64 {
            let base = pos.floor();
            let idx0 = base as isize;
            let frac = (pos - base) as f32;
            let s0 = sample_at(idx0, self.last_sample);
            let s1 = sample_at(idx0 + 1, self.last_sample);
            self.pending.push(s0 + (s1 - s0) * frac);
            pos += step;
        }

        // Carry the read position over into the next buffer's coordinates
        self.resample_pos = pos - mono.len() as f64;
        self.last_sample = mono.last().copied();
    }
}
