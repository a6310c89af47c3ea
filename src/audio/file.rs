use anyhow::{bail, Context, Result};
use hound::WavReader;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{AudioBackend, CaptureConfig, CaptureEvent, FrameAssembler};
use super::codec::dequantize;

/// A 16-bit PCM WAV file loaded into memory
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples, normalized
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            bail!(
                "Expected 16-bit PCM WAV, got {}-bit {:?}",
                spec.bits_per_sample,
                spec.sample_format
            );
        }

        let samples: Vec<f32> = reader
            .into_samples::<i16>()
            .map(|s| s.map(dequantize))
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// Replays a WAV file as if it were a live microphone
///
/// Frames are paced at real time unless pacing is disabled, so the remote
/// end sees the same cadence a microphone would produce.
pub struct FileBackend {
    file: AudioFile,
    config: CaptureConfig,
    realtime: bool,
    task: Option<JoinHandle<()>>,
    capturing: bool,
}

impl FileBackend {
    pub fn open(path: impl AsRef<Path>, config: CaptureConfig) -> Result<Self> {
        let file = AudioFile::open(path)?;
        Ok(Self::from_file(file, config))
    }

    pub fn from_file(file: AudioFile, config: CaptureConfig) -> Self {
        Self {
            file,
            config,
            realtime: true,
            task: None,
            capturing: false,
        }
    }

    /// Emit frames as fast as the receiver takes them
    pub fn without_pacing(mut self) -> Self {
        self.realtime = false;
        self
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> Result<mpsc::UnboundedReceiver<CaptureEvent>> {
        if self.capturing {
            bail!("Already capturing");
        }

        info!("Starting file capture: {}", self.file.path);

        let (tx, rx) = mpsc::unbounded_channel();

        let mut assembler =
            FrameAssembler::new(self.file.sample_rate, self.file.channels, &self.config);
        let mut frames = assembler.push(&self.file.samples);
        frames.extend(assembler.finish());
        let realtime = self.realtime;

        let task = tokio::spawn(async move {
            let total = frames.len();
            for frame in frames {
                let pace = Duration::from_secs_f64(frame.duration_secs());
                if tx.send(CaptureEvent::Frame(frame)).is_err() {
                    break;
                }
                if realtime {
                    tokio::time::sleep(pace).await;
                }
            }
            debug!("File capture finished ({} frames)", total);
        });

        self.task = Some(task);
        self.capturing = true;

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.capturing {
            return Ok(());
        }

        if let Some(task) = self.task.take() {
            task.abort();
        }

        self.capturing = false;

        info!("File capture stopped");

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "WAV file"
    }
}
