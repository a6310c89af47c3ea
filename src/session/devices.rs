use anyhow::{anyhow, Result};

use crate::audio::{AudioBackend, AudioBackendFactory, AudioOutput, AudioSource, CaptureConfig, CpalOutput};

/// Per-session access to the microphone and speaker
///
/// A session opens one capture backend and one output when it connects and
/// releases both on teardown.
#[async_trait::async_trait]
pub trait LiveDevices: Send + Sync {
    /// Create the capture backend (not yet started)
    async fn open_capture(
        &self,
        source: &AudioSource,
        config: &CaptureConfig,
    ) -> Result<Box<dyn AudioBackend>>;

    /// Open the output device
    async fn open_output(&self) -> Result<Box<dyn AudioOutput>>;
}

/// Real devices: cpal for microphone and speaker, hound for WAV input
pub struct SystemDevices;

#[async_trait::async_trait]
impl LiveDevices for SystemDevices {
    async fn open_capture(
        &self,
        source: &AudioSource,
        config: &CaptureConfig,
    ) -> Result<Box<dyn AudioBackend>> {
        let source = source.clone();
        let config = config.clone();

        // Opening a WAV file reads it fully
        tokio::task::spawn_blocking(move || AudioBackendFactory::create(source, config))
            .await
            .map_err(|e| anyhow!("Capture setup task failed: {}", e))?
    }

    async fn open_output(&self) -> Result<Box<dyn AudioOutput>> {
        let output = tokio::task::spawn_blocking(CpalOutput::open)
            .await
            .map_err(|e| anyhow!("Output setup task failed: {}", e))??;

        Ok(Box::new(output))
    }
}
