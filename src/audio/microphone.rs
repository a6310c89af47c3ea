// Microphone capture using cpal
//
// cpal streams are not Send, so the stream lives on a dedicated thread for
// the lifetime of the capture. The thread feeds a FrameAssembler and pushes
// complete frames into an unbounded channel so the device callback never
// blocks on the session.

use anyhow::{anyhow, bail, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::backend::{AudioBackend, CaptureConfig, CaptureEvent, FrameAssembler};
use crate::error::LiveError;

/// Default input device backend
pub struct MicrophoneBackend {
    config: CaptureConfig,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    capturing: bool,
}

impl MicrophoneBackend {
    pub fn new(config: CaptureConfig) -> Self {
        info!(
            "Microphone backend initialized ({}Hz, {} samples/frame)",
            config.sample_rate, config.frame_size
        );

        Self {
            config,
            stop_tx: None,
            thread: None,
            capturing: false,
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::UnboundedReceiver<CaptureEvent>> {
        if self.capturing {
            bail!("Already capturing");
        }

        info!("Starting microphone capture");

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), LiveError>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let config = self.config.clone();

        let thread = std::thread::Builder::new()
            .name("astra-mic".to_string())
            .spawn(move || {
                let stream = match open_input_stream(&config, event_tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let _ = ready_tx.send(Ok(()));

                // Park until stop() is called or the backend is dropped
                let _ = stop_rx.recv();
                drop(stream);
                info!("Microphone stream released");
            })?;

        let ready = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .map_err(|e| anyhow!("Microphone thread join failed: {}", e))?;

        match ready {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e.into());
            }
            Err(_) => {
                let _ = thread.join();
                return Err(LiveError::Permission("microphone thread exited".to_string()).into());
            }
        }

        self.stop_tx = Some(stop_tx);
        self.thread = Some(thread);
        self.capturing = true;

        info!("Microphone capture started successfully");

        Ok(event_rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.capturing {
            return Ok(());
        }

        info!("Stopping microphone capture");

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(thread) = self.thread.take() {
            if !matches!(
                tokio::task::spawn_blocking(move || thread.join()).await,
                Ok(Ok(()))
            ) {
                error!("Microphone thread panicked");
            }
        }

        self.capturing = false;

        info!("Microphone capture stopped");

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

impl Drop for MicrophoneBackend {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}

/// Open and start the default input device
fn open_input_stream(
    config: &CaptureConfig,
    event_tx: mpsc::UnboundedSender<CaptureEvent>,
) -> Result<cpal::Stream, LiveError> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or_else(|| LiveError::Permission("no input device available".to_string()))?;

    let supported = device
        .default_input_config()
        .map_err(|e| LiveError::Permission(format!("input config unavailable: {}", e)))?;

    let device_rate = supported.sample_rate();
    let device_channels = supported.channels();

    info!(
        "Input device: {}Hz, {} channels, {:?} (resampling to {}Hz mono)",
        device_rate,
        device_channels,
        supported.sample_format(),
        config.sample_rate
    );

    let assembler = FrameAssembler::new(device_rate, device_channels, config);
    let stream_config: cpal::StreamConfig = supported.config();

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => {
            build_input::<f32>(&device, &stream_config, assembler, event_tx)
        }
        cpal::SampleFormat::I16 => {
            build_input::<i16>(&device, &stream_config, assembler, event_tx)
        }
        cpal::SampleFormat::U16 => {
            build_input::<u16>(&device, &stream_config, assembler, event_tx)
        }
        other => {
            return Err(LiveError::Permission(format!(
                "unsupported input sample format: {:?}",
                other
            )))
        }
    }?;

    stream
        .play()
        .map_err(|e| LiveError::Permission(format!("failed to start input stream: {}", e)))?;

    Ok(stream)
}

fn build_input<T>(
    device: &cpal::Device,
    stream_config: &cpal::StreamConfig,
    mut assembler: FrameAssembler,
    event_tx: mpsc::UnboundedSender<CaptureEvent>,
) -> Result<cpal::Stream, LiveError>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    use cpal::Sample;

    let error_tx = event_tx.clone();
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_input_stream(
            stream_config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                scratch.clear();
                scratch.extend(data.iter().map(|&s| s.to_sample::<f32>()));

                for frame in assembler.push(&scratch) {
                    // Receiver gone means the session is tearing down
                    if event_tx.send(CaptureEvent::Frame(frame)).is_err() {
                        return;
                    }
                }
            },
            move |err| {
                warn!("Input stream error: {}", err);
                let _ = error_tx.send(CaptureEvent::Failed(err.to_string()));
            },
            None,
        )
        .map_err(|e| LiveError::Permission(format!("failed to open input stream: {}", e)))
}
