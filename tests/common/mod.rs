// Scripted transport and devices for driving LiveSession without a network,
// a microphone or a speaker.

#![allow(dead_code)]

use anyhow::{bail, Result};
use astra_live::{
    AudioBackend, AudioFrame, AudioOutput, AudioSource, CaptureConfig, CaptureEvent,
    EncodedChunk, LiveConnection, LiveDevices, LiveError, LiveStatus, SessionConfig,
    SessionSetup, Transport, TransportEvent,
};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

// ============================================================================
// Transport
// ============================================================================

#[derive(Default)]
pub struct TransportState {
    pub sent: Mutex<Vec<EncodedChunk>>,
    pub events: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    pub setups: Mutex<Vec<SessionSetup>>,
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    pub fail_connect: AtomicBool,
    /// connect() never resolves (handshake stuck)
    pub hang_connect: AtomicBool,
}

#[derive(Clone, Default)]
pub struct FakeTransport {
    pub state: Arc<TransportState>,
}

impl FakeTransport {
    /// Deliver an event as if the server produced it
    pub fn emit(&self, event: TransportEvent) {
        let events = self.state.events.lock().unwrap();
        events
            .as_ref()
            .expect("no open connection")
            .send(event)
            .expect("session stopped listening");
    }

    pub fn sent(&self) -> Vec<EncodedChunk> {
        self.state.sent.lock().unwrap().clone()
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn connect(
        &self,
        setup: &SessionSetup,
    ) -> Result<(Box<dyn LiveConnection>, mpsc::UnboundedReceiver<TransportEvent>)> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        self.state.setups.lock().unwrap().push(setup.clone());

        if self.state.hang_connect.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(LiveError::Transport("connection refused".to_string()).into());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.state.events.lock().unwrap() = Some(tx);

        let connection = FakeConnection {
            state: Arc::clone(&self.state),
            closed: false,
        };
        Ok((Box::new(connection), rx))
    }
}

struct FakeConnection {
    state: Arc<TransportState>,
    closed: bool,
}

#[async_trait::async_trait]
impl LiveConnection for FakeConnection {
    fn send_audio(&mut self, chunk: EncodedChunk) -> Result<()> {
        if self.closed {
            bail!("closed");
        }
        self.state.sent.lock().unwrap().push(chunk);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.state.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

// ============================================================================
// Devices
// ============================================================================

#[derive(Default)]
pub struct CaptureState {
    pub frames: Mutex<Option<mpsc::UnboundedSender<CaptureEvent>>>,
    pub capturing: AtomicBool,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

#[derive(Default)]
pub struct OutputState {
    pub now: Mutex<f64>,
    /// (start_at, sample_count, sample_rate)
    pub scheduled: Mutex<Vec<(f64, usize, u32)>>,
    pub opens: AtomicUsize,
    pub stops: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct FakeDevices {
    pub capture: Arc<CaptureState>,
    pub output: Arc<OutputState>,
    pub deny_microphone: Arc<AtomicBool>,
}

impl FakeDevices {
    /// Push a captured event; false once the session has released the microphone
    pub fn capture_event(&self, event: CaptureEvent) -> bool {
        match self.capture.frames.lock().unwrap().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn capture_frame(&self, samples: Vec<f32>) -> bool {
        self.capture_event(CaptureEvent::Frame(AudioFrame {
            samples,
            sample_rate: 16000,
            timestamp_ms: 0,
        }))
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.capturing.load(Ordering::SeqCst)
    }

    pub fn set_output_time(&self, secs: f64) {
        *self.output.now.lock().unwrap() = secs;
    }

    pub fn scheduled(&self) -> Vec<(f64, usize, u32)> {
        self.output.scheduled.lock().unwrap().clone()
    }

    pub fn output_stops(&self) -> usize {
        self.output.stops.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl LiveDevices for FakeDevices {
    async fn open_capture(
        &self,
        _source: &AudioSource,
        _config: &CaptureConfig,
    ) -> Result<Box<dyn AudioBackend>> {
        if self.deny_microphone.load(Ordering::SeqCst) {
            return Err(LiveError::Permission("permission denied".to_string()).into());
        }
        Ok(Box::new(FakeCapture {
            state: Arc::clone(&self.capture),
        }))
    }

    async fn open_output(&self) -> Result<Box<dyn AudioOutput>> {
        self.output.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeOutput {
            state: Arc::clone(&self.output),
        }))
    }
}

struct FakeCapture {
    state: Arc<CaptureState>,
}

#[async_trait::async_trait]
impl AudioBackend for FakeCapture {
    async fn start(&mut self) -> Result<mpsc::UnboundedReceiver<CaptureEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.state.frames.lock().unwrap() = Some(tx);
        self.state.capturing.store(true, Ordering::SeqCst);
        self.state.starts.fetch_add(1, Ordering::SeqCst);
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.state.frames.lock().unwrap().take();
        self.state.capturing.store(false, Ordering::SeqCst);
        self.state.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.state.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "fake microphone"
    }
}

struct FakeOutput {
    state: Arc<OutputState>,
}

impl AudioOutput for FakeOutput {
    fn current_time(&self) -> f64 {
        *self.state.now.lock().unwrap()
    }

    fn schedule(&mut self, samples: Vec<f32>, sample_rate: u32, start_at: f64) -> Result<()> {
        self.state
            .scheduled
            .lock()
            .unwrap()
            .push((start_at, samples.len(), sample_rate));
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.state.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn config_with_open_timeout(open_timeout: Duration) -> SessionConfig {
    SessionConfig {
        open_timeout,
        ..test_config()
    }
}

pub fn test_config() -> SessionConfig {
    SessionConfig {
        setup: SessionSetup::audio("test-model"),
        ..SessionConfig::default()
    }
}

/// Inbound chunk of `secs` seconds of a constant level at `rate`
pub fn chunk(secs: f64, rate: u32) -> EncodedChunk {
    let n = (secs * rate as f64).round() as usize;
    EncodedChunk::from_samples(&vec![0.2; n], rate)
}

pub fn sine_frame(len: usize, freq: f32, rate: u32) -> Vec<f32> {
    (0..len)
        .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin() * 0.8)
        .collect()
}

/// Poll `cond` until it holds (fails the test after two seconds)
pub async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Read status changes until `target` shows up, returning everything seen
pub async fn wait_status(
    rx: &mut broadcast::Receiver<LiveStatus>,
    target: LiveStatus,
) -> Vec<LiveStatus> {
    let mut seen = Vec::new();
    let result = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let status = rx.recv().await.expect("status channel closed");
            seen.push(status);
            if status == target {
                break;
            }
        }
    })
    .await;

    if result.is_err() {
        panic!("timed out waiting for {} (saw {:?})", target, seen);
    }
    seen
}

/// Drain whatever status changes are already queued
pub fn drain_status(rx: &mut broadcast::Receiver<LiveStatus>) -> Vec<LiveStatus> {
    let mut seen = Vec::new();
    while let Ok(status) = rx.try_recv() {
        seen.push(status);
    }
    seen
}

pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), fut)
        .await
        .expect("operation timed out")
}
