use super::config::SessionConfig;
use super::devices::LiveDevices;
use super::stats::{SessionCounters, SessionStats};
use super::status::{LiveStatus, StatusNotifier};
use crate::audio::{AudioBackend, AudioFrame, CaptureEvent, EncodedChunk, PlaybackScheduler};
use crate::error::LiveError;
use crate::transport::{LiveConnection, Transport, TransportEvent};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Live audio session controller
///
/// Owns at most one session at a time. `connect()` acquires the microphone,
/// output and transport and hands them to a driver task; every way a session
/// can end (user disconnect, transport error, capture failure, remote close,
/// dropping the controller) runs the same teardown on that task.
pub struct LiveSession {
    /// Session configuration
    config: SessionConfig,

    /// Opens connections to the remote model
    transport: Arc<dyn Transport>,

    /// Opens microphone and speaker
    devices: Arc<dyn LiveDevices>,

    /// Lifecycle state and change notifications
    status: Arc<StatusNotifier>,

    /// Traffic counters for the current session
    counters: Arc<SessionCounters>,

    /// Identity and outcome of the current/last session
    info: Arc<StdMutex<SessionInfo>>,

    /// The running session, if any
    active: Mutex<Option<ActiveSession>>,

    /// Cancels a connect() that is still acquiring devices or the connection
    cancel_connect: StdMutex<Option<oneshot::Sender<()>>>,
}

#[derive(Debug, Default, Clone)]
struct SessionInfo {
    session_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

struct ActiveSession {
    stop_tx: oneshot::Sender<()>,
    driver: JoinHandle<()>,
}

impl LiveSession {
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        devices: Arc<dyn LiveDevices>,
    ) -> Self {
        Self {
            config,
            transport,
            devices,
            status: Arc::new(StatusNotifier::new()),
            counters: Arc::new(SessionCounters::default()),
            info: Arc::new(StdMutex::new(SessionInfo::default())),
            active: Mutex::new(None),
            cancel_connect: StdMutex::new(None),
        }
    }

    /// Start a live session
    ///
    /// Returns once the microphone, output and connection are acquired; the
    /// status moves to LISTENING when the remote end reports open. On failure
    /// everything acquired so far is released, the status passes through
    /// ERROR back to OFFLINE and the error is returned. Calling this while a
    /// session is running is a no-op. A `disconnect()` issued meanwhile
    /// cancels the attempt: whatever was acquired is released, the status
    /// passes through DISCONNECTED back to OFFLINE and `Ok(())` is returned.
    pub async fn connect(&self) -> Result<(), LiveError> {
        let mut active = self.active.lock().await;

        if let Some(previous) = active.take() {
            if !previous.driver.is_finished() {
                warn!("Live session already active");
                *active = Some(previous);
                return Ok(());
            }
            // Ended on its own (error / remote close); reap it
            let _ = previous.driver.await;
        }

        let session_id = format!("live-{}", uuid::Uuid::new_v4());
        info!("Starting live session: {}", session_id);

        self.counters.reset();
        self.update_info(|info| {
            info.session_id = Some(session_id.clone());
            info.started_at = Some(Utc::now());
            info.last_error = None;
        });
        self.status.set(LiveStatus::Connecting);

        let mut resources = SessionResources::default();

        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        self.set_cancel_connect(Some(cancel_tx));

        let acquired = tokio::select! {
            acquired = self.acquire(&mut resources) => Some(acquired),
            Ok(()) = &mut cancel_rx => None,
        };

        self.set_cancel_connect(None);

        let Some(acquired) = acquired else {
            info!("Live session {} cancelled while connecting", session_id);
            self.status.set(LiveStatus::Disconnected);
            resources.teardown().await;
            self.status.set(LiveStatus::Offline);
            return Ok(());
        };

        match acquired {
            Ok((capture_rx, events)) => {
                let (stop_tx, stop_rx) = oneshot::channel();

                let driver = SessionDriver {
                    resources,
                    capture_rx: Some(capture_rx),
                    events,
                    stop_rx,
                    status: Arc::clone(&self.status),
                    counters: Arc::clone(&self.counters),
                    info: Arc::clone(&self.info),
                    pre_open: VecDeque::new(),
                    pre_open_limit: self.config.pre_open_frames,
                    open_timeout: self.config.open_timeout,
                };

                *active = Some(ActiveSession {
                    stop_tx,
                    driver: tokio::spawn(driver.run()),
                });

                info!("Live session {} connecting", session_id);
                Ok(())
            }
            Err(e) => {
                error!("Failed to start live session: {}", e);
                self.update_info(|info| info.last_error = Some(e.to_string()));
                self.status.set(LiveStatus::Error);
                resources.teardown().await;
                self.status.set(LiveStatus::Offline);
                Err(e)
            }
        }
    }

    /// Stop the live session and release everything it holds
    ///
    /// Safe in any state; when OFFLINE this does nothing. Scheduled playback
    /// that has not been heard yet is cut.
    pub async fn disconnect(&self) {
        // A connect() still acquiring holds `active`; cancel it first
        if let Some(cancel) = self.take_cancel_connect() {
            let _ = cancel.send(());
        }

        let active = self.active.lock().await.take();

        let Some(active) = active else {
            debug!("Disconnect requested while offline");
            return;
        };

        // Fails only if the driver already ended on its own
        let _ = active.stop_tx.send(());

        if let Err(e) = active.driver.await {
            error!("Live session driver panicked: {}", e);
            self.status.set(LiveStatus::Offline);
        }
    }

    /// Current lifecycle state
    pub fn status(&self) -> LiveStatus {
        self.status.get()
    }

    /// Receive every status change from now on
    pub fn subscribe(&self) -> broadcast::Receiver<LiveStatus> {
        self.status.subscribe()
    }

    /// Get current session statistics
    pub fn stats(&self) -> SessionStats {
        let info = self.snapshot_info();
        let duration_secs = info
            .started_at
            .map(|started| Utc::now().signed_duration_since(started).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        SessionStats {
            status: self.status.get(),
            session_id: info.session_id,
            started_at: info.started_at,
            duration_secs,
            frames_sent: self.counters.frames_sent.load(Ordering::SeqCst),
            chunks_played: self.counters.chunks_played.load(Ordering::SeqCst),
            chunks_dropped: self.counters.chunks_dropped.load(Ordering::SeqCst),
            audio_scheduled_secs: self.counters.scheduled_ms.load(Ordering::SeqCst) as f64 / 1000.0,
            last_error: info.last_error,
        }
    }

    /// Open microphone, output and connection, in that order
    async fn acquire(
        &self,
        resources: &mut SessionResources,
    ) -> Result<
        (
            mpsc::UnboundedReceiver<CaptureEvent>,
            mpsc::UnboundedReceiver<TransportEvent>,
        ),
        LiveError,
    > {
        let capture_config = self.config.capture_config();

        let backend = self
            .devices
            .open_capture(&self.config.source, &capture_config)
            .await
            .map_err(|e| classify(e, LiveError::Permission))?;
        let backend = resources.capture.insert(backend);

        info!("Using capture backend: {}", backend.name());

        let capture_rx = backend
            .start()
            .await
            .map_err(|e| classify(e, LiveError::Permission))?;

        let output = self
            .devices
            .open_output()
            .await
            .map_err(|e| classify(e, LiveError::Playback))?;
        resources.playback = Some(PlaybackScheduler::new(
            output,
            self.config.playback_sample_rate,
        ));

        let connect = self.transport.connect(&self.config.setup);
        let (connection, events) = tokio::time::timeout(self.config.open_timeout, connect)
            .await
            .map_err(|_| LiveError::Transport("connection timed out".to_string()))?
            .map_err(|e| classify(e, LiveError::Transport))?;
        resources.connection = Some(connection);

        Ok((capture_rx, events))
    }

    fn set_cancel_connect(&self, cancel: Option<oneshot::Sender<()>>) {
        match self.cancel_connect.lock() {
            Ok(mut slot) => *slot = cancel,
            Err(poisoned) => *poisoned.into_inner() = cancel,
        }
    }

    fn take_cancel_connect(&self) -> Option<oneshot::Sender<()>> {
        match self.cancel_connect.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    fn update_info(&self, f: impl FnOnce(&mut SessionInfo)) {
        update_info(&self.info, f);
    }

    fn snapshot_info(&self) -> SessionInfo {
        match self.info.lock() {
            Ok(info) => info.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        // The driver tears down on its own once signalled
        if let Some(active) = self.active.get_mut().take() {
            let _ = active.stop_tx.send(());
        }
    }
}

fn update_info(info: &StdMutex<SessionInfo>, f: impl FnOnce(&mut SessionInfo)) {
    match info.lock() {
        Ok(mut info) => f(&mut info),
        Err(poisoned) => f(&mut poisoned.into_inner()),
    }
}

/// Keep a `LiveError` raised below the trait boundary, otherwise wrap it
fn classify(err: anyhow::Error, wrap: fn(String) -> LiveError) -> LiveError {
    match err.downcast::<LiveError>() {
        Ok(live) => live,
        Err(other) => wrap(format!("{:#}", other)),
    }
}

/// Everything a session holds that must be released
#[derive(Default)]
struct SessionResources {
    capture: Option<Box<dyn AudioBackend>>,
    connection: Option<Box<dyn LiveConnection>>,
    playback: Option<PlaybackScheduler>,
}

impl SessionResources {
    /// Release everything; each step runs even if an earlier one failed
    async fn teardown(&mut self) {
        // Capture first so no frame is produced once teardown starts
        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.stop().await {
                error!("Failed to stop capture: {}", e);
            }
        }

        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.close().await {
                error!("Failed to close connection: {}", e);
            }
        }

        if let Some(mut playback) = self.playback.take() {
            if let Err(e) = playback.stop() {
                error!("Failed to stop playback: {}", e);
            }
        }

        debug!("Live session resources released");
    }
}

/// Why the driver loop ended
enum Exit {
    Disconnected,
    RemoteClosed(Option<String>),
    Failed(LiveError),
}

/// Single task that owns a running session
struct SessionDriver {
    resources: SessionResources,
    capture_rx: Option<mpsc::UnboundedReceiver<CaptureEvent>>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    stop_rx: oneshot::Receiver<()>,
    status: Arc<StatusNotifier>,
    counters: Arc<SessionCounters>,
    info: Arc<StdMutex<SessionInfo>>,
    pre_open: VecDeque<AudioFrame>,
    pre_open_limit: usize,
    open_timeout: std::time::Duration,
}

impl SessionDriver {
    async fn run(mut self) {
        let exit = self.pump().await;

        match exit {
            Exit::Disconnected => {
                info!("Live session disconnected by user");
                self.status.set(LiveStatus::Disconnected);
            }
            Exit::RemoteClosed(reason) => {
                info!(
                    "Live session closed by remote: {}",
                    reason.as_deref().unwrap_or("no reason given")
                );
                self.status.set(LiveStatus::Disconnected);
            }
            Exit::Failed(e) => {
                error!("Live session failed: {}", e);
                update_info(&self.info, |info| info.last_error = Some(e.to_string()));
                self.status.set(LiveStatus::Error);
            }
        }

        self.pre_open.clear();
        self.resources.teardown().await;
        self.status.set(LiveStatus::Offline);

        info!(
            "Live session ended ({} frames sent, {} chunks played, {} dropped)",
            self.counters.frames_sent.load(Ordering::SeqCst),
            self.counters.chunks_played.load(Ordering::SeqCst),
            self.counters.chunks_dropped.load(Ordering::SeqCst)
        );
    }

    /// Multiplex stop signal, transport events and capture until the session ends
    async fn pump(&mut self) -> Exit {
        let mut listening = false;
        let open_deadline = tokio::time::sleep(self.open_timeout);
        tokio::pin!(open_deadline);

        loop {
            tokio::select! {
                // Stop wins over pending frames and chunks
                biased;

                _ = &mut self.stop_rx => return Exit::Disconnected,

                _ = &mut open_deadline, if !listening => {
                    return Exit::Failed(LiveError::Transport(
                        "remote did not open in time".to_string(),
                    ));
                }

                event = self.events.recv() => match event {
                    Some(TransportEvent::Open) => {
                        if !listening {
                            listening = true;
                            self.status.set(LiveStatus::Listening);
                            if let Err(e) = self.flush_pre_open() {
                                return Exit::Failed(e);
                            }
                        }
                    }
                    Some(TransportEvent::Message(chunk)) => self.play(&chunk),
                    Some(TransportEvent::Error(cause)) => {
                        return Exit::Failed(LiveError::Transport(cause));
                    }
                    Some(TransportEvent::Close(reason)) => return Exit::RemoteClosed(reason),
                    None => return Exit::RemoteClosed(None),
                },

                capture = next_capture(&mut self.capture_rx) => match capture {
                    Some(CaptureEvent::Frame(frame)) => {
                        if listening {
                            if let Err(e) = self.send_frame(&frame) {
                                if e.is_fatal() {
                                    return Exit::Failed(e);
                                }
                                warn!("Dropping outbound frame: {}", e);
                            }
                        } else {
                            self.hold_pre_open(frame);
                        }
                    }
                    Some(CaptureEvent::Failed(cause)) => {
                        return Exit::Failed(LiveError::Permission(cause));
                    }
                    None => {
                        info!("Capture ended; session stays open for responses");
                        self.capture_rx = None;
                    }
                },
            }
        }
    }

    fn send_frame(&mut self, frame: &AudioFrame) -> Result<(), LiveError> {
        let Some(connection) = self.resources.connection.as_mut() else {
            return Err(LiveError::Transport("no connection".to_string()));
        };

        let chunk = EncodedChunk::from_samples(&frame.samples, frame.sample_rate);
        connection
            .send_audio(chunk)
            .map_err(|e| classify(e, LiveError::Transport))?;

        self.counters.frames_sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Hold a frame captured before open; oldest goes first when full
    fn hold_pre_open(&mut self, frame: AudioFrame) {
        if self.pre_open_limit == 0 {
            return;
        }
        if self.pre_open.len() == self.pre_open_limit {
            self.pre_open.pop_front();
            debug!("Dropped oldest pre-open frame");
        }
        self.pre_open.push_back(frame);
    }

    fn flush_pre_open(&mut self) -> Result<(), LiveError> {
        if !self.pre_open.is_empty() {
            debug!("Flushing {} frames captured while connecting", self.pre_open.len());
        }
        while let Some(frame) = self.pre_open.pop_front() {
            self.send_frame(&frame)?;
        }
        Ok(())
    }

    /// Schedule one inbound chunk; a bad chunk is dropped, never fatal
    fn play(&mut self, chunk: &EncodedChunk) {
        let Some(playback) = self.resources.playback.as_mut() else {
            return;
        };

        match playback.enqueue(chunk) {
            Ok(Some(scheduled)) => {
                self.counters.chunks_played.fetch_add(1, Ordering::SeqCst);
                self.counters
                    .scheduled_ms
                    .fetch_add((scheduled.duration * 1000.0).round() as u64, Ordering::SeqCst);
            }
            Ok(None) => debug!("Ignoring empty audio chunk"),
            Err(e) => {
                self.counters.chunks_dropped.fetch_add(1, Ordering::SeqCst);
                warn!("Dropping inbound chunk: {}", e);
            }
        }
    }
}

async fn next_capture(
    rx: &mut Option<mpsc::UnboundedReceiver<CaptureEvent>>,
) -> Option<CaptureEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
