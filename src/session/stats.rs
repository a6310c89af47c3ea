use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use super::status::LiveStatus;

/// Statistics about the current (or last) live session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Current lifecycle state
    pub status: LiveStatus,

    /// Identifier of the current or most recent session
    pub session_id: Option<String>,

    /// When that session was started
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds since start
    pub duration_secs: f64,

    /// Microphone frames handed to the transport
    pub frames_sent: u64,

    /// Inbound chunks scheduled for playback
    pub chunks_played: u64,

    /// Inbound chunks dropped (decode or playback failure)
    pub chunks_dropped: u64,

    /// Seconds of model audio scheduled
    pub audio_scheduled_secs: f64,

    /// Why the last session ended in ERROR, if it did
    pub last_error: Option<String>,
}

/// Counters shared between the controller and the session driver
#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    pub frames_sent: AtomicU64,
    pub chunks_played: AtomicU64,
    pub chunks_dropped: AtomicU64,
    pub scheduled_ms: AtomicU64,
}

impl SessionCounters {
    pub fn reset(&self) {
        self.frames_sent.store(0, Ordering::SeqCst);
        self.chunks_played.store(0, Ordering::SeqCst);
        self.chunks_dropped.store(0, Ordering::SeqCst);
        self.scheduled_ms.store(0, Ordering::SeqCst);
    }
}
