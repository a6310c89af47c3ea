use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::info;

/// Lifecycle state of the live session, as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiveStatus {
    Offline,
    Connecting,
    Listening,
    Error,
    Disconnected,
}

impl LiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiveStatus::Offline => "OFFLINE",
            LiveStatus::Connecting => "CONNECTING",
            LiveStatus::Listening => "LISTENING",
            LiveStatus::Error => "ERROR",
            LiveStatus::Disconnected => "DISCONNECTED",
        }
    }
}

impl fmt::Display for LiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current status plus a broadcast of every change
pub struct StatusNotifier {
    current: Mutex<LiveStatus>,
    tx: broadcast::Sender<LiveStatus>,
}

impl StatusNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            current: Mutex::new(LiveStatus::Offline),
            tx,
        }
    }

    pub fn get(&self) -> LiveStatus {
        match self.current.lock() {
            Ok(current) => *current,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Record and announce a transition
    pub fn set(&self, status: LiveStatus) {
        {
            let mut current = match self.current.lock() {
                Ok(current) => current,
                Err(poisoned) => poisoned.into_inner(),
            };
            *current = status;
        }

        info!("Live status: {}", status);

        // No subscribers is fine
        let _ = self.tx.send(status);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveStatus> {
        self.tx.subscribe()
    }
}

impl Default for StatusNotifier {
    fn default() -> Self {
        Self::new()
    }
}
