use thiserror::Error;

/// Failures that affect a live session.
///
/// `Permission` and `Transport` end the session (status `ERROR`, then
/// teardown). `Decode` only ever costs the offending chunk.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LiveError {
    /// Microphone access denied, unavailable or revoked mid-session
    #[error("microphone unavailable: {0}")]
    Permission(String),

    /// Connection failed to open or dropped mid-session
    #[error("transport failure: {0}")]
    Transport(String),

    /// An inbound chunk did not decode to valid PCM
    #[error("invalid audio chunk: {0}")]
    Decode(String),

    /// The output device refused a scheduled chunk
    #[error("playback failure: {0}")]
    Playback(String),
}

impl LiveError {
    /// Whether this error ends the session
    pub fn is_fatal(&self) -> bool {
        matches!(self, LiveError::Permission(_) | LiveError::Transport(_))
    }
}


pub type LiveResult<T> = std::result::Result<T, LiveError>;
