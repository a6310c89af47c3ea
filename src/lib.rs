pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod persona;
pub mod session;
pub mod transport;

pub use audio::{
    AudioBackend, AudioBackendFactory, AudioFile, AudioFrame, AudioOutput, AudioSource,
    CaptureConfig, CaptureEvent, EncodedChunk, PlaybackCursor, PlaybackScheduler,
    ScheduledChunk,
};
pub use config::Config;
pub use error::{LiveError, LiveResult};
pub use http::{create_router, AppState};
pub use session::{LiveDevices, LiveSession, LiveStatus, SessionConfig, SessionStats, SystemDevices};
pub use transport::{LiveConnection, SessionSetup, Transport, TransportEvent, WebSocketTransport};
