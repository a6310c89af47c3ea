//! Live session management
//!
//! This module provides the `LiveSession` controller that manages:
//! - Microphone capture and framing
//! - Streaming encoded frames to the remote model
//! - Gapless playback of the model's audio
//! - A single status signal and guaranteed teardown on every exit path

mod config;
mod devices;
mod session;
mod stats;
mod status;

pub use config::{SessionConfig, DEFAULT_LIVE_MODEL};
pub use devices::{LiveDevices, SystemDevices};
pub use session::LiveSession;
pub use stats::SessionStats;
pub use status::{LiveStatus, StatusNotifier};
