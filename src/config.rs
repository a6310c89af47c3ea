use anyhow::{bail, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::audio::AudioSource;
use crate::persona::ASTRA_SYSTEM_INSTRUCTION;
use crate::session::{SessionConfig, DEFAULT_LIVE_MODEL};
use crate::transport::SessionSetup;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub live: LiveConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct LiveConfig {
    /// WebSocket endpoint of the Live API
    pub endpoint: String,
    /// API key (usually supplied via ASTRA_LIVE__API_KEY)
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub voice: Option<String>,
    /// Overrides the built-in persona
    #[serde(default)]
    pub system_instruction: Option<String>,
    #[serde(default = "default_capture_rate")]
    pub capture_sample_rate: u32,
    #[serde(default = "default_playback_rate")]
    pub playback_sample_rate: u32,
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
    #[serde(default = "default_open_timeout")]
    pub open_timeout_secs: u64,
}

fn default_model() -> String {
    DEFAULT_LIVE_MODEL.to_string()
}

fn default_capture_rate() -> u32 {
    16000
}

fn default_playback_rate() -> u32 {
    24000
}

fn default_frame_size() -> usize {
    4096
}

fn default_open_timeout() -> u64 {
    15
}

impl Config {
    /// Load `path` (any format the config crate knows) overlaid with
    /// `ASTRA_*` environment variables, e.g. `ASTRA_LIVE__API_KEY`
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("ASTRA")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let cfg: Self = settings.try_deserialize()?;
        cfg.live.validate()?;
        Ok(cfg)
    }
}

impl LiveConfig {
    fn validate(&self) -> Result<()> {
        if self.capture_sample_rate == 0 {
            bail!("live.capture_sample_rate must be greater than zero");
        }
        if self.playback_sample_rate == 0 {
            bail!("live.playback_sample_rate must be greater than zero");
        }
        if self.frame_size == 0 {
            bail!("live.frame_size must be greater than zero");
        }
        if self.open_timeout_secs == 0 {
            bail!("live.open_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    /// Session configuration for the given audio source
    pub fn session_config(&self, source: AudioSource) -> SessionConfig {
        let instruction = self
            .system_instruction
            .clone()
            .unwrap_or_else(|| ASTRA_SYSTEM_INSTRUCTION.to_string());

        SessionConfig {
            setup: SessionSetup {
                system_instruction: Some(instruction),
                voice: self.voice.clone(),
                ..SessionSetup::audio(self.model.clone())
            },
            source,
            capture_sample_rate: self.capture_sample_rate,
            frame_size: self.frame_size,
            playback_sample_rate: self.playback_sample_rate,
            open_timeout: Duration::from_secs(self.open_timeout_secs),
            ..SessionConfig::default()
        }
    }
}
