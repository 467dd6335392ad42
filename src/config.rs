use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::audio::AudioBackendConfig;
use crate::session::SessionOptions;

pub const DEFAULT_CONFIG_PATH: &str = "config/loqa-converse.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// WebSocket endpoint of the conversation service
    pub url: String,
    pub connect_timeout_ms: u64,
    pub fetch_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub chunk_interval_ms: u64,
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub path: PathBuf,
    pub persist: bool,
    pub live_transcript: bool,
    pub reset_on_stop: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "loqa-converse".to_string(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1".to_string(),
            port: 3010,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8000/ws".to_string(),
            connect_timeout_ms: 5000,
            fetch_timeout_ms: 10000,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            chunk_interval_ms: 1000,
            sample_rate: 16000,
            channels: 1,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/conversation-history.json"),
            persist: true,
            live_transcript: true,
            reset_on_stop: false,
        }
    }
}

impl Config {
    /// Load from a TOML file. Keys missing from the file keep their defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()
            .with_context(|| format!("Failed to read config {}", path))?;

        settings
            .try_deserialize()
            .with_context(|| format!("Invalid config {}", path))
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            chunk_interval: Duration::from_millis(self.audio.chunk_interval_ms.max(1)),
            persist_history: self.history.persist,
            live_transcript: self.history.live_transcript,
            reset_on_stop: self.history.reset_on_stop,
        }
    }

    pub fn audio_backend_config(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            target_sample_rate: self.audio.sample_rate,
            target_channels: self.audio.channels,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.server.connect_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.server.fetch_timeout_ms)
    }
}
