//! Konfiguration für Sessions und die Anwendung
//!
//! `config.json` liegt im Config-Verzeichnis der Plattform. Fehlt die Datei,
//! gelten die Standardwerte. Umgebungsvariablen überschreiben beides.

use crate::media::{DEFAULT_CAPTURE_INTERVAL, DEFAULT_JPEG_QUALITY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Standard-Endpoint des Streaming-Servers
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8080/ws/";

pub const ENV_ENDPOINT: &str = "LIVE_STREAM_ENDPOINT";
pub const ENV_VIDEO: &str = "LIVE_STREAM_VIDEO";
pub const ENV_AUDIO: &str = "LIVE_STREAM_AUDIO";

const CONFIG_FILE: &str = "config.json";

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Please enable either video or audio.")]
    NoMediaEnabled,

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Failed to read config: {0}")]
    Read(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),
}

// ============================================================================
// SESSION CONFIG
// ============================================================================

/// Kamera-Anforderung
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frame_rate: 30,
        }
    }
}

/// Mikrofon-Anforderung
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// Start-Konfiguration einer Session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    pub video_enabled: bool,
    pub audio_enabled: bool,
    pub video_constraints: VideoConstraints,
    pub audio_constraints: AudioConstraints,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            video_enabled: true,
            audio_enabled: true,
            video_constraints: VideoConstraints::default(),
            audio_constraints: AudioConstraints::default(),
        }
    }
}

impl SessionConfig {
    /// Mindestens eine Medienart muss aktiv sein
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.video_enabled && !self.audio_enabled {
            return Err(ConfigError::NoMediaEnabled);
        }
        Ok(())
    }
}

// ============================================================================
// APP CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub endpoint: String,
    pub capture_interval_ms: u64,
    pub jpeg_quality: u8,
    pub session: SessionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            capture_interval_ms: DEFAULT_CAPTURE_INTERVAL.as_millis() as u64,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            session: SessionConfig::default(),
        }
    }
}

impl AppConfig {
    /// Lädt die Konfiguration aus dem Config-Verzeichnis plus Umgebung
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            Some(path) => {
                tracing::debug!("No config file at {}, using defaults", path.display());
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Pfad zu `config.json`
    pub fn config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "livestream", "live-stream")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        let config: Self =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Übernimmt Überschreibungen aus den Umgebungsvariablen
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Übernimmt Überschreibungen aus einer beliebigen Quelle
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            self.endpoint = endpoint;
        }
        if let Some(flag) = lookup(ENV_VIDEO).and_then(|v| parse_flag(&v)) {
            self.session.video_enabled = flag;
        }
        if let Some(flag) = lookup(ENV_AUDIO).and_then(|v| parse_flag(&v)) {
            self.session.audio_enabled = flag;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| ConfigError::InvalidEndpoint(format!("{}: {}", self.endpoint, e)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::InvalidEndpoint(format!(
                "{}: scheme must be ws or wss",
                self.endpoint
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::InvalidSetting(format!(
                "jpegQuality must be in 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if self.capture_interval_ms == 0 {
            return Err(ConfigError::InvalidSetting(
                "captureIntervalMs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            tracing::warn!("Ignoring invalid boolean override: {}", other);
            None
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
