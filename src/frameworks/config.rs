use crate::domain::TrackConfig;
use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

// Runtime/server constants (not race tuning).

pub fn http_port() -> u16 {
    env::var("LED_RACE_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000)
}

/// Serial device to open at startup. Unset means the link starts disconnected.
pub fn serial_port() -> Option<String> {
    env::var("LED_RACE_SERIAL_PORT")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn baud_rate() -> u32 {
    env::var("LED_RACE_BAUD")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(115_200)
}

pub fn track_file() -> PathBuf {
    env::var("LED_RACE_TRACK_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("race.toml"))
}

// Port used by manual connects when no device was configured.
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";

pub const COMMAND_CHANNEL_CAPACITY: usize = 1024;
pub const EVENT_BROADCAST_CAPACITY: usize = 128;
pub const FEED_BROADCAST_CAPACITY: usize = 256;

pub const TICK_INTERVAL: Duration = Duration::from_millis(16);
pub const COUNTDOWN: Duration = Duration::from_millis(2000);
pub const WIN_ANNOUNCEMENT: Duration = Duration::from_millis(3000);
pub const STATE_SEND_INTERVAL: Duration = Duration::from_millis(100);
pub const RESET_PULSE: Duration = Duration::from_millis(150);

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Reads a `TrackConfig` from TOML; missing keys take their defaults, values are clamped.
pub fn load_track_config(path: &Path) -> Result<TrackConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let config: TrackConfig = toml::from_str(&raw)?;
    Ok(config.clamped())
}

/// Like [`load_track_config`], but an absent or broken file falls back to the defaults.
pub fn track_config_or_default(path: &Path) -> TrackConfig {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no track file; using defaults");
        return TrackConfig::default();
    }
    match load_track_config(path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), length = config.length, laps_to_win = config.laps_to_win, "track config loaded");
            config
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = ?e, "invalid track file; using defaults");
            TrackConfig::default()
        }
    }
}
