//! Application-level configuration: clock defaults and session heartbeat tuning.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::clock::ClockKind;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "GRIDIRON_BACK_CONFIG_PATH";

/// A regulation quarter, in seconds.
const DEFAULT_GAME_CLOCK_SECONDS: u64 = 900;
/// The standard play clock, in seconds.
const DEFAULT_PLAY_CLOCK_SECONDS: u64 = 40;
const DEFAULT_HEARTBEAT_SECONDS: u64 = 30;
const DEFAULT_HEARTBEAT_MISS_LIMIT: u32 = 3;
const DEFAULT_SEND_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    game_clock_seconds: u64,
    play_clock_seconds: u64,
    heartbeat_interval: Duration,
    heartbeat_miss_limit: u32,
    send_timeout: Duration,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the
    /// baked-in defaults when the file is absent or unreadable.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(path = %path.display(), "loaded configuration from file");
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Seconds a freshly created clock of the given kind starts from. Also
    /// serves as the reset ceiling for that kind.
    pub fn clock_seconds(&self, kind: ClockKind) -> u64 {
        match kind {
            ClockKind::Game => self.game_clock_seconds,
            ClockKind::Play => self.play_clock_seconds,
        }
    }

    /// How often the server pings idle WebSocket sessions.
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Unanswered pings tolerated before a session is reaped.
    pub fn heartbeat_miss_limit(&self) -> u32 {
        self.heartbeat_miss_limit
    }

    /// Longest a single WebSocket send may take before the session is
    /// considered dead.
    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            game_clock_seconds: DEFAULT_GAME_CLOCK_SECONDS,
            play_clock_seconds: DEFAULT_PLAY_CLOCK_SECONDS,
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECONDS),
            heartbeat_miss_limit: DEFAULT_HEARTBEAT_MISS_LIMIT,
            send_timeout: Duration::from_secs(DEFAULT_SEND_TIMEOUT_SECONDS),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    game_clock_seconds: Option<u64>,
    play_clock_seconds: Option<u64>,
    heartbeat_seconds: Option<u64>,
    heartbeat_miss_limit: Option<u32>,
    send_timeout_seconds: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            game_clock_seconds: value
                .game_clock_seconds
                .unwrap_or(defaults.game_clock_seconds),
            play_clock_seconds: value
                .play_clock_seconds
                .unwrap_or(defaults.play_clock_seconds),
            heartbeat_interval: value
                .heartbeat_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.heartbeat_interval),
            heartbeat_miss_limit: value
                .heartbeat_miss_limit
                .unwrap_or(defaults.heartbeat_miss_limit),
            send_timeout: value
                .send_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.send_timeout),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
