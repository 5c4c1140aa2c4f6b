//! Application-level configuration loading: session TTLs, grace windows, and gameplay bounds.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::machine::SessionPhase;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZFIRE_BACK_CONFIG_PATH";

/// Lower bound for any question time limit, in seconds.
pub const MIN_QUESTION_TIME_LIMIT_SECS: u32 = 5;
/// Upper bound for any question time limit, in seconds.
pub const MAX_QUESTION_TIME_LIMIT_SECS: u32 = 300;
/// Points awarded for a correct answer when the question carries no override.
pub const DEFAULT_QUESTION_POINTS: i64 = 100;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Store retention while a session sits in the lobby.
    pub lobby_ttl: Duration,
    /// Store retention while a session is active or paused.
    pub active_ttl: Duration,
    /// Store retention once a session is completed or terminated.
    pub terminal_ttl: Duration,
    /// Window a disconnected host has to reconnect before termination.
    pub host_grace: Duration,
    /// Window after which a disconnected participant is evicted by the sweep.
    pub participant_grace: Duration,
    /// Interval between background sweep passes.
    pub sweep_interval: Duration,
    /// Question time limit applied when the host does not configure one.
    pub default_question_time_limit_secs: u32,
    /// Number of characters in a join code.
    pub join_code_length: usize,
    /// Generation attempts before join-code allocation is declared exhausted.
    pub join_code_attempts: u32,
    /// Optional path to the JSON quiz catalog served by the built-in provider.
    pub quiz_catalog_path: Option<PathBuf>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded configuration");
                    config
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

    /// Store retention for a session in the given phase. Lobby sessions are kept
    /// longest, finished sessions shortest.
    pub fn ttl_for(&self, phase: &SessionPhase) -> Duration {
        match phase {
            SessionPhase::Lobby => self.lobby_ttl,
            SessionPhase::Active | SessionPhase::Paused => self.active_ttl,
            SessionPhase::Completed | SessionPhase::Terminated => self.terminal_ttl,
        }
    }

    /// Clamp a host-supplied question time limit into the supported range.
    pub fn clamp_time_limit(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_question_time_limit_secs)
            .clamp(MIN_QUESTION_TIME_LIMIT_SECS, MAX_QUESTION_TIME_LIMIT_SECS)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            lobby_ttl: Duration::from_secs(2 * 60 * 60),
            active_ttl: Duration::from_secs(60 * 60),
            terminal_ttl: Duration::from_secs(15 * 60),
            host_grace: Duration::from_secs(30),
            participant_grace: Duration::from_secs(10 * 60),
            sweep_interval: Duration::from_secs(60),
            default_question_time_limit_secs: 30,
            join_code_length: 6,
            join_code_attempts: 10,
            quiz_catalog_path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
/// Every field is optional; omitted fields keep their default value.
struct RawConfig {
    lobby_ttl_secs: Option<u64>,
    active_ttl_secs: Option<u64>,
    terminal_ttl_secs: Option<u64>,
    host_grace_secs: Option<u64>,
    participant_grace_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
    default_question_time_limit_secs: Option<u32>,
    join_code_length: Option<usize>,
    join_code_attempts: Option<u32>,
    quiz_catalog_path: Option<PathBuf>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            lobby_ttl: raw
                .lobby_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.lobby_ttl),
            active_ttl: raw
                .active_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.active_ttl),
            terminal_ttl: raw
                .terminal_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.terminal_ttl),
            host_grace: raw
                .host_grace_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.host_grace),
            participant_grace: raw
                .participant_grace_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.participant_grace),
            sweep_interval: raw
                .sweep_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            default_question_time_limit_secs: raw
                .default_question_time_limit_secs
                .unwrap_or(defaults.default_question_time_limit_secs),
            join_code_length: raw.join_code_length.unwrap_or(defaults.join_code_length),
            join_code_attempts: raw
                .join_code_attempts
                .unwrap_or(defaults.join_code_attempts),
            quiz_catalog_path: raw.quiz_catalog_path,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_shrinks_toward_terminal_states() {
        let config = AppConfig::default();
        assert!(config.ttl_for(&SessionPhase::Lobby) > config.ttl_for(&SessionPhase::Active));
        assert!(config.ttl_for(&SessionPhase::Active) > config.ttl_for(&SessionPhase::Completed));
        assert_eq!(
            config.ttl_for(&SessionPhase::Completed),
            config.ttl_for(&SessionPhase::Terminated)
        );
    }

    #[test]
    fn time_limit_is_clamped_into_bounds() {
        let config = AppConfig::default();
        assert_eq!(config.clamp_time_limit(None), 30);
        assert_eq!(
            config.clamp_time_limit(Some(1)),
            MIN_QUESTION_TIME_LIMIT_SECS
        );
        assert_eq!(
            config.clamp_time_limit(Some(10_000)),
            MAX_QUESTION_TIME_LIMIT_SECS
        );
        assert_eq!(config.clamp_time_limit(Some(45)), 45);
    }
}
