//! Application-level configuration loading: retention window, room code shape and defaults.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "MASBAHA_BACK_CONFIG_PATH";

const DEFAULT_RETENTION_DAYS: u64 = 30;
const DEFAULT_CODE_LENGTH: u32 = 6;
const DEFAULT_CODE_ALLOCATION_ATTEMPTS: u32 = 8;
const DEFAULT_PHRASE: &str = "سبحان الله";
const DEFAULT_MAX_NAME_LENGTH: usize = 64;
const SECONDS_PER_DAY: u64 = 60 * 60 * 24;
/// Upper bound on `retention_days`, roughly a century.
const MAX_RETENTION_DAYS: u64 = 36_500;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    retention_days: u64,
    code_length: u32,
    code_allocation_attempts: u32,
    default_phrase: String,
    max_name_length: usize,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        retention_days = app_config.retention_days,
                        "loaded configuration"
                    );
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

    /// Time to live applied to every key of a room.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days.saturating_mul(SECONDS_PER_DAY))
    }

    /// Number of digits in generated room codes.
    pub fn code_length(&self) -> u32 {
        self.code_length
    }

    /// How many random codes to try before giving up on allocation.
    pub fn code_allocation_attempts(&self) -> u32 {
        self.code_allocation_attempts
    }

    /// Phrase used when a room is created without one.
    pub fn default_phrase(&self) -> &str {
        &self.default_phrase
    }

    /// Longest accepted room or participant name, in characters.
    pub fn max_name_length(&self) -> usize {
        self.max_name_length
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
            code_length: DEFAULT_CODE_LENGTH,
            code_allocation_attempts: DEFAULT_CODE_ALLOCATION_ATTEMPTS,
            default_phrase: DEFAULT_PHRASE.to_string(),
            max_name_length: DEFAULT_MAX_NAME_LENGTH,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    retention_days: Option<u64>,
    code_length: Option<u32>,
    code_allocation_attempts: Option<u32>,
    default_phrase: Option<String>,
    max_name_length: Option<usize>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            retention_days: value
                .retention_days
                .filter(|days| *days > 0)
                .map(|days| days.min(MAX_RETENTION_DAYS))
                .unwrap_or(defaults.retention_days),
            // Codes are kept within u64 range and at least two digits long.
            code_length: value
                .code_length
                .map(|len| len.clamp(2, 18))
                .unwrap_or(defaults.code_length),
            code_allocation_attempts: value
                .code_allocation_attempts
                .map(|attempts| attempts.max(1))
                .unwrap_or(defaults.code_allocation_attempts),
            default_phrase: value
                .default_phrase
                .filter(|phrase| !phrase.trim().is_empty())
                .unwrap_or(defaults.default_phrase),
            max_name_length: value
                .max_name_length
                .filter(|len| *len > 0)
                .unwrap_or(defaults.max_name_length),
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
