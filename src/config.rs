//! Application-level configuration loading, including the seat color palette
//! and store lock tuning.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TURN_CLOCK_BACK_CONFIG_PATH";
/// Fallback color handed out when the palette is exhausted.
const DEFAULT_COLOR: &str = "9e9e9e";

/// Seat colors assigned by default when a creation request omits them.
const DEFAULT_PALETTE: &[&str] = &[
    "e6194b", "3cb44b", "ffe119", "4363d8", "f58231", "911eb4", "46f0f0", "f032e6",
];

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    seat_colors: Vec<String>,
    lock_timeout: Duration,
    lock_retry_limit: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            seat_colors: DEFAULT_PALETTE.iter().map(|c| (*c).to_owned()).collect(),
            lock_timeout: Duration::from_millis(2_000),
            lock_retry_limit: 3,
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to baked-in
    /// defaults when the file is absent or malformed.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        colors = config.seat_colors.len(),
                        "loaded configuration"
                    );
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

    /// Return the first palette color not already listed in `used`.
    ///
    /// When every palette entry is taken we fall back to [`DEFAULT_COLOR`] so
    /// callers always receive a value.
    pub fn first_unused_color(&self, used: &[String]) -> String {
        self.seat_colors
            .iter()
            .find(|candidate| used.iter().all(|existing| existing != *candidate))
            .cloned()
            .unwrap_or_else(|| DEFAULT_COLOR.to_owned())
    }

    /// How long a transaction may wait for a timer's update lock.
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// How many times a command is retried after a transient lock timeout
    /// before the failure is surfaced to the client.
    pub fn lock_retry_limit(&self) -> u32 {
        self.lock_retry_limit
    }
}

/// On-disk configuration shape; every field optional.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    seat_colors: Option<Vec<String>>,
    #[serde(default)]
    lock_timeout_ms: Option<u64>,
    #[serde(default)]
    lock_retry_limit: Option<u32>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            seat_colors: raw
                .seat_colors
                .filter(|colors| !colors.is_empty())
                .unwrap_or(defaults.seat_colors),
            lock_timeout: raw
                .lock_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_timeout),
            lock_retry_limit: raw.lock_retry_limit.unwrap_or(defaults.lock_retry_limit),
        }
    }
}

fn resolve_config_path() -> PathBuf {
    env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_unused_color_skips_taken_entries() {
        let config = AppConfig::default();
        let used = vec!["e6194b".to_owned(), "3cb44b".to_owned()];
        assert_eq!(config.first_unused_color(&used), "ffe119");
    }

    #[test]
    fn exhausted_palette_falls_back_to_the_default_color() {
        let config = AppConfig::default();
        let used: Vec<String> = config.seat_colors.clone();
        assert_eq!(config.first_unused_color(&used), DEFAULT_COLOR);
    }
}
