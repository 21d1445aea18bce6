//! Engine configuration stored in `~/.pillars/config.json`.
//!
//! Every field has a serde default, so an empty file (or no file at all)
//! yields a working configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not resolve home directory")]
    HomeDirNotFound,
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Database location; `None` resolves to `~/.pillars/pillars.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
    /// IANA timezone used when a request does not carry one.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Offset in minutes (`UTC = local + offset`) paired with `timezone`.
    #[serde(default)]
    pub timezone_offset_minutes: i32,
    /// Rolling client-summary window length.
    #[serde(default = "default_rolling_window_days")]
    pub rolling_window_days: u32,
    /// Recompute debounce after a record write, in milliseconds.
    #[serde(default = "default_recompute_debounce_ms")]
    pub recompute_debounce_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            timezone: default_timezone(),
            timezone_offset_minutes: 0,
            rolling_window_days: default_rolling_window_days(),
            recompute_debounce_ms: default_recompute_debounce_ms(),
        }
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_rolling_window_days() -> u32 {
    7
}

fn default_recompute_debounce_ms() -> u64 {
    1500
}

impl EngineConfig {
    /// Default config file location: `~/.pillars/config.json`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeDirNotFound)?;
        Ok(home.join(".pillars").join("config.json"))
    }

    /// Load from the default location; a missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load from an explicit path; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.timezone, "UTC");
        assert_eq!(config.rolling_window_days, 7);
        assert_eq!(config.recompute_debounce_ms, 1500);
        assert!(config.db_path.is_none());
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "timezone": "America/Chicago", "timezoneOffsetMinutes": 360 }"#)
            .unwrap();

        let config = EngineConfig::load_from(&path).unwrap();
        assert_eq!(config.timezone, "America/Chicago");
        assert_eq!(config.timezone_offset_minutes, 360);
        assert_eq!(config.rolling_window_days, 7);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            EngineConfig::load_from(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
