//! Configuration loading, validation, and management for Swarmloop.
//!
//! Loads configuration from `~/.swarmloop/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! The live-config policy is not part of this file: it travels inside the
//! swarm document and is parsed by [`policy::LiveConfigPolicy`].

pub mod policy;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use policy::{AllowedPaths, LiveConfigPolicy, agent_allowed_paths, swarm_max_steps};

/// The root configuration structure.
///
/// Maps directly to `~/.swarmloop/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub live_config: LiveConfigSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Turn loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Upper bound on steps per turn, unless the swarm policy overrides it.
    #[serde(default = "default_max_steps_per_turn")]
    pub max_steps_per_turn: u32,

    /// Tool error messages longer than this are truncated.
    #[serde(default = "default_error_message_limit")]
    pub error_message_limit: usize,

    /// Root of the per-instance state directories (`~` is expanded).
    #[serde(default = "default_state_dir")]
    pub state_dir: String,
}

fn default_max_steps_per_turn() -> u32 {
    32
}

fn default_error_message_limit() -> usize {
    1000
}

fn default_state_dir() -> String {
    "~/.swarmloop/state".into()
}

impl RuntimeConfig {
    /// The state directory with `~` expanded.
    pub fn state_path(&self) -> PathBuf {
        expand_home(&self.state_dir)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_steps_per_turn: default_max_steps_per_turn(),
            error_message_limit: default_error_message_limit(),
            state_dir: default_state_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfigSettings {
    /// Write `overlay.json` and per-revision effective snapshots after each safe point.
    #[serde(default = "default_true")]
    pub write_snapshots: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LiveConfigSettings {
    fn default() -> Self {
        Self {
            write_snapshots: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.swarmloop/config.toml).
    ///
    /// Environment overrides:
    /// - `SWARMLOOP_STATE_DIR`
    /// - `SWARMLOOP_MAX_STEPS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(dir) = std::env::var("SWARMLOOP_STATE_DIR") {
            self.runtime.state_dir = dir;
        }
        if let Ok(raw) = std::env::var("SWARMLOOP_MAX_STEPS") {
            self.runtime.max_steps_per_turn = raw.parse().map_err(|_| {
                ConfigError::ValidationError(format!("SWARMLOOP_MAX_STEPS is not a number: {raw}"))
            })?;
        }
        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".swarmloop")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime.max_steps_per_turn == 0 {
            return Err(ConfigError::ValidationError(
                "max_steps_per_turn must be at least 1".into(),
            ));
        }

        if self.runtime.error_message_limit == 0 {
            return Err(ConfigError::ValidationError(
                "error_message_limit must be > 0".into(),
            ));
        }

        if self.runtime.state_dir.trim().is_empty() {
            return Err(ConfigError::ValidationError("state_dir must not be empty".into()));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs_home().join(rest),
        None if path == "~" => dirs_home(),
        None => PathBuf::from(path),
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.runtime.max_steps_per_turn, 32);
        assert_eq!(config.runtime.error_message_limit, 1000);
        assert!(config.live_config.write_snapshots);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.runtime.max_steps_per_turn, config.runtime.max_steps_per_turn);
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[runtime]\nmax_steps_per_turn = 3\n\n[logging]\njson = true\n").unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.runtime.max_steps_per_turn, 3);
        assert_eq!(config.runtime.error_message_limit, 1000);
        assert!(config.logging.json);
    }

    #[test]
    fn zero_steps_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[runtime]\nmax_steps_per_turn = 0\n").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[runtime\nmax_steps_per_turn = ").unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.runtime.max_steps_per_turn, 32);
    }

    #[test]
    fn home_expansion() {
        assert_eq!(expand_home("/var/lib/x"), PathBuf::from("/var/lib/x"));
        assert!(expand_home("~/state").ends_with("state"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("max_steps_per_turn = 32"));
        assert!(toml_str.contains("write_snapshots = true"));
    }
}
