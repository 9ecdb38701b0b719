//! Bootstrap configuration loading
//!
//! Configuration file resolution priority order:
//! 1. Command-line argument (highest priority)
//! 2. `PLACEMAP_CONFIG` environment variable
//! 3. `<config_dir>/placemap/config.toml`
//! 4. Built-in defaults (a missing file is not an error)
//!
//! The API token may additionally be supplied through `PLACEMAP_API_TOKEN`,
//! which overrides any token in the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::{Error, Result};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "PLACEMAP_CONFIG";

/// Environment variable carrying the backend bearer token
pub const API_TOKEN_ENV_VAR: &str = "PLACEMAP_API_TOKEN";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Base URL of the places backend
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Bearer token for the backend (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// HTTP port for the map daemon
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Map layer loader tuning (optional)
    #[serde(default)]
    pub loader: LoaderSettings,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            api_token: None,
            port: default_port(),
            logging: LoggingConfig::default(),
            loader: LoaderSettings::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Tuning for source classification, paged loads and viewport debouncing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoaderSettings {
    /// Sources with at least this many places are loaded per viewport
    #[serde(default = "default_large_threshold")]
    pub large_threshold: u64,

    /// Result cap for one paged load
    #[serde(default = "default_paged_limit")]
    pub paged_limit: usize,

    /// Quiet period before a viewport change triggers reloads
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Edge tolerance below which two viewports count as the same
    #[serde(default = "default_viewport_epsilon_deg")]
    pub viewport_epsilon_deg: f64,

    /// Per-request timeout for backend calls
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// EventBus channel capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            large_threshold: default_large_threshold(),
            paged_limit: default_paged_limit(),
            debounce_ms: default_debounce_ms(),
            viewport_epsilon_deg: default_viewport_epsilon_deg(),
            request_timeout_ms: default_request_timeout_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl LoaderSettings {
    /// Reject settings the loader cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.large_threshold == 0 {
            return Err(Error::Config("loader.large_threshold must be at least 1".to_string()));
        }
        if self.paged_limit == 0 {
            return Err(Error::Config("loader.paged_limit must be at least 1".to_string()));
        }
        if !self.viewport_epsilon_deg.is_finite() || self.viewport_epsilon_deg < 0.0 {
            return Err(Error::Config(format!(
                "loader.viewport_epsilon_deg must be a non-negative number, got {}",
                self.viewport_epsilon_deg
            )));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("loader.event_capacity must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_api_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_port() -> u16 {
    5790
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_large_threshold() -> u64 {
    1000
}

fn default_paged_limit() -> usize {
    500
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_viewport_epsilon_deg() -> f64 {
    crate::geo::DEFAULT_EPSILON_DEG
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_event_capacity() -> usize {
    256
}

/// Platform default configuration file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("placemap").join("config.toml"))
}

/// Resolve which configuration file to read, if any
///
/// An explicit path (CLI or environment) is returned even if it does not
/// exist so the caller can warn about it.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    default_config_path().filter(|p| p.exists())
}

/// Parse a TOML configuration file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Write a configuration file, creating parent directories as needed
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Load configuration with graceful degradation
///
/// A missing file logs a warning and falls back to defaults; a file that
/// exists but cannot be parsed, or settings that fail validation, are errors.
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let mut config = match resolve_config_path(cli_arg) {
        Some(path) if path.exists() => {
            let config = load_toml_config(&path)?;
            info!("Loaded configuration from {}", path.display());
            config
        }
        Some(path) => {
            warn!(
                "Configuration file {} not found, using built-in defaults",
                path.display()
            );
            TomlConfig::default()
        }
        None => {
            info!("No configuration file found, using built-in defaults");
            TomlConfig::default()
        }
    };

    if let Ok(token) = std::env::var(API_TOKEN_ENV_VAR) {
        if !token.trim().is_empty() {
            config.api_token = Some(token);
        }
    }

    config.loader.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.port, 5790);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.loader.large_threshold, 1000);
        assert_eq!(config.loader.paged_limit, 500);
        assert_eq!(config.loader.debounce(), Duration::from_millis(300));
        assert!(config.loader.validate().is_ok());
    }

    #[test]
    fn test_partial_loader_section_fills_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            api_base_url = "https://places.example.com"

            [loader]
            paged_limit = 200
            "#,
        )
        .unwrap();

        assert_eq!(config.api_base_url, "https://places.example.com");
        assert_eq!(config.loader.paged_limit, 200);
        assert_eq!(config.loader.large_threshold, 1000);
        assert_eq!(config.port, 5790);
    }

    #[test]
    fn test_validate_rejects_zero_limit_and_negative_epsilon() {
        let settings = LoaderSettings {
            paged_limit: 0,
            ..LoaderSettings::default()
        };
        assert!(settings.validate().is_err());

        let settings = LoaderSettings {
            viewport_epsilon_deg: -1.0,
            ..LoaderSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
