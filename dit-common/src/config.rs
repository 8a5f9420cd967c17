//! Configuration loading and resolution
//!
//! Tracker configuration is resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`DIT_CONFIG`)
//! 3. Platform TOML config file (`<config_dir>/dit/tracker.toml`)
//! 4. Compiled defaults (fallback)
//!
//! Missing config files SHALL NOT cause termination: a warning is logged and
//! resolution falls through to the next tier. A file that exists but does not
//! parse is a configuration error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "DIT_CONFIG";

/// Environment variable overriding `logging.level`
pub const LOG_LEVEL_ENV_VAR: &str = "DIT_LOG_LEVEL";

/// Upper bound for every timer setting (one hour)
pub const MAX_DELAY_MS: u64 = 3_600_000;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Tracker timing and runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Simulated re-processing delay applied by a retry (milliseconds)
    pub processing_delay_ms: u64,

    /// Stagger between consecutive file promotions during import (milliseconds)
    pub import_stagger_ms: u64,

    /// Simulated parse delay for newly added files (milliseconds)
    pub parse_delay_ms: u64,

    /// Resolve newly added files to `completed` after `parse_delay_ms`
    pub simulate_parsing: bool,

    /// Event bus buffer size
    pub event_capacity: usize,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            processing_delay_ms: 1500,
            import_stagger_ms: 1000,
            parse_delay_ms: 1500,
            simulate_parsing: true,
            event_capacity: 100,
            logging: LoggingConfig::default(),
        }
    }
}

impl TrackerConfig {
    pub fn processing_delay(&self) -> Duration {
        Duration::from_millis(self.processing_delay_ms)
    }

    pub fn import_stagger(&self) -> Duration {
        Duration::from_millis(self.import_stagger_ms)
    }

    pub fn parse_delay(&self) -> Duration {
        Duration::from_millis(self.parse_delay_ms)
    }

    /// Reject values the runtime cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(Error::Config(
                "event_capacity must be greater than zero".to_string(),
            ));
        }
        for (name, value) in [
            ("processing_delay_ms", self.processing_delay_ms),
            ("import_stagger_ms", self.import_stagger_ms),
            ("parse_delay_ms", self.parse_delay_ms),
        ] {
            if value > MAX_DELAY_MS {
                return Err(Error::Config(format!(
                    "{} must be at most {} (got {})",
                    name, MAX_DELAY_MS, value
                )));
            }
        }
        if self.logging.level.trim().is_empty() {
            return Err(Error::Config("logging.level must not be empty".to_string()));
        }
        Ok(())
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TrackerConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML text
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))
    }

    /// Load configuration from a TOML file
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map(Some)
    }
}

/// Where a resolved configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine(PathBuf),
    Environment(PathBuf),
    ConfigFile(PathBuf),
    Defaults,
}

/// Platform config file location (`~/.config/dit/tracker.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("dit").join("tracker.toml"))
}

/// Resolve tracker configuration following the documented priority order
///
/// `DIT_LOG_LEVEL` is applied on top of whichever tier won.
pub fn resolve_config(cli_path: Option<&Path>) -> Result<(TrackerConfig, ConfigSource)> {
    let (mut config, source) = resolve_file_tier(cli_path)?;

    if let Ok(level) = std::env::var(LOG_LEVEL_ENV_VAR) {
        if !level.trim().is_empty() {
            info!(level = %level, "Log level overridden by {}", LOG_LEVEL_ENV_VAR);
            config.logging.level = level;
        }
    }

    Ok((config, source))
}

fn resolve_file_tier(cli_path: Option<&Path>) -> Result<(TrackerConfig, ConfigSource)> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        match TrackerConfig::load_optional(path)? {
            Some(config) => return Ok((config, ConfigSource::CommandLine(path.to_path_buf()))),
            None => warn!(path = %path.display(), "Config file from command line not found"),
        }
    }

    // Priority 2: Environment variable
    if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
        let path = PathBuf::from(env_path);
        match TrackerConfig::load_optional(&path)? {
            Some(config) => return Ok((config, ConfigSource::Environment(path))),
            None => warn!(
                path = %path.display(),
                "Config file from {} not found", CONFIG_ENV_VAR
            ),
        }
    }

    // Priority 3: Platform config file
    if let Some(path) = default_config_path() {
        if let Some(config) = TrackerConfig::load_optional(&path)? {
            return Ok((config, ConfigSource::ConfigFile(path)));
        }
    }

    // Priority 4: Compiled defaults
    info!("No config file found, using compiled defaults");
    Ok((TrackerConfig::default(), ConfigSource::Defaults))
}
