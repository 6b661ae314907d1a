//! Configuration loading for litra
//!
//! Settings come from four places, highest priority first:
//! 1. Command-line arguments ([`CliOverrides`])
//! 2. Environment variables (`LITRA_BACKEND_URL`, `LITRA_CHANNEL_URL`, ...)
//! 3. TOML configuration file
//! 4. Compiled defaults
//!
//! A missing or unreadable TOML file never aborts startup: a warning is logged
//! and the compiled defaults are used instead.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable overriding the backend base URL
pub const ENV_BACKEND_URL: &str = "LITRA_BACKEND_URL";
/// Environment variable overriding the event channel URL
pub const ENV_CHANNEL_URL: &str = "LITRA_CHANNEL_URL";
/// Environment variable toggling the realtime channel ("0"/"false" disables)
pub const ENV_REALTIME: &str = "LITRA_REALTIME";
/// Environment variable pointing at an explicit config file
pub const ENV_CONFIG_FILE: &str = "LITRA_CONFIG";
/// Environment variable overriding the log level
pub const ENV_LOG_LEVEL: &str = "LITRA_LOG_LEVEL";

/// Configuration file contents
///
/// Every field has a default so a partial (or empty) file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Base URL of the backend REST API
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Base URL of the realtime event channel (None disables realtime)
    #[serde(default)]
    pub channel_url: Option<String>,

    /// Feature flag for the realtime channel
    #[serde(default = "default_true")]
    pub realtime_enabled: bool,

    #[serde(default = "default_source_language")]
    pub source_language: String,

    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Longest paragraph accepted for editing/translation, in characters
    #[serde(default = "default_max_paragraph_chars")]
    pub max_paragraph_chars: usize,

    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub reconnect: ReconnectConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Batch translation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Upper bound on concurrent translation workers
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

/// Event channel reconnect settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Outgoing events kept while disconnected; oldest are dropped beyond this
    #[serde(default = "default_max_queued_events")]
    pub max_queued_events: usize,
}

impl ReconnectConfig {
    pub fn base_delay(&self) -> Duration {
        crate::time::millis_to_duration(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        crate::time::millis_to_duration(self.max_delay_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_backend_url() -> String {
    "http://127.0.0.1:8000/api".to_string()
}

fn default_true() -> bool {
    true
}

fn default_source_language() -> String {
    "pt".to_string()
}

fn default_target_language() -> String {
    "en".to_string()
}

fn default_max_paragraph_chars() -> usize {
    10_000
}

fn default_max_concurrency() -> usize {
    5
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_queued_events() -> usize {
    1_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            channel_url: None,
            realtime_enabled: true,
            source_language: default_source_language(),
            target_language: default_target_language(),
            max_paragraph_chars: default_max_paragraph_chars(),
            batch: BatchConfig::default(),
            reconnect: ReconnectConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_queued_events: default_max_queued_events(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl TomlConfig {
    /// Channel URL when realtime is both configured and enabled
    pub fn effective_channel_url(&self) -> Option<&str> {
        if !self.realtime_enabled {
            return None;
        }
        self.channel_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Reject values that would make the session misbehave
    pub fn validate(&self) -> Result<()> {
        if self.backend_url.trim().is_empty() {
            return Err(Error::Config("backend_url must not be empty".to_string()));
        }
        if self.batch.max_concurrency == 0 {
            return Err(Error::Config(
                "batch.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.reconnect.base_delay_ms == 0
            || self.reconnect.max_delay_ms < self.reconnect.base_delay_ms
        {
            return Err(Error::Config(format!(
                "reconnect delays invalid (base {}ms, max {}ms)",
                self.reconnect.base_delay_ms, self.reconnect.max_delay_ms
            )));
        }
        if self.max_paragraph_chars == 0 {
            return Err(Error::Config(
                "max_paragraph_chars must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read and parse a TOML configuration file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Default configuration file path for the platform
///
/// `~/.config/litra/config.toml` on Linux, the platform config dir elsewhere.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("litra").join("config.toml"))
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_file: Option<PathBuf>,
    pub backend_url: Option<String>,
    pub channel_url: Option<String>,
    pub no_realtime: bool,
    pub log_level: Option<String>,
    pub max_concurrency: Option<usize>,
}

/// Resolves the effective configuration from all sources
pub struct ConfigResolver {
    cli: CliOverrides,
}

impl ConfigResolver {
    pub fn new(cli: CliOverrides) -> Self {
        Self { cli }
    }

    /// Merge CLI > environment > TOML > defaults, then validate
    pub fn resolve(&self) -> Result<TomlConfig> {
        let mut config = self.load_file_layer();

        // Priority 2: Environment variables
        if let Ok(url) = std::env::var(ENV_BACKEND_URL) {
            debug!("Backend URL from {}", ENV_BACKEND_URL);
            config.backend_url = url;
        }
        if let Ok(url) = std::env::var(ENV_CHANNEL_URL) {
            debug!("Channel URL from {}", ENV_CHANNEL_URL);
            config.channel_url = Some(url);
        }
        if let Ok(flag) = std::env::var(ENV_REALTIME) {
            config.realtime_enabled = !matches!(flag.trim(), "0" | "false" | "off" | "no");
        }
        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            config.logging.level = level;
        }

        // Priority 1: Command-line arguments
        if let Some(url) = &self.cli.backend_url {
            config.backend_url = url.clone();
        }
        if let Some(url) = &self.cli.channel_url {
            config.channel_url = Some(url.clone());
        }
        if self.cli.no_realtime {
            config.realtime_enabled = false;
        }
        if let Some(level) = &self.cli.log_level {
            config.logging.level = level.clone();
        }
        if let Some(max) = self.cli.max_concurrency {
            config.batch.max_concurrency = max;
        }

        config.validate()?;
        Ok(config)
    }

    /// Priority 3/4: TOML file, falling back to compiled defaults
    fn load_file_layer(&self) -> TomlConfig {
        let path = self
            .cli
            .config_file
            .clone()
            .or_else(|| std::env::var(ENV_CONFIG_FILE).ok().map(PathBuf::from))
            .or_else(default_config_path);

        let Some(path) = path else {
            warn!("Could not determine config directory, using defaults");
            return TomlConfig::default();
        };

        if !path.exists() {
            info!("No config file at {}, using defaults", path.display());
            return TomlConfig::default();
        }

        match load_toml_config(&path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Ignoring config file {}: {}", path.display(), e);
                TomlConfig::default()
            }
        }
    }
}
