//! TOML-based configuration for kafkascope.
//!
//! Supports a config file (kafkascope.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [cache]
//! capacity = 256
//! topology_ttl_secs = 300
//! metric_ttl_secs = 60
//!
//! [retry]
//! max_attempts = 3
//! initial_backoff_ms = 200
//! max_backoff_ms = 5000
//! multiplier = 2.0
//!
//! [polling]
//! interval_secs = 60
//!
//! [query]
//! display_page_size = 50
//! default_since_minutes = 30
//!
//! [preferences]
//! path = "${HOME}/.kafkascope/preferences.db"
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::nrql::TimeWindow;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub cache: CacheSettings,
    pub retry: RetrySettings,
    pub polling: PollingSettings,
    pub query: QuerySettings,
    pub preferences: PreferencesSettings,
}

/// Query cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maximum number of cached results.
    pub capacity: usize,

    /// TTL for entity counts and relationships.
    pub topology_ttl_secs: u64,

    /// TTL for rates and health inputs.
    pub metric_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: 256,
            topology_ttl_secs: 300,
            metric_ttl_secs: 60,
        }
    }
}

/// Upstream retry configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
            multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    /// Delay before retry number `retry` (1-based), capped at `max_backoff_ms`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(32) as i32;
        let millis = self.initial_backoff_ms as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(millis.min(self.max_backoff_ms as f64) as u64)
    }
}

/// Polling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingSettings {
    pub interval_secs: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

impl PollingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Query defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Row bound for display subqueries.
    pub display_page_size: u64,

    /// Window used when the caller gives none.
    pub default_since_minutes: u64,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            display_page_size: 50,
            default_since_minutes: 30,
        }
    }
}

impl QuerySettings {
    pub fn default_window(&self) -> TimeWindow {
        TimeWindow::minutes(self.default_since_minutes)
    }
}

/// Preference store configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PreferencesSettings {
    /// SQLite file (supports ${ENV_VAR} expansion). Unset means the
    /// platform data directory.
    pub path: Option<String>,
}

impl PreferencesSettings {
    /// The configured path with environment variables expanded.
    pub fn resolved_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        self.path
            .as_deref()
            .map(|p| expand_env_vars(p).map(PathBuf::from))
            .transpose()
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `KAFKASCOPE_CONFIG`
    /// 2. `./kafkascope.toml`
    /// 3. `<config_dir>/kafkascope/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("KAFKASCOPE_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("kafkascope.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("kafkascope").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let invalid = |msg: &str| -> Result<(), SettingsError> {
            Err(SettingsError::InvalidConfig(msg.to_string()))
        };

        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1");
        }
        if self.retry.multiplier < 1.0 {
            return invalid("retry.multiplier must be >= 1.0");
        }
        if self.polling.interval_secs == 0 {
            return invalid("polling.interval_secs must be positive");
        }
        if self.query.display_page_size == 0 {
            return invalid("query.display_page_size must be positive");
        }
        if self.query.default_since_minutes == 0 {
            return invalid("query.default_since_minutes must be positive");
        }
        Ok(())
    }
}

static ENV_VAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([^}]*)\}|\$([A-Za-z0-9_]+)").expect("static pattern")
});

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax. A lone `$` is kept.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut last = 0;

    for caps in ENV_VAR.captures_iter(s) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1).or_else(|| caps.get(2))) else {
            continue;
        };
        let value = env::var(name.as_str())
            .map_err(|_| SettingsError::MissingEnvVar(name.as_str().to_string()))?;
        result.push_str(&s[last..whole.start()]);
        result.push_str(&value);
        last = whole.end();
    }
    result.push_str(&s[last..]);

    Ok(result)
}
