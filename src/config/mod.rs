//! Configuration module for kafkascope.
//!
//! Handles the settings file and environment variable expansion.

mod settings;

pub use settings::{
    expand_env_vars, CacheSettings, PollingSettings, PreferencesSettings, QuerySettings,
    RetrySettings, Settings, SettingsError,
};
