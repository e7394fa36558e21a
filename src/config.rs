//! Configuration module for Parlor.
//!
//! The config file is a flat TOML table. Every field is read on its own:
//! a field that is missing or has the wrong type falls back to its default
//! (with a warning) instead of failing the whole file.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{ParlorError, Result};

/// Environment variable that overrides `ip_pepper`.
pub const PEPPER_ENV: &str = "PARLOR_IP_PEPPER";

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/parlor.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
///
/// Immutable once loaded.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Config {
    /// Host address to bind.
    pub host: String,
    /// Port number to listen on.
    pub port: u16,
    /// Line sent to every new connection.
    pub welcome_msg: String,
    /// Minimum seconds between chat messages.
    pub slow_mode_secs: u64,
    /// Minimum seconds between nickname changes.
    pub nick_slow_secs: u64,
    /// Minimum seconds between other profile edits (color, status, afk).
    pub other_slow_secs: u64,
    /// Default `/timeout` duration in seconds.
    pub timeout_default_secs: u64,
    /// Maximum chat message length.
    pub max_msg_len: usize,
    /// Maximum nickname length.
    pub max_nick_len: usize,
    /// Maximum status length.
    pub max_status_len: usize,
    /// Number of chat messages kept for backlog replay.
    pub history_len: usize,
    /// Seconds without activity before the idle sweep marks someone AFK.
    pub afk_threshold_secs: u64,
    /// Interval of the idle sweep in seconds.
    pub idle_sweep_secs: u64,
    /// Default emote set loaded at startup and by a bare `/emotes`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emote_set: Option<String>,
    /// Base URL of the emote catalog; the set id is appended.
    pub emote_api_base: String,
    /// Extra reserved-name patterns.
    pub nick_reserved: Vec<String>,
    /// Identity snapshot path.
    pub identities_path: String,
    /// Ban snapshot path.
    pub bans_path: String,
    /// Reserved-name pattern file.
    pub nick_filter_path: String,
    /// Profanity list file.
    pub profanity_filter_path: String,
    /// Secret mixed into address hashes. Bans are unchecked without it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_pepper: Option<String>,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3666,
            welcome_msg: "Welcome!".to_string(),
            slow_mode_secs: 1,
            nick_slow_secs: 30,
            other_slow_secs: 5,
            timeout_default_secs: 300,
            max_msg_len: 255,
            max_nick_len: 15,
            max_status_len: 32,
            history_len: 25,
            afk_threshold_secs: 600,
            idle_sweep_secs: 60,
            emote_set: None,
            emote_api_base: "https://api.7tv.app/v3/emote-sets".to_string(),
            nick_reserved: Vec::new(),
            identities_path: "data/identities.json".to_string(),
            bans_path: "data/bans.json".to_string(),
            nick_filter_path: "nickfilter.json".to_string(),
            profanity_filter_path: "profanityfilter.json".to_string(),
            ip_pepper: None,
            logging: LoggingConfig::default(),
        }
    }
}

/// Read one field, falling back to `default` when absent or mistyped.
fn field<T: DeserializeOwned>(table: &toml::Table, key: &str, default: T) -> T {
    match table.get(key) {
        None => default,
        Some(value) => match value.clone().try_into::<T>() {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("config field `{}` is invalid ({}), using default", key, e);
                default
            }
        },
    }
}

/// Read an optional string field; an empty string counts as unset.
fn optional_string(table: &toml::Table, key: &str) -> Option<String> {
    field::<Option<String>>(table, key, None).filter(|s| !s.is_empty())
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ParlorError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration, writing a default file first if none exists.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            let config = Self::default();
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, config.to_toml()?)?;
            return Ok(config);
        }
        Self::load(path)
    }

    /// Load configuration and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load_or_create(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    ///
    /// Only a syntactically broken document is an error; bad fields are
    /// replaced by their defaults.
    pub fn parse(s: &str) -> Result<Self> {
        let table: toml::Table = s
            .parse()
            .map_err(|e| ParlorError::Config(format!("config parse error: {e}")))?;
        Ok(Self::from_table(&table))
    }

    fn from_table(table: &toml::Table) -> Self {
        let d = Self::default();
        Self {
            host: field(table, "host", d.host),
            port: field(table, "port", d.port),
            welcome_msg: field(table, "welcome_msg", d.welcome_msg),
            slow_mode_secs: field(table, "slow_mode_secs", d.slow_mode_secs),
            nick_slow_secs: field(table, "nick_slow_secs", d.nick_slow_secs),
            other_slow_secs: field(table, "other_slow_secs", d.other_slow_secs),
            timeout_default_secs: field(table, "timeout_default_secs", d.timeout_default_secs),
            max_msg_len: field(table, "max_msg_len", d.max_msg_len),
            max_nick_len: field(table, "max_nick_len", d.max_nick_len),
            max_status_len: field(table, "max_status_len", d.max_status_len),
            history_len: field(table, "history_len", d.history_len),
            afk_threshold_secs: field(table, "afk_threshold_secs", d.afk_threshold_secs),
            idle_sweep_secs: field(table, "idle_sweep_secs", d.idle_sweep_secs),
            emote_set: optional_string(table, "emote_set"),
            emote_api_base: field(table, "emote_api_base", d.emote_api_base),
            nick_reserved: field(table, "nick_reserved", d.nick_reserved),
            identities_path: field(table, "identities_path", d.identities_path),
            bans_path: field(table, "bans_path", d.bans_path),
            nick_filter_path: field(table, "nick_filter_path", d.nick_filter_path),
            profanity_filter_path: field(table, "profanity_filter_path", d.profanity_filter_path),
            ip_pepper: optional_string(table, "ip_pepper"),
            logging: field(table, "logging", d.logging),
        }
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ParlorError::Config(format!("config render error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `PARLOR_IP_PEPPER`: Override the address-hash secret
    pub fn apply_env_overrides(&mut self) {
        if let Ok(pepper) = std::env::var(PEPPER_ENV) {
            if !pepper.is_empty() {
                self.ip_pepper = Some(pepper);
            }
        }
    }
}
