//! Configuration loading and validation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::fetch::HttpProviderConfig;
use crate::models::ManagerId;
use crate::parse_duration;
use crate::sync::{PollConfig, RetryPolicy};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Http,
    File,
}

/// Upstream snapshot provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// "http" or "file"
    #[serde(default = "default_provider_kind")]
    pub kind: ProviderKind,

    /// Base URL for the HTTP provider
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Directory of JSON documents for the file provider
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,

    /// Timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Max retries
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_provider_kind() -> ProviderKind {
    ProviderKind::Http
}

fn default_base_url() -> String {
    "http://localhost:9000/api".to_string()
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("./snapshots")
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            base_url: default_base_url(),
            snapshot_dir: default_snapshot_dir(),
            timeout_seconds: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl ProviderConfig {
    pub fn http(&self) -> HttpProviderConfig {
        HttpProviderConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.timeout_seconds),
            ..Default::default()
        }
    }
}

/// Live polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    /// Poll interval (e.g., "15s", "1m")
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    /// Gameweek to follow; unset follows the provider's current gameweek
    #[serde(default)]
    pub gameweek: Option<u32>,

    /// Manager ids to aggregate
    #[serde(default)]
    pub managers: Vec<u64>,

    #[serde(default = "default_squad_ttl")]
    pub squad_ttl_seconds: u64,

    #[serde(default = "default_initial_delay")]
    pub retry_initial_delay_ms: u64,

    #[serde(default = "default_backoff")]
    pub retry_backoff_multiplier: f64,
}

fn default_poll_interval() -> String {
    "15s".to_string()
}

fn default_squad_ttl() -> u64 {
    3600
}

fn default_initial_delay() -> u64 {
    1000
}

fn default_backoff() -> f64 {
    2.0
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            gameweek: None,
            managers: Vec::new(),
            squad_ttl_seconds: default_squad_ttl(),
            retry_initial_delay_ms: default_initial_delay(),
            retry_backoff_multiplier: default_backoff(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "*".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub live: LiveConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            provider: ProviderConfig::default(),
            live: LiveConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &PathBuf) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "Provider timeout must be greater than 0".to_string(),
            ));
        }

        if self.provider.kind == ProviderKind::Http {
            url::Url::parse(&self.provider.base_url).map_err(|e| {
                ConfigError::ValidationError(format!(
                    "Invalid provider base_url {}: {}",
                    self.provider.base_url, e
                ))
            })?;
        }

        match parse_duration(&self.live.poll_interval) {
            Some(d) if !d.is_zero() => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid poll interval: {}",
                    self.live.poll_interval
                )))
            }
        }

        if self.live.retry_backoff_multiplier < 1.0 {
            return Err(ConfigError::ValidationError(
                "Retry backoff multiplier must be at least 1.0".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "Server port must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the coordinator's poll settings.
    pub fn poll_config(&self) -> Result<PollConfig, ConfigError> {
        let interval = parse_duration(&self.live.poll_interval).ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "Invalid poll interval: {}",
                self.live.poll_interval
            ))
        })?;

        Ok(PollConfig {
            interval,
            gameweek: self.live.gameweek,
            managers: self.live.managers.iter().copied().map(ManagerId).collect(),
            retry: RetryPolicy {
                max_retries: self.provider.max_retries,
                initial_delay_ms: self.live.retry_initial_delay_ms,
                backoff_multiplier: self.live.retry_backoff_multiplier,
            },
            squad_ttl: Duration::from_secs(self.live.squad_ttl_seconds),
        })
    }
}
