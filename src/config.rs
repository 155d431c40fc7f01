//! Client configuration
//!
//! `FetchConfig` holds the knobs fixed at coordinator construction (cache
//! TTL, concurrency bound, retry schedule, per-attempt timeout). `AppConfig`
//! wraps it with upstream settings and is what the TOML config file holds.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryPolicy;

/// Errors that can occur while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for the expected layout
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings for the fetch pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// How long a successful payload stays cached, in seconds
    pub cache_ttl_secs: u64,
    /// Maximum number of simultaneous upstream calls
    pub max_concurrent_upstream_calls: usize,
    /// Total attempts per fetch, the first one included
    pub max_retry_attempts: u32,
    /// Delay after the first failed attempt, in milliseconds
    pub base_backoff_delay_ms: u64,
    /// Factor applied to the delay after each further failure
    pub backoff_multiplier: f64,
    /// Upper bound on any single backoff delay, in milliseconds
    pub max_backoff_delay_ms: Option<u64>,
    /// Time allowed for one upstream attempt before it counts as transient failure
    pub attempt_timeout_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 15 * 60,          // 15 minutes
            max_concurrent_upstream_calls: 5,
            max_retry_attempts: 4,            // first try plus 3 retries
            base_backoff_delay_ms: 2_000,
            backoff_multiplier: 2.0,
            max_backoff_delay_ms: Some(60_000),
            attempt_timeout_ms: 10_000,
        }
    }
}

impl FetchConfig {
    /// Checks every value is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_upstream_calls == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_upstream_calls must be at least 1".to_string(),
            ));
        }
        if self.max_retry_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_retry_attempts must be at least 1".to_string(),
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "backoff_multiplier must be a finite number >= 1, got {}",
                self.backoff_multiplier
            )));
        }
        if self.attempt_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "attempt_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if let Some(max) = self.max_backoff_delay_ms {
            if max < self.base_backoff_delay_ms {
                return Err(ConfigError::Invalid(format!(
                    "max_backoff_delay_ms ({}) is below base_backoff_delay_ms ({})",
                    max, self.base_backoff_delay_ms
                )));
            }
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Builds the retry policy described by this config
    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(
            self.max_retry_attempts,
            Duration::from_millis(self.base_backoff_delay_ms),
            self.backoff_multiplier,
        );
        match self.max_backoff_delay_ms {
            Some(max) => policy.with_max_delay(Duration::from_millis(max)),
            None => policy,
        }
    }
}

/// Contents of the config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// AlphaVantage API key; the CLI flag or environment variable wins
    pub api_key: Option<String>,
    /// Override for the API base URL
    pub base_url: Option<String>,
    /// AlphaVantage function to request
    pub function: Option<String>,
    /// Directory for the cache snapshot; defaults to the XDG cache dir
    pub snapshot_dir: Option<PathBuf>,
    /// Fetch pipeline settings
    pub fetch: FetchConfig,
}

impl AppConfig {
    /// Default config file location
    ///
    /// Uses `~/.config/quotegate/config.toml` on Linux, or the equivalent
    /// location on other platforms.
    pub fn default_path() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "quotegate")?;
        Some(project_dirs.config_dir().join("config.toml"))
    }

    /// Parses config from TOML text and validates it
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(text)?;
        config.fetch.validate()?;
        Ok(config)
    }

    /// Loads config from a file that must exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Loads the explicit file if given, else the default file if present
    ///
    /// A missing default file yields the built-in defaults; a missing
    /// explicit file is an error.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }
}
