//! Configuration management for the alert pipeline
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all pipeline settings. It uses the `figment`
//! crate to load configuration from an `alertpipe.toml` file and merge it
//! with environment variables.

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// The main configuration struct for the pipeline.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// The logging level for the pipeline.
    pub log_level: String,
    /// Throttling and grouping policy.
    pub throttle: ThrottleConfig,
    /// Notification channel settings.
    pub channels: ChannelsConfig,
}

/// Throttling and grouping policy for outbound notifications.
///
/// Durations are expressed as millisecond scalars so the struct stays flat
/// for TOML and environment override purposes; use the accessor methods to
/// obtain `Duration`s.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ThrottleConfig {
    /// Maximum number of notifications across all alerts within one
    /// `rate_period_ms` window. Zero disables the global limit.
    pub rate_limit: u32,
    /// Length of the global sliding rate window in milliseconds.
    pub rate_period_ms: u64,
    /// Minimum time between two notifications for the same alert id,
    /// in milliseconds.
    pub cooldown_ms: u64,
    /// Whether admitted events are batched before dispatch.
    pub grouping: bool,
    /// Debounce delay before a group is flushed, in milliseconds.
    pub group_wait_ms: u64,
    /// A group reaching this many events is flushed immediately.
    pub max_group_size: usize,
    /// Label names that participate in the group key.
    pub group_by_labels: Vec<String>,
    /// Reserved interval for re-notifying still-firing alerts, in
    /// milliseconds. Validated but not yet scheduled by the pipeline.
    pub repeat_interval_ms: u64,
}

/// Notification channel settings.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ChannelsConfig {
    /// Generic HTTP webhook channel.
    pub webhook: Option<WebhookConfig>,
    /// Log every notification through `tracing` as well.
    #[serde(default)]
    pub log_enabled: bool,
}

/// Configuration for the generic webhook channel.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebhookConfig {
    /// The webhook endpoint URL.
    pub url: String,
    /// Administrative on/off switch. Defaults to enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// HTTP timeout for each delivery attempt, in seconds.
    #[serde(default = "default_webhook_timeout")]
    pub timeout_seconds: u64,
}

fn default_true() -> bool {
    true
}

fn default_webhook_timeout() -> u64 {
    10
}

/// Invalid configuration values. The one class of error that is fatal at
/// construction time rather than recovered.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    NonPositiveDuration { field: &'static str },

    #[error("max_group_size must be at least 1")]
    ZeroGroupSize,
}

impl ThrottleConfig {
    /// Validates the policy, failing fast on values that would make the
    /// pipeline misbehave silently.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_period_ms == 0 {
            return Err(ConfigError::NonPositiveDuration {
                field: "rate_period_ms",
            });
        }
        if self.cooldown_ms == 0 {
            return Err(ConfigError::NonPositiveDuration {
                field: "cooldown_ms",
            });
        }
        if self.group_wait_ms == 0 {
            return Err(ConfigError::NonPositiveDuration {
                field: "group_wait_ms",
            });
        }
        if self.repeat_interval_ms == 0 {
            return Err(ConfigError::NonPositiveDuration {
                field: "repeat_interval_ms",
            });
        }
        if self.max_group_size == 0 {
            return Err(ConfigError::ZeroGroupSize);
        }
        Ok(())
    }

    pub fn rate_period(&self) -> Duration {
        Duration::from_millis(self.rate_period_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn group_wait(&self) -> Duration {
        Duration::from_millis(self.group_wait_ms)
    }

    pub fn repeat_interval(&self) -> Duration {
        Duration::from_millis(self.repeat_interval_ms)
    }
}

impl Config {
    /// Loads the pipeline configuration from the specified file.
    ///
    /// # Arguments
    /// * `config_path` - The path to the TOML configuration file.
    pub fn load(config_path: &str) -> Result<Self> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            // Allow overriding with environment variables, e.g., ALERTPIPE_LOG_LEVEL=debug
            .merge(Env::prefixed("ALERTPIPE_").split("__"))
            .extract()?;
        config.throttle.validate()?;
        Ok(config)
    }
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            throttle: ThrottleConfig::default(),
            channels: ChannelsConfig::default(),
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            rate_limit: 100,
            rate_period_ms: 60_000,
            cooldown_ms: 300_000,
            grouping: true,
            group_wait_ms: 30_000,
            max_group_size: 50,
            group_by_labels: vec!["service".to_string()],
            repeat_interval_ms: 14_400_000,
        }
    }
}
