use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::flight::RouteKey;

/// Output channel identifiers accepted in `notification_channels`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    #[serde(alias = "log")]
    Console,
    #[serde(alias = "webhook")]
    Discord,
}

/// Top-level configuration.
///
/// The numeric policy options (`threshold`, the two intervals and the
/// cool-down) have no defaults: a config file without them fails to parse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AirwatchConfig {
    /// Alert when a fare is strictly below this price.
    pub threshold: Decimal,
    /// Seconds between cache monitor ticks.
    pub check_interval_seconds: u64,
    /// Seconds between record store polls.
    pub poll_interval_seconds: u64,
    /// Minutes during which a repeated alert is suppressed. 0 disables throttling.
    pub throttle_cooldown_minutes: u64,
    #[serde(default = "default_channels")]
    pub notification_channels: Vec<ChannelKind>,
    /// Webhook for the `discord` channel. Unset disables that channel.
    #[serde(default)]
    pub discord_webhook_url: Option<String>,
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Root URL of the JSON document store, e.g. `https://project-default-rtdb.firebaseio.com`.
    pub base_url: String,
    /// Optional `auth` query token.
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_requests_path")]
    pub requests_path: String,
    #[serde(default = "default_results_path")]
    pub results_path: String,
    #[serde(default = "default_store_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Directory holding `flight_prices_*.json` route files.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_seconds: u64,
    /// Routes watched by the monitor from startup.
    #[serde(default)]
    pub routes: Vec<RouteKey>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            refresh_interval_seconds: default_refresh_interval(),
            fetch_timeout_seconds: default_fetch_timeout(),
            routes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationsConfig {
    #[serde(default = "default_history_path")]
    pub history_path: String,
    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_seconds: u64,
    /// Total delivery attempts per alert, including the first.
    #[serde(default = "default_webhook_attempts", alias = "webhook_retries")]
    pub webhook_attempts: u8,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            history_path: default_history_path(),
            webhook_timeout_seconds: default_webhook_timeout(),
            webhook_attempts: default_webhook_attempts(),
        }
    }
}

impl AirwatchConfig {
    /// Reject values that parse but cannot run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threshold.is_sign_negative() {
            return Err(ConfigError::Invalid(format!(
                "threshold must not be negative (got {})",
                self.threshold
            )));
        }
        if self.poll_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_seconds must be greater than zero".to_string(),
            ));
        }
        if self.check_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "check_interval_seconds must be greater than zero".to_string(),
            ));
        }
        if self.store.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("store.base_url is empty".to_string()));
        }
        if self.store.timeout_seconds == 0 || self.cache.fetch_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "network timeouts must be greater than zero".to_string(),
            ));
        }
        if self.throttle_cooldown_minutes.checked_mul(60).is_none() {
            return Err(ConfigError::Invalid(format!(
                "throttle_cooldown_minutes is too large (got {})",
                self.throttle_cooldown_minutes
            )));
        }
        if self.notification_channels.is_empty() {
            return Err(ConfigError::Invalid(
                "notification_channels must name at least one channel".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    pub fn throttle_cooldown(&self) -> Duration {
        Duration::from_secs(self.throttle_cooldown_minutes.saturating_mul(60))
    }

    /// The configured webhook URL, ignoring blank values.
    pub fn webhook_url(&self) -> Option<&str> {
        self.discord_webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

fn default_channels() -> Vec<ChannelKind> {
    vec![ChannelKind::Console]
}
fn default_requests_path() -> String {
    "flight_searches".to_string()
}
fn default_results_path() -> String {
    "processed_searches".to_string()
}
fn default_store_timeout() -> u64 {
    10
}
fn default_data_dir() -> String {
    "data".to_string()
}
fn default_refresh_interval() -> u64 {
    300
}
fn default_fetch_timeout() -> u64 {
    10
}
fn default_history_path() -> String {
    "data/notification_history.json".to_string()
}
fn default_webhook_timeout() -> u64 {
    5
}
fn default_webhook_attempts() -> u8 {
    3
}
