//! Airwatch - flight price watcher
//!
//! Polls a remote record store for flight searches, answers them from a cache
//! of route data files, and alerts through throttled notification channels
//! when a fare drops below the configured threshold.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use airwatch::models::AirwatchConfig;
//! use airwatch::daemon::Daemon;
//! use airwatch::listener::{PollingListener, InMemoryRecordStore};
//! use airwatch::notify::{ThrottleManager, ThrottlePolicy};
//! ```

pub use airwatch_cache as cache;
pub use airwatch_listener as listener;
pub use airwatch_models as models;
pub use airwatch_notify as notify;

pub mod daemon;
pub mod error;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use airwatch_cache::{FileFlightSource, FlightCacheManager};
use airwatch_listener::{AlertPolicy, HttpRecordStore, PollingListener, RecordStore};
use airwatch_models::{AirwatchConfig, ChannelKind};
use airwatch_notify::{
    ConsoleChannel, HistoryStore, NotificationChannel, ThrottleManager, ThrottlePolicy,
    WebhookChannel,
};
use tracing::warn;

use crate::error::DaemonError;

/// Environment variable that overrides `discord_webhook_url`.
pub const WEBHOOK_ENV: &str = "DISCORD_WEBHOOK_URL";

/// Parse and validate a TOML config. A non-blank `webhook_override` replaces
/// the file's webhook URL.
pub fn parse_config(
    raw: &str,
    webhook_override: Option<String>,
) -> Result<AirwatchConfig, DaemonError> {
    let mut config: AirwatchConfig = toml::from_str(raw)?;
    if let Some(url) = webhook_override.filter(|u| !u.trim().is_empty()) {
        config.discord_webhook_url = Some(url);
    }
    config.validate()?;
    Ok(config)
}

/// Read a config file, applying the `DISCORD_WEBHOOK_URL` override.
pub fn load_config(path: impl AsRef<Path>) -> Result<AirwatchConfig, DaemonError> {
    let raw = std::fs::read_to_string(path)?;
    parse_config(&raw, std::env::var(WEBHOOK_ENV).ok())
}

/// Build the configured notification channels.
///
/// `discord` without a webhook URL is skipped with a warning. Duplicate
/// entries produce one channel.
pub fn build_channels(config: &AirwatchConfig) -> Vec<Arc<dyn NotificationChannel>> {
    let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();
    let mut seen = Vec::new();
    for &kind in &config.notification_channels {
        if seen.contains(&kind) {
            continue;
        }
        seen.push(kind);
        match kind {
            ChannelKind::Console => channels.push(Arc::new(ConsoleChannel)),
            ChannelKind::Discord => match config.webhook_url() {
                Some(url) => channels.push(Arc::new(
                    WebhookChannel::new(url)
                        .with_timeout(Duration::from_secs(
                            config.notifications.webhook_timeout_seconds,
                        ))
                        .with_attempts(config.notifications.webhook_attempts),
                )),
                None => warn!("discord channel configured without a webhook URL, disabling it"),
            },
        }
    }
    channels
}

/// Build the flight cache over the configured data directory and register
/// the configured routes for monitoring.
pub fn build_cache(config: &AirwatchConfig) -> Arc<FlightCacheManager> {
    let source = Arc::new(FileFlightSource::new(&config.cache.data_dir));
    let cache = FlightCacheManager::new(
        source,
        Duration::from_secs(config.cache.refresh_interval_seconds),
        Duration::from_secs(config.cache.fetch_timeout_seconds),
    );
    for route in &config.cache.routes {
        cache.track(route.clone());
    }
    Arc::new(cache)
}

/// Build the throttle manager with persistent history.
pub async fn build_throttle(config: &AirwatchConfig, policy: ThrottlePolicy) -> Arc<ThrottleManager> {
    let history = HistoryStore::new(&config.notifications.history_path);
    Arc::new(
        ThrottleManager::new(policy, build_channels(config))
            .with_history(history)
            .await,
    )
}

pub fn build_store(config: &AirwatchConfig) -> Arc<dyn RecordStore> {
    Arc::new(
        HttpRecordStore::new(
            &config.store.base_url,
            Duration::from_secs(config.store.timeout_seconds),
        )
        .with_auth_token(config.store.auth_token.clone()),
    )
}

pub fn build_listener(
    config: &AirwatchConfig,
    store: Arc<dyn RecordStore>,
    throttle: Arc<ThrottleManager>,
) -> PollingListener {
    PollingListener::new(store, &config.store.requests_path, &config.store.results_path)
        .with_alerts(AlertPolicy {
            throttle,
            threshold: config.threshold,
        })
}
