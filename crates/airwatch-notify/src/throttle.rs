use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use airwatch_models::flight::FlightRecord;
use airwatch_models::notification::NotificationFingerprint;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::channel::{Alert, NotificationChannel};
use crate::history::HistoryStore;

/// How repeated alerts for the same fingerprint are gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottlePolicy {
    /// Every eligible alert is dispatched (forced/manual notifications).
    Disabled,
    /// At most one dispatch per fingerprint within the window.
    Cooldown(chrono::Duration),
}

impl ThrottlePolicy {
    /// A zero cool-down maps to `Disabled`.
    pub fn from_cooldown(cooldown: Duration) -> Self {
        if cooldown.is_zero() {
            return ThrottlePolicy::Disabled;
        }
        ThrottlePolicy::Cooldown(
            chrono::Duration::from_std(cooldown).unwrap_or_else(|_| chrono::Duration::days(36_500)),
        )
    }
}

/// Gates price alerts by threshold and cool-down, then fans them out to channels.
///
/// The fingerprint map is checked and updated under one lock, so two
/// concurrent callers can never both pass the cool-down for the same
/// fingerprint. Once an alert passes the gate it counts as sent, even if a
/// channel fails to deliver it.
pub struct ThrottleManager {
    policy: ThrottlePolicy,
    channels: Vec<Arc<dyn NotificationChannel>>,
    last_dispatch: Mutex<HashMap<NotificationFingerprint, DateTime<Utc>>>,
    history: Option<HistoryStore>,
}

impl ThrottleManager {
    pub fn new(policy: ThrottlePolicy, channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self {
            policy,
            channels,
            last_dispatch: Mutex::new(HashMap::new()),
            history: None,
        }
    }

    /// Persist dispatches to `history` and seed the throttle map from it.
    /// An unreadable history file is logged and treated as empty.
    pub async fn with_history(mut self, history: HistoryStore) -> Self {
        match history.load().await {
            Ok(saved) => {
                let mut last = self.last_dispatch.lock().await;
                last.extend(saved.throttle_cache);
                debug!(entries = last.len(), "Loaded throttle state");
            }
            Err(e) => {
                warn!(path = %history.path().display(), error = %e, "Could not load notification history");
            }
        }
        self.history = Some(history);
        self
    }

    pub fn policy(&self) -> ThrottlePolicy {
        self.policy
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Evaluate a flight against `threshold` now. Returns whether an alert was dispatched.
    pub async fn evaluate(&self, flight: &FlightRecord, threshold: Decimal) -> bool {
        self.evaluate_at(flight, threshold, Utc::now()).await
    }

    pub async fn evaluate_at(
        &self,
        flight: &FlightRecord,
        threshold: Decimal,
        now: DateTime<Utc>,
    ) -> bool {
        if flight.price >= threshold {
            debug!(carrier = %flight.carrier, price = %flight.price, threshold = %threshold, "Price not below threshold");
            return false;
        }

        let fingerprint = NotificationFingerprint::from_flight(flight);
        {
            let mut last = self.last_dispatch.lock().await;
            if let (ThrottlePolicy::Cooldown(window), Some(previous)) =
                (self.policy, last.get(&fingerprint))
            {
                if now.signed_duration_since(*previous) < window {
                    debug!(fingerprint = %fingerprint, last_sent = %previous, "Alert throttled");
                    return false;
                }
            }
            last.insert(fingerprint.clone(), now);
        }

        let alert = Alert {
            fingerprint,
            flight: flight.clone(),
            threshold,
            triggered_at: now,
        };
        let delivered = self.dispatch(&alert).await;
        info!(
            fingerprint = %alert.fingerprint,
            price = %flight.price,
            delivered,
            channels = self.channels.len(),
            "Alert dispatched"
        );

        if let Some(history) = &self.history {
            if let Err(e) = history.record(&alert).await {
                warn!(error = %e, "Failed to persist notification history");
            }
        }
        true
    }

    /// Last dispatch time recorded for a fingerprint.
    pub async fn last_dispatch(&self, fingerprint: &NotificationFingerprint) -> Option<DateTime<Utc>> {
        self.last_dispatch.lock().await.get(fingerprint).copied()
    }

    async fn dispatch(&self, alert: &Alert) -> usize {
        let mut delivered = 0;
        for channel in &self.channels {
            match channel.deliver(alert).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(channel = channel.name(), error = %e, "Channel delivery failed");
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotifyError;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingChannel {
        name: String,
        fail: bool,
        calls: AtomicUsize,
    }

    impl RecordingChannel {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NotificationChannel for RecordingChannel {
        fn name(&self) -> &str {
            &self.name
        }

        async fn deliver(&self, _alert: &Alert) -> Result<(), NotifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(NotifyError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            Ok(())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 5, 15, 0, 0).unwrap()
    }

    fn flight(price: Decimal) -> FlightRecord {
        FlightRecord {
            price,
            carrier: "Porter".to_string(),
            origin: "Toronto".to_string(),
            destination: "Ottawa".to_string(),
            departure: String::new(),
            fetched_at: t0(),
            source: "test".to_string(),
        }
    }

    fn thirty_minutes() -> ThrottlePolicy {
        ThrottlePolicy::from_cooldown(Duration::from_secs(30 * 60))
    }

    #[tokio::test]
    async fn second_alert_inside_cooldown_is_throttled() {
        let channel = RecordingChannel::new("rec");
        let manager = ThrottleManager::new(thirty_minutes(), vec![channel.clone()]);

        assert!(manager.evaluate_at(&flight(dec!(150)), dec!(200), t0()).await);
        assert!(
            !manager
                .evaluate_at(&flight(dec!(150)), dec!(200), t0() + chrono::Duration::minutes(5))
                .await
        );
        assert_eq!(channel.calls(), 1);
    }

    #[tokio::test]
    async fn alert_after_cooldown_dispatches_again() {
        let channel = RecordingChannel::new("rec");
        let manager = ThrottleManager::new(thirty_minutes(), vec![channel.clone()]);

        assert!(manager.evaluate_at(&flight(dec!(150)), dec!(200), t0()).await);
        assert!(
            manager
                .evaluate_at(&flight(dec!(150)), dec!(200), t0() + chrono::Duration::minutes(31))
                .await
        );
        assert_eq!(channel.calls(), 2);
    }

    #[tokio::test]
    async fn price_at_threshold_never_dispatches() {
        let channel = RecordingChannel::new("rec");
        let manager = ThrottleManager::new(ThrottlePolicy::Disabled, vec![channel.clone()]);

        assert!(!manager.evaluate_at(&flight(dec!(200)), dec!(200), t0()).await);
        assert!(!manager.evaluate_at(&flight(dec!(250)), dec!(200), t0()).await);
        assert!(manager.evaluate_at(&flight(dec!(199.99)), dec!(200), t0()).await);
        assert_eq!(channel.calls(), 1);
    }

    #[tokio::test]
    async fn rejected_price_leaves_no_throttle_record() {
        let manager = ThrottleManager::new(thirty_minutes(), vec![]);
        let expensive = flight(dec!(200));
        assert!(!manager.evaluate_at(&expensive, dec!(200), t0()).await);
        assert!(manager
            .last_dispatch(&NotificationFingerprint::from_flight(&expensive))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn disabled_policy_never_throttles() {
        let channel = RecordingChannel::new("rec");
        let manager = ThrottleManager::new(
            ThrottlePolicy::from_cooldown(Duration::ZERO),
            vec![channel.clone()],
        );
        assert_eq!(manager.policy(), ThrottlePolicy::Disabled);

        for _ in 0..3 {
            assert!(manager.evaluate_at(&flight(dec!(150)), dec!(200), t0()).await);
        }
        assert_eq!(channel.calls(), 3);
    }

    #[tokio::test]
    async fn different_fingerprints_are_independent() {
        let manager = ThrottleManager::new(thirty_minutes(), vec![]);
        let mut other = flight(dec!(150));
        other.carrier = "WestJet".to_string();

        assert!(manager.evaluate_at(&flight(dec!(150)), dec!(200), t0()).await);
        assert!(manager.evaluate_at(&other, dec!(200), t0()).await);
        // Same bucket as 150.
        assert!(!manager.evaluate_at(&flight(dec!(155)), dec!(200), t0()).await);
        // Different bucket.
        assert!(manager.evaluate_at(&flight(dec!(140)), dec!(200), t0()).await);
    }

    #[tokio::test]
    async fn failing_channel_does_not_block_others_or_roll_back() {
        let broken = RecordingChannel::failing("broken");
        let healthy = RecordingChannel::new("healthy");
        let manager = ThrottleManager::new(
            thirty_minutes(),
            vec![broken.clone() as Arc<dyn NotificationChannel>, healthy.clone()],
        );

        assert!(manager.evaluate_at(&flight(dec!(150)), dec!(200), t0()).await);
        assert_eq!(broken.calls(), 1);
        assert_eq!(healthy.calls(), 1);

        // Counted as sent: the retry inside the window is throttled.
        assert!(
            !manager
                .evaluate_at(&flight(dec!(150)), dec!(200), t0() + chrono::Duration::minutes(1))
                .await
        );
        assert_eq!(manager.channel_names(), vec!["broken", "healthy"]);
    }

    #[tokio::test]
    async fn concurrent_evaluations_dispatch_once() {
        let channel = RecordingChannel::new("rec");
        let manager = Arc::new(ThrottleManager::new(thirty_minutes(), vec![channel.clone()]));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager.evaluate_at(&flight(dec!(150)), dec!(200), t0()).await
            }));
        }

        let mut dispatched = 0;
        for handle in handles {
            if handle.await.unwrap() {
                dispatched += 1;
            }
        }
        assert_eq!(dispatched, 1);
        assert_eq!(channel.calls(), 1);
    }

    #[tokio::test]
    async fn history_seeds_throttle_state_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let first = ThrottleManager::new(thirty_minutes(), vec![])
            .with_history(HistoryStore::new(&path))
            .await;
        assert!(first.evaluate_at(&flight(dec!(150)), dec!(200), t0()).await);
        drop(first);

        let restarted = ThrottleManager::new(thirty_minutes(), vec![])
            .with_history(HistoryStore::new(&path))
            .await;
        assert!(
            !restarted
                .evaluate_at(&flight(dec!(150)), dec!(200), t0() + chrono::Duration::minutes(10))
                .await
        );

        let history = HistoryStore::new(&path).load().await.unwrap();
        assert_eq!(history.notifications.len(), 1);
        assert_eq!(history.notifications[0].flight.price, dec!(150));
    }
}
