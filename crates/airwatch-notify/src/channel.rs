use airwatch_models::flight::FlightRecord;
use airwatch_models::notification::NotificationFingerprint;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;

use crate::error::NotifyError;

/// An eligible price alert, handed to every configured channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub fingerprint: NotificationFingerprint,
    pub flight: FlightRecord,
    pub threshold: Decimal,
    pub triggered_at: DateTime<Utc>,
}

impl Alert {
    pub fn route_label(&self) -> String {
        match (self.flight.origin.is_empty(), self.flight.destination.is_empty()) {
            (false, false) => format!("{} to {}", self.flight.origin, self.flight.destination),
            (true, false) => self.flight.destination.clone(),
            _ => "unknown route".to_string(),
        }
    }

    pub fn savings(&self) -> Decimal {
        self.threshold - self.flight.price
    }
}

/// Output channel for alerts. Mockable for testing.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, alert: &Alert) -> Result<(), NotifyError>;
}

/// Writes alerts as structured log entries.
#[derive(Debug, Default, Clone)]
pub struct ConsoleChannel;

#[async_trait]
impl NotificationChannel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), NotifyError> {
        info!(
            target: "airwatch::alert",
            carrier = %alert.flight.carrier,
            route = %alert.route_label(),
            price = %alert.flight.price,
            threshold = %alert.threshold,
            savings = %alert.savings(),
            departure = %alert.flight.departure,
            fingerprint = %alert.fingerprint,
            "Price alert"
        );
        Ok(())
    }
}
