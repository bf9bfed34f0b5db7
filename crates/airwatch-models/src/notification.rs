use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::flight::FlightRecord;

/// Width of the price buckets used when fingerprinting alerts.
pub const PRICE_BUCKET_WIDTH: Decimal = Decimal::TEN;

/// Throttle key: `carrier|destination|bucket`, case-folded.
///
/// Two fares from the same carrier to the same destination whose prices fall
/// in the same bucket count as the same event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationFingerprint(String);

impl NotificationFingerprint {
    pub fn from_flight(flight: &FlightRecord) -> Self {
        let bucket = (flight.price / PRICE_BUCKET_WIDTH).floor() * PRICE_BUCKET_WIDTH;
        Self(format!(
            "{}|{}|{}",
            flight.carrier.trim().to_lowercase(),
            flight.destination.trim().to_lowercase(),
            bucket.normalize()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One dispatched alert, as kept in the history file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub fingerprint: NotificationFingerprint,
    pub flight: FlightRecord,
    #[serde(with = "crate::timestamp::flexible")]
    pub sent_at: DateTime<Utc>,
}

/// Persisted notification state.
///
/// ```json
/// {
///   "notifications": [ { "id": "...", "fingerprint": "...", "flight": {...}, "sent_at": "..." } ],
///   "throttle_cache": { "westjet|ottawa|150": "2025-07-05T15:00:00+00:00" }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct NotificationHistory {
    #[serde(default)]
    pub notifications: Vec<NotificationRecord>,
    #[serde(default)]
    pub throttle_cache: BTreeMap<NotificationFingerprint, DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn flight(price: Decimal, carrier: &str, destination: &str) -> FlightRecord {
        FlightRecord {
            price,
            carrier: carrier.to_string(),
            origin: "Toronto".to_string(),
            destination: destination.to_string(),
            departure: String::new(),
            fetched_at: Utc.with_ymd_and_hms(2025, 7, 5, 15, 0, 0).unwrap(),
            source: String::new(),
        }
    }

    #[test]
    fn fingerprint_buckets_prices() {
        let a = NotificationFingerprint::from_flight(&flight(dec!(150.00), "WestJet", "Ottawa"));
        let b = NotificationFingerprint::from_flight(&flight(dec!(159.99), "westjet ", "OTTAWA"));
        let c = NotificationFingerprint::from_flight(&flight(dec!(160), "WestJet", "Ottawa"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str(), "westjet|ottawa|150");
    }

    #[test]
    fn fingerprint_distinguishes_carrier_and_destination() {
        let base = NotificationFingerprint::from_flight(&flight(dec!(150), "WestJet", "Ottawa"));
        assert_ne!(
            base,
            NotificationFingerprint::from_flight(&flight(dec!(150), "Porter", "Ottawa"))
        );
        assert_ne!(
            base,
            NotificationFingerprint::from_flight(&flight(dec!(150), "WestJet", "Montreal"))
        );
    }

    #[test]
    fn history_reads_empty_document() {
        let history: NotificationHistory =
            serde_json::from_str(r#"{"notifications": [], "throttle_cache": {}}"#).unwrap();
        assert_eq!(history, NotificationHistory::default());
        let history: NotificationHistory = serde_json::from_str("{}").unwrap();
        assert!(history.notifications.is_empty());
    }

    #[test]
    fn history_throttle_cache_keys_are_plain_strings() {
        let mut history = NotificationHistory::default();
        let fp = NotificationFingerprint::from_flight(&flight(dec!(120), "Flair", "Calgary"));
        history
            .throttle_cache
            .insert(fp, Utc.with_ymd_and_hms(2025, 7, 5, 15, 0, 0).unwrap());
        let json = serde_json::to_value(&history).unwrap();
        assert!(json["throttle_cache"]["flair|calgary|120"].is_string());
    }
}
