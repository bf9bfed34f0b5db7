use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single fare observation for a route.
///
/// Wire names follow the route data files (`airline`, `timestamp`, `source`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlightRecord {
    pub price: Decimal,
    #[serde(rename = "airline", alias = "carrier")]
    pub carrier: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub departure: String,
    #[serde(
        rename = "timestamp",
        alias = "fetched_at",
        with = "crate::timestamp::flexible"
    )]
    pub fetched_at: DateTime<Utc>,
    #[serde(default, rename = "source", alias = "provenance")]
    pub source: String,
}

/// Fields that decide whether two observations describe the same fare.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlightIdentity {
    pub price: Decimal,
    pub carrier: String,
    pub destination: String,
}

impl FlightRecord {
    pub fn identity(&self) -> FlightIdentity {
        FlightIdentity {
            price: self.price.normalize(),
            carrier: self.carrier.clone(),
            destination: self.destination.clone(),
        }
    }
}

/// Cache and data-file key: an (origin, destination) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteKey {
    pub origin: String,
    pub destination: String,
}

impl RouteKey {
    pub fn new(origin: impl AsRef<str>, destination: impl AsRef<str>) -> Self {
        Self {
            origin: origin.as_ref().trim().to_string(),
            destination: destination.as_ref().trim().to_string(),
        }
    }

    /// File name of the per-route data document, e.g. `flight_prices_Toronto_Ottawa.json`.
    /// Path separators are replaced so a route can never escape the data directory.
    pub fn file_name(&self) -> String {
        let clean = |s: &str| s.replace(['/', '\\'], "_");
        format!(
            "flight_prices_{}_{}.json",
            clean(&self.origin),
            clean(&self.destination)
        )
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.origin, self.destination)
    }
}

/// Cached flights for one route. Replaced whole on refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteCacheEntry {
    pub route: RouteKey,
    pub flights: Vec<FlightRecord>,
    pub last_refresh: DateTime<Utc>,
}

impl RouteCacheEntry {
    pub fn new(route: RouteKey, flights: Vec<FlightRecord>, last_refresh: DateTime<Utc>) -> Self {
        Self {
            route,
            flights,
            last_refresh,
        }
    }

    /// An entry is fresh while `now - last_refresh < refresh_interval`.
    pub fn is_fresh(&self, now: DateTime<Utc>, refresh_interval: Duration) -> bool {
        now.signed_duration_since(self.last_refresh) < refresh_interval
    }
}

/// One search snapshot inside a route data file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteSnapshot {
    #[serde(with = "crate::timestamp::flexible")]
    pub search_timestamp: DateTime<Utc>,
    pub flights: Vec<FlightRecord>,
    #[serde(default)]
    pub total_flights_found: usize,
}

/// Per-route data document: snapshots in append order, the last one is current.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RouteDataFile {
    #[serde(default)]
    pub route: String,
    #[serde(default)]
    pub searches: Vec<RouteSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn flight(price: Decimal, carrier: &str) -> FlightRecord {
        FlightRecord {
            price,
            carrier: carrier.to_string(),
            origin: "Toronto".to_string(),
            destination: "Ottawa".to_string(),
            departure: "08:00".to_string(),
            fetched_at: Utc.with_ymd_and_hms(2025, 7, 5, 15, 0, 0).unwrap(),
            source: "test".to_string(),
        }
    }

    #[test]
    fn decodes_data_file_flight() {
        let json = r#"{
            "price": 150.0,
            "airline": "Porter Airlines",
            "departure": "Various Times",
            "destination": "Toronto to Ottawa",
            "timestamp": "2025-07-05T15:00:00",
            "source": "Tavily Search"
        }"#;
        let record: FlightRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.price, dec!(150));
        assert_eq!(record.carrier, "Porter Airlines");
        assert!(record.origin.is_empty());
    }

    #[test]
    fn identity_ignores_trailing_zeros_and_provenance() {
        let a = flight(dec!(150.00), "WestJet");
        let mut b = flight(dec!(150), "WestJet");
        b.source = "other".to_string();
        b.departure = "20:00".to_string();
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), flight(dec!(151), "WestJet").identity());
    }

    #[test]
    fn route_file_name() {
        let route = RouteKey::new(" Toronto ", "Ottawa");
        assert_eq!(route.file_name(), "flight_prices_Toronto_Ottawa.json");
        assert_eq!(route.to_string(), "Toronto to Ottawa");
        assert_eq!(
            RouteKey::new("../etc", "x").file_name(),
            "flight_prices_.._etc_x.json"
        );
    }

    #[test]
    fn freshness_boundary() {
        let t0 = Utc.with_ymd_and_hms(2025, 7, 5, 15, 0, 0).unwrap();
        let entry = RouteCacheEntry::new(RouteKey::new("A", "B"), vec![], t0);
        let interval = Duration::seconds(300);
        assert!(entry.is_fresh(t0 + Duration::seconds(299), interval));
        assert!(!entry.is_fresh(t0 + Duration::seconds(300), interval));
    }
}
