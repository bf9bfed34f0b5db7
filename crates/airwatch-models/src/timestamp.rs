//! Lenient timestamp decoding for records written by other tools.
//!
//! Records in the store and in route data files carry timestamps in several
//! shapes: RFC 3339 strings, naive ISO-8601 strings without an offset, and
//! epoch milliseconds (server-side timestamps). Naive values are taken as UTC.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serializer};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a timestamp string. Returns `None` if no known format matches.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Text(String),
    Millis(i64),
}

/// `#[serde(with = "airwatch_models::timestamp::flexible")]`
pub mod flexible {
    use super::*;

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        match RawTimestamp::deserialize(deserializer)? {
            RawTimestamp::Text(raw) => parse_timestamp(&raw)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}"))),
            RawTimestamp::Millis(ms) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {ms}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use serde::Serialize;

    #[derive(Debug, Serialize, Deserialize)]
    struct Stamped {
        #[serde(with = "flexible")]
        at: DateTime<Utc>,
    }

    #[test]
    fn parses_rfc3339_with_offset() {
        let ts = parse_timestamp("2025-07-05T15:00:00-04:00").unwrap();
        assert_eq!(ts.hour(), 19);
    }

    #[test]
    fn parses_naive_iso_as_utc() {
        let ts = parse_timestamp("2025-07-05T15:00:00.123456").unwrap();
        assert_eq!(ts.hour(), 15);
        assert!(parse_timestamp("2025-07-05 15:00:00").is_some());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_none());
        assert!(serde_json::from_str::<Stamped>(r#"{"at": "soon"}"#).is_err());
    }

    #[test]
    fn accepts_epoch_millis() {
        let parsed: Stamped = serde_json::from_str(r#"{"at": 1751727600000}"#).unwrap();
        assert_eq!(parsed.at.timestamp(), 1_751_727_600);
    }
}
