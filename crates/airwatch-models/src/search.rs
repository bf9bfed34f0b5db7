use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A user flight search read from the request collection.
///
/// The `key` is assigned by the store and is not part of the record body.
/// Older clients wrote `from_origin` / `to_destination` / `timestamp`, which
/// are accepted as aliases.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchRequest {
    #[serde(skip)]
    pub key: String,
    #[serde(alias = "from_origin")]
    pub origin: String,
    #[serde(alias = "to_destination")]
    pub destination: String,
    #[serde(alias = "maxPrice")]
    pub max_price: Decimal,
    #[serde(default, alias = "userId")]
    pub user_id: String,
    #[serde(alias = "timestamp", with = "crate::timestamp::flexible")]
    pub created_at: DateTime<Utc>,
}

impl SearchRequest {
    /// Decode a store record under its key.
    pub fn from_record(key: &str, value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        let mut request: SearchRequest = serde_json::from_value(value.clone())?;
        request.key = key.to_string();
        Ok(request)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    #[default]
    Success,
    Failure,
}

/// Outcome of processing one `SearchRequest`, written once and never updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessedResult {
    pub original_search_id: String,
    #[serde(with = "crate::timestamp::flexible")]
    pub processed_at: DateTime<Utc>,
    #[serde(default)]
    pub status: ResultStatus,
    #[serde(default, alias = "tavily_result")]
    pub payload: serde_json::Value,
}

impl ProcessedResult {
    pub fn new(
        request: &SearchRequest,
        status: ResultStatus,
        payload: serde_json::Value,
        processed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            original_search_id: request.key.clone(),
            processed_at,
            status,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn decodes_legacy_field_names() {
        let value = serde_json::json!({
            "from_origin": "Toronto",
            "to_destination": "Ottawa",
            "max_price": 300,
            "user_id": "demo_user",
            "timestamp": "2025-07-05T15:00:00.000123"
        });
        let request = SearchRequest::from_record("-Nabc", &value).unwrap();
        assert_eq!(request.key, "-Nabc");
        assert_eq!(request.origin, "Toronto");
        assert_eq!(request.destination, "Ottawa");
        assert_eq!(request.max_price, dec!(300));
    }

    #[test]
    fn decodes_current_field_names() {
        let value = serde_json::json!({
            "origin": "Calgary",
            "destination": "Edmonton",
            "max_price": "199.99",
            "created_at": "2025-07-05T15:00:00Z"
        });
        let request = SearchRequest::from_record("k1", &value).unwrap();
        assert_eq!(request.max_price, dec!(199.99));
        assert!(request.user_id.is_empty());
    }

    #[test]
    fn missing_price_is_malformed() {
        let value = serde_json::json!({
            "origin": "Calgary",
            "destination": "Edmonton",
            "created_at": "2025-07-05T15:00:00Z"
        });
        assert!(SearchRequest::from_record("k1", &value).is_err());
    }

    #[test]
    fn key_is_not_serialized() {
        let value = serde_json::json!({
            "origin": "A",
            "destination": "B",
            "max_price": 1,
            "created_at": "2025-07-05T15:00:00Z"
        });
        let request = SearchRequest::from_record("secret-key", &value).unwrap();
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("secret-key"));
    }

    #[test]
    fn processed_result_accepts_legacy_payload() {
        let value = serde_json::json!({
            "original_search_id": "k1",
            "processed_at": "2025-07-05T15:00:00",
            "tavily_result": "Found 3 flights"
        });
        let result: ProcessedResult = serde_json::from_value(value).unwrap();
        assert_eq!(result.status, ResultStatus::Success);
        assert_eq!(result.payload, serde_json::json!("Found 3 flights"));
    }

    #[test]
    fn status_serialization() {
        assert_eq!(
            serde_json::to_string(&ResultStatus::Failure).unwrap(),
            "\"failure\""
        );
    }
}
