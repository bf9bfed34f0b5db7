use std::sync::Arc;

use airwatch_cache::FlightCacheManager;
use airwatch_models::{FlightRecord, ResultStatus, SearchRequest};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ProcessError;

/// What processing a request produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingOutcome {
    pub status: ResultStatus,
    pub payload: Value,
    /// Flights that feed the alert path.
    pub flights: Vec<FlightRecord>,
}

/// Turns one search request into a result payload.
#[async_trait]
pub trait SearchProcessor: Send + Sync {
    fn name(&self) -> &str;

    async fn process(&self, request: &SearchRequest) -> Result<ProcessingOutcome, ProcessError>;
}

/// Answers searches from the flight data cache.
pub struct CacheBackedProcessor {
    cache: Arc<FlightCacheManager>,
}

impl CacheBackedProcessor {
    pub fn new(cache: Arc<FlightCacheManager>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl SearchProcessor for CacheBackedProcessor {
    fn name(&self) -> &str {
        "cache"
    }

    async fn process(&self, request: &SearchRequest) -> Result<ProcessingOutcome, ProcessError> {
        let flights = self.cache.load(&request.origin, &request.destination).await?;
        let found = flights.len();

        let mut matching: Vec<FlightRecord> = flights
            .into_iter()
            .filter(|f| f.price <= request.max_price)
            .collect();
        matching.sort_by(|a, b| a.price.cmp(&b.price));

        debug!(
            key = %request.key,
            origin = %request.origin,
            destination = %request.destination,
            found,
            matching = matching.len(),
            "Processed search from cache"
        );

        let payload = json!({
            "route": format!("{} to {}", request.origin.trim(), request.destination.trim()),
            "max_price": request.max_price,
            "flights_found": found,
            "matching": matching,
            "cheapest": matching.first(),
        });

        Ok(ProcessingOutcome {
            status: ResultStatus::Success,
            payload,
            flights: matching,
        })
    }
}
