//! Scriptable collaborators for listener tests.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use airwatch_models::{FlightRecord, ResultStatus, SearchRequest};
use async_trait::async_trait;
use serde_json::json;

use crate::error::ProcessError;
use crate::processor::{ProcessingOutcome, SearchProcessor};

/// Processor that records every call and returns a fixed set of flights.
#[derive(Default)]
pub struct RecordingProcessor {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    flights: Vec<FlightRecord>,
    delay: Option<Duration>,
}

impl RecordingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flights(mut self, flights: Vec<FlightRecord>) -> Self {
        self.flights = flights;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make requests with this key fail until `clear_failures`.
    pub fn fail_key(&self, key: &str) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Request keys in the order they were processed.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SearchProcessor for RecordingProcessor {
    fn name(&self) -> &str {
        "recording"
    }

    async fn process(&self, request: &SearchRequest) -> Result<ProcessingOutcome, ProcessError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.key.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&request.key);
        if failing {
            return Err(ProcessError::Failed(format!("scripted failure for {}", request.key)));
        }

        Ok(ProcessingOutcome {
            status: ResultStatus::Success,
            payload: json!({ "origin": request.origin, "destination": request.destination }),
            flights: self.flights.clone(),
        })
    }
}
