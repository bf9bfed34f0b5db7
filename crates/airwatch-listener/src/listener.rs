use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use airwatch_models::{FlightRecord, ProcessedResult, SearchRequest};
use airwatch_notify::ThrottleManager;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ListenerError, ProcessError};
use crate::processor::{ProcessingOutcome, SearchProcessor};
use crate::store::RecordStore;

const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListenerState {
    #[default]
    Idle,
    Running,
    Stopped,
}

/// Point-in-time view of a listener.
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct ListenerStatus {
    pub state: ListenerState,
    pub records_processed: u64,
    pub alerts_dispatched: u64,
    pub last_poll: Option<DateTime<Utc>>,
    /// Most recent error of any kind. Not cleared by later successes.
    pub last_error: Option<String>,
    /// Keys whose latest processing attempt failed, with the error.
    pub failures: BTreeMap<String, String>,
}

/// Where processed flights are sent for alerting.
#[derive(Clone)]
pub struct AlertPolicy {
    pub throttle: Arc<ThrottleManager>,
    pub threshold: Decimal,
}

struct RunHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Polls a request collection, hands each new request to a processor exactly
/// once and writes the result back.
///
/// Handled keys are rebuilt from the result collection on every `start`, so a
/// restart never reprocesses a request that already has a result.
pub struct PollingListener {
    store: Arc<dyn RecordStore>,
    requests_path: String,
    results_path: String,
    alerts: Option<AlertPolicy>,
    process_timeout: Duration,
    status: Arc<Mutex<ListenerStatus>>,
    run: tokio::sync::Mutex<Option<RunHandle>>,
}

impl PollingListener {
    pub fn new(store: Arc<dyn RecordStore>, requests_path: &str, results_path: &str) -> Self {
        Self {
            store,
            requests_path: requests_path.to_string(),
            results_path: results_path.to_string(),
            alerts: None,
            process_timeout: DEFAULT_PROCESS_TIMEOUT,
            status: Arc::new(Mutex::new(ListenerStatus::default())),
            run: tokio::sync::Mutex::new(None),
        }
    }

    pub fn with_alerts(mut self, policy: AlertPolicy) -> Self {
        self.alerts = Some(policy);
        self
    }

    pub fn with_process_timeout(mut self, timeout: Duration) -> Self {
        self.process_timeout = timeout;
        self
    }

    /// Begin polling. Fails with `AlreadyRunning` if a loop is active, or with
    /// the store error if the handled keys cannot be loaded.
    pub async fn start(
        &self,
        processor: Arc<dyn SearchProcessor>,
        poll_interval: Duration,
    ) -> Result<(), ListenerError> {
        let mut run = self.run.lock().await;
        if run.is_some() {
            return Err(ListenerError::AlreadyRunning);
        }

        let processed = self.load_processed_keys().await?;
        info!(
            requests = %self.requests_path,
            results = %self.results_path,
            processor = processor.name(),
            already_processed = processed.len(),
            poll_interval_secs = poll_interval.as_secs(),
            "Starting listener"
        );

        *self.lock_status() = ListenerStatus {
            state: ListenerState::Running,
            ..ListenerStatus::default()
        };

        let cancel = CancellationToken::new();
        let worker = PollWorker {
            store: self.store.clone(),
            requests_path: self.requests_path.clone(),
            results_path: self.results_path.clone(),
            alerts: self.alerts.clone(),
            process_timeout: self.process_timeout,
            status: self.status.clone(),
            processor,
            processed,
            reported_malformed: HashSet::new(),
        };
        let task = tokio::spawn(worker.run(poll_interval, cancel.clone()));
        *run = Some(RunHandle { cancel, task });
        Ok(())
    }

    /// Signal the loop and wait for it to exit. No-op unless running.
    pub async fn stop(&self) {
        let Some(handle) = self.run.lock().await.take() else {
            return;
        };
        handle.cancel.cancel();
        if let Err(e) = handle.task.await {
            error!(error = %e, "Listener task panicked");
        }
        self.lock_status().state = ListenerState::Stopped;
        info!(requests = %self.requests_path, "Listener stopped");
    }

    pub fn status(&self) -> ListenerStatus {
        self.lock_status().clone()
    }

    fn lock_status(&self) -> std::sync::MutexGuard<'_, ListenerStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn load_processed_keys(&self) -> Result<HashSet<String>, ListenerError> {
        let results = self.store.list(&self.results_path).await?;
        Ok(results
            .into_iter()
            .map(|(key, value)| match value.get("original_search_id").and_then(Value::as_str) {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => key,
            })
            .collect())
    }
}

/// State owned by the polling task. It is the only writer of `processed`.
struct PollWorker {
    store: Arc<dyn RecordStore>,
    requests_path: String,
    results_path: String,
    alerts: Option<AlertPolicy>,
    process_timeout: Duration,
    status: Arc<Mutex<ListenerStatus>>,
    processor: Arc<dyn SearchProcessor>,
    processed: HashSet<String>,
    reported_malformed: HashSet<String>,
}

impl PollWorker {
    async fn run(mut self, poll_interval: Duration, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.poll_once().await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
        debug!(requests = %self.requests_path, "Poll loop exited");
    }

    async fn poll_once(&mut self) {
        let records = match self.store.list(&self.requests_path).await {
            Ok(records) => records,
            Err(e) => {
                warn!(path = %self.requests_path, error = %e, "Failed to list requests");
                self.update_status(|s| {
                    s.last_error = Some(e.to_string());
                    s.last_poll = Some(Utc::now());
                });
                return;
            }
        };

        let mut pending: Vec<SearchRequest> = Vec::new();
        for (key, value) in records {
            if self.processed.contains(&key) {
                continue;
            }
            match SearchRequest::from_record(&key, &value) {
                Ok(request) => pending.push(request),
                Err(e) => {
                    if self.reported_malformed.insert(key.clone()) {
                        warn!(key = %key, error = %e, "Skipping malformed request");
                    }
                }
            }
        }
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)));

        if !pending.is_empty() {
            debug!(count = pending.len(), "New requests found");
        }

        for request in pending {
            self.handle(request).await;
        }

        self.update_status(|s| s.last_poll = Some(Utc::now()));
    }

    async fn handle(&mut self, request: SearchRequest) {
        let outcome = match self.process(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(key = %request.key, error = %e, "Processing failed, will retry");
                self.record_failure(&request.key, e.to_string());
                return;
            }
        };

        let result = ProcessedResult::new(&request, outcome.status, outcome.payload, Utc::now());
        let written = match serde_json::to_value(&result) {
            Ok(value) => self
                .store
                .write(&self.results_path, &request.key, &value)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = written {
            warn!(key = %request.key, error = %e, "Failed to write result, will retry");
            self.record_failure(&request.key, e);
            return;
        }

        self.processed.insert(request.key.clone());
        info!(
            key = %request.key,
            origin = %request.origin,
            destination = %request.destination,
            flights = outcome.flights.len(),
            "Processed request"
        );
        self.update_status(|s| {
            s.records_processed += 1;
            s.failures.remove(&request.key);
        });

        let dispatched = self.raise_alerts(&outcome.flights).await;
        if dispatched > 0 {
            self.update_status(|s| s.alerts_dispatched += dispatched);
        }
    }

    async fn process(&self, request: &SearchRequest) -> Result<ProcessingOutcome, ProcessError> {
        match tokio::time::timeout(self.process_timeout, self.processor.process(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProcessError::Timeout(self.process_timeout.as_secs())),
        }
    }

    async fn raise_alerts(&self, flights: &[FlightRecord]) -> u64 {
        let Some(policy) = &self.alerts else {
            return 0;
        };
        let mut dispatched = 0;
        for flight in flights {
            if policy.throttle.evaluate(flight, policy.threshold).await {
                dispatched += 1;
            }
        }
        dispatched
    }

    fn record_failure(&self, key: &str, error: String) {
        self.update_status(|s| {
            s.failures.insert(key.to_string(), error.clone());
            s.last_error = Some(error);
        });
    }

    fn update_status(&self, f: impl FnOnce(&mut ListenerStatus)) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut status);
    }
}
