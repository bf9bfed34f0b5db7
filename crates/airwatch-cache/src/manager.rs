use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use airwatch_models::flight::{FlightIdentity, FlightRecord, RouteCacheEntry, RouteKey};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::source::FlightSource;

/// Consecutive failed monitor refreshes after which an auto-tracked route is dropped.
pub const MAX_REFRESH_FAILURES: u32 = 3;

/// Emitted by the monitor when a route's flights changed between ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteUpdate {
    pub route: RouteKey,
    pub flights: Vec<FlightRecord>,
    pub refreshed_at: DateTime<Utc>,
}

/// Snapshot of cache contents and usage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CacheStats {
    pub total_routes: usize,
    pub total_flights: usize,
    /// Reads answered from a fresh entry without fetching.
    pub cache_hits: u64,
    pub last_refresh_times: BTreeMap<RouteKey, DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Tracking {
    /// Registered through `track`; never dropped by the monitor.
    pinned: bool,
    failures: u32,
}

/// Route-keyed flight cache with bounded staleness.
///
/// Entries live in an unbounded moka cache as `Arc<RouteCacheEntry>` and are
/// only ever replaced whole, so a concurrent reader sees either the old or the
/// new sequence. Freshness is decided here rather than by moka's TTL: a stale
/// entry must survive so it can be served when a refresh fails.
///
/// Refreshes of one route are serialized: concurrent readers of a stale route
/// wait for a single fetch and then share its result.
pub struct FlightCacheManager {
    source: Arc<dyn FlightSource>,
    entries: Cache<RouteKey, Arc<RouteCacheEntry>>,
    tracked: RwLock<BTreeMap<RouteKey, Tracking>>,
    refresh_locks: Mutex<HashMap<RouteKey, Arc<tokio::sync::Mutex<()>>>>,
    hits: AtomicU64,
    refresh_interval: chrono::Duration,
    fetch_timeout: Duration,
}

impl FlightCacheManager {
    pub fn new(source: Arc<dyn FlightSource>, refresh_interval: Duration, fetch_timeout: Duration) -> Self {
        Self {
            source,
            entries: Cache::builder().build(),
            tracked: RwLock::new(BTreeMap::new()),
            refresh_locks: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            refresh_interval: chrono::Duration::from_std(refresh_interval)
                .unwrap_or_else(|_| chrono::Duration::days(36_500)),
            fetch_timeout,
        }
    }

    /// Register a route for monitoring without fetching it. Tracked this way,
    /// the route stays monitored even while its data is unavailable.
    pub fn track(&self, route: RouteKey) {
        self.tracked
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(route)
            .or_default()
            .pinned = true;
    }

    pub fn tracked_routes(&self) -> Vec<RouteKey> {
        self.tracked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Flights for a route, fetching only when the cached entry is stale or missing.
    pub async fn load(&self, origin: &str, destination: &str) -> Result<Vec<FlightRecord>, CacheError> {
        self.load_at(&RouteKey::new(origin, destination), Utc::now())
            .await
    }

    /// A route is monitored from its first successful fetch on.
    pub async fn load_at(
        &self,
        route: &RouteKey,
        now: DateTime<Utc>,
    ) -> Result<Vec<FlightRecord>, CacheError> {
        if let Some(flights) = self.fresh_flights(route, now).await {
            return Ok(flights);
        }

        let lock = self.refresh_lock(route);
        let result = {
            let _guard = lock.lock().await;
            self.refresh_or_serve_stale(route, now).await
        };
        self.release_refresh_lock(route, &lock);
        result
    }

    /// Latest flights across every cached route. Never fetches.
    pub fn get_all(&self) -> Vec<FlightRecord> {
        let mut entries: Vec<Arc<RouteCacheEntry>> =
            self.entries.iter().map(|(_, entry)| entry).collect();
        entries.sort_by(|a, b| a.route.cmp(&b.route));
        entries
            .iter()
            .flat_map(|entry| entry.flights.iter().cloned())
            .collect()
    }

    pub async fn entry(&self, route: &RouteKey) -> Option<Arc<RouteCacheEntry>> {
        self.entries.get(route).await
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            cache_hits: self.hits.load(Ordering::Relaxed),
            ..CacheStats::default()
        };
        for (_, entry) in self.entries.iter() {
            stats.total_routes += 1;
            stats.total_flights += entry.flights.len();
            stats
                .last_refresh_times
                .insert(entry.route.clone(), entry.last_refresh);
        }
        stats
    }

    /// Force-refresh every tracked route and report the ones whose flights changed.
    ///
    /// A route changed when the new sequence holds a flight whose identity
    /// (price, carrier, destination) was not in the previous sequence. A failed
    /// refresh leaves the previous entry in place. An auto-tracked route that
    /// fails `MAX_REFRESH_FAILURES` times in a row stops being monitored.
    pub async fn check_routes(&self, now: DateTime<Utc>) -> Vec<RouteUpdate> {
        let mut updates = Vec::new();

        for route in self.tracked_routes() {
            let lock = self.refresh_lock(&route);
            let update = {
                let _guard = lock.lock().await;
                self.check_route(&route, now).await
            };
            self.release_refresh_lock(&route, &lock);
            updates.extend(update);
        }

        updates
    }

    async fn check_route(&self, route: &RouteKey, now: DateTime<Utc>) -> Option<RouteUpdate> {
        let previous = self.entries.get(route).await;
        let flights = match self.fetch(route).await {
            Ok(flights) => flights,
            Err(e) => {
                warn!(route = %route, error = %e, "Monitor refresh failed");
                self.record_refresh_failure(route);
                return None;
            }
        };

        let known: HashSet<FlightIdentity> = previous
            .as_ref()
            .map(|entry| entry.flights.iter().map(FlightRecord::identity).collect())
            .unwrap_or_default();
        let changed = flights.iter().any(|f| !known.contains(&f.identity()));

        self.replace(route, flights.clone(), now).await;
        self.record_refresh_success(route);

        if !changed {
            return None;
        }
        debug!(route = %route, count = flights.len(), "Route flights changed");
        Some(RouteUpdate {
            route: route.clone(),
            flights,
            refreshed_at: now,
        })
    }

    /// Run the change-detection feed until cancelled or until the receiver is dropped.
    ///
    /// Cancellation is observed between ticks only; a tick that has started
    /// finishes its fetches and cache writes.
    pub async fn monitor(
        &self,
        interval: Duration,
        updates: mpsc::Sender<RouteUpdate>,
        cancel: CancellationToken,
    ) {
        info!(interval_secs = interval.as_secs(), "Flight monitor starting");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            for update in self.check_routes(Utc::now()).await {
                if updates.send(update).await.is_err() {
                    info!("Route update receiver closed, flight monitor stopping");
                    return;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Flight monitor shutting down");
    }

    async fn fresh_flights(&self, route: &RouteKey, now: DateTime<Utc>) -> Option<Vec<FlightRecord>> {
        let entry = self.entries.get(route).await?;
        if !entry.is_fresh(now, self.refresh_interval) {
            return None;
        }
        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!(route = %route, "Cache hit");
        Some(entry.flights.clone())
    }

    /// Called with the route's refresh lock held. Another caller may have
    /// refreshed the route while this one waited, so freshness is checked again.
    async fn refresh_or_serve_stale(
        &self,
        route: &RouteKey,
        now: DateTime<Utc>,
    ) -> Result<Vec<FlightRecord>, CacheError> {
        if let Some(flights) = self.fresh_flights(route, now).await {
            return Ok(flights);
        }

        let cached = self.entries.get(route).await;
        match self.fetch(route).await {
            Ok(flights) => {
                self.replace(route, flights.clone(), now).await;
                self.record_refresh_success(route);
                Ok(flights)
            }
            Err(e) => match cached {
                Some(stale) => {
                    warn!(
                        route = %route,
                        error = %e,
                        last_refresh = %stale.last_refresh,
                        "Refresh failed, serving stale flights"
                    );
                    Ok(stale.flights.clone())
                }
                None => Err(CacheError::DataUnavailable {
                    route: route.to_string(),
                    reason: e.to_string(),
                }),
            },
        }
    }

    fn record_refresh_success(&self, route: &RouteKey) {
        self.tracked
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(route.clone())
            .or_default()
            .failures = 0;
    }

    fn record_refresh_failure(&self, route: &RouteKey) {
        let mut tracked = self.tracked.write().unwrap_or_else(PoisonError::into_inner);
        let Some(tracking) = tracked.get_mut(route) else {
            return;
        };
        tracking.failures += 1;
        if !tracking.pinned && tracking.failures >= MAX_REFRESH_FAILURES {
            tracked.remove(route);
            warn!(
                route = %route,
                failures = MAX_REFRESH_FAILURES,
                "Route keeps failing, no longer monitored"
            );
        }
    }

    fn refresh_lock(&self, route: &RouteKey) -> Arc<tokio::sync::Mutex<()>> {
        self.refresh_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(route.clone())
            .or_default()
            .clone()
    }

    /// Drop the route's lock once no other caller holds or waits on it.
    fn release_refresh_lock(&self, route: &RouteKey, lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.refresh_locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one held by the caller.
        if Arc::strong_count(lock) == 2 {
            locks.remove(route);
        }
    }

    async fn fetch(&self, route: &RouteKey) -> Result<Vec<FlightRecord>, CacheError> {
        tokio::time::timeout(self.fetch_timeout, self.source.fetch(route))
            .await
            .map_err(|_| CacheError::Timeout(self.fetch_timeout.as_secs()))?
    }

    async fn replace(&self, route: &RouteKey, flights: Vec<FlightRecord>, now: DateTime<Utc>) {
        let entry = RouteCacheEntry::new(route.clone(), flights, now);
        self.entries.insert(route.clone(), Arc::new(entry)).await;
    }
}
