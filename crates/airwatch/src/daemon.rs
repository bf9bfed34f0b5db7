use std::sync::Arc;

use airwatch_cache::{FlightCacheManager, RouteUpdate};
use airwatch_listener::{CacheBackedProcessor, PollingListener, SearchProcessor};
use airwatch_models::AirwatchConfig;
use airwatch_notify::{ThrottleManager, ThrottlePolicy};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::DaemonError;

const UPDATE_BUFFER: usize = 64;

/// The watcher daemon. Runs the request listener, the route monitor and the
/// alert consumer until cancelled.
pub struct Daemon {
    config: AirwatchConfig,
    listener: Arc<PollingListener>,
    cache: Arc<FlightCacheManager>,
    throttle: Arc<ThrottleManager>,
    cancel: CancellationToken,
}

impl Daemon {
    pub fn new(
        config: AirwatchConfig,
        listener: PollingListener,
        cache: Arc<FlightCacheManager>,
        throttle: Arc<ThrottleManager>,
    ) -> Self {
        Self {
            config,
            listener: Arc::new(listener),
            cache,
            throttle,
            cancel: CancellationToken::new(),
        }
    }

    /// Wire every component from configuration.
    pub async fn from_config(config: AirwatchConfig) -> Self {
        let cache = crate::build_cache(&config);
        let throttle = crate::build_throttle(
            &config,
            ThrottlePolicy::from_cooldown(config.throttle_cooldown()),
        )
        .await;
        let listener = crate::build_listener(&config, crate::build_store(&config), throttle.clone());
        Self::new(config, listener, cache, throttle)
    }

    /// Returns a CancellationToken that can be used to trigger shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn listener(&self) -> &PollingListener {
        &self.listener
    }

    pub fn cache(&self) -> &FlightCacheManager {
        &self.cache
    }

    /// Run until cancelled. Fails only if the listener cannot start.
    pub async fn run(&self) -> Result<(), DaemonError> {
        info!(
            threshold = %self.config.threshold,
            channels = ?self.throttle.channel_names(),
            routes = self.cache.tracked_routes().len(),
            "Airwatch daemon starting"
        );

        let processor: Arc<dyn SearchProcessor> = Arc::new(CacheBackedProcessor::new(self.cache.clone()));
        self.listener
            .start(processor, self.config.poll_interval())
            .await?;

        let mut join_set = tokio::task::JoinSet::new();
        let (tx, rx) = mpsc::channel(UPDATE_BUFFER);

        // Task 1: route monitor
        {
            let cache = self.cache.clone();
            let interval = self.config.check_interval();
            let cancel = self.cancel.clone();
            join_set.spawn(async move {
                cache.monitor(interval, tx, cancel).await;
            });
        }

        // Task 2: alerts for changed routes
        {
            let throttle = self.throttle.clone();
            let threshold = self.config.threshold;
            let cancel = self.cancel.clone();
            join_set.spawn(async move {
                consume_updates(rx, throttle, threshold, cancel).await;
            });
        }

        // Task 3: listener shutdown
        {
            let listener = self.listener.clone();
            let cancel = self.cancel.clone();
            join_set.spawn(async move {
                cancel.cancelled().await;
                listener.stop().await;
            });
        }

        info!("All daemon tasks started");

        while let Some(joined) = join_set.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Daemon task panicked");
            }
        }

        let stats = self.cache.stats();
        info!(
            routes = stats.total_routes,
            flights = stats.total_flights,
            cache_hits = stats.cache_hits,
            "Airwatch daemon stopped"
        );
        Ok(())
    }
}

/// Evaluate every flight of each route update against the threshold.
/// Returns the number of alerts dispatched once the channel closes or
/// `cancel` fires.
pub async fn consume_updates(
    mut updates: mpsc::Receiver<RouteUpdate>,
    throttle: Arc<ThrottleManager>,
    threshold: Decimal,
    cancel: CancellationToken,
) -> u64 {
    let mut dispatched = 0;
    loop {
        let update = tokio::select! {
            _ = cancel.cancelled() => break,
            update = updates.recv() => match update {
                Some(update) => update,
                None => break,
            },
        };

        let mut sent = 0;
        for flight in &update.flights {
            if throttle.evaluate(flight, threshold).await {
                sent += 1;
            }
        }
        debug!(route = %update.route, flights = update.flights.len(), alerts = sent, "Route update evaluated");
        dispatched += sent;
    }
    info!(dispatched, "Alert consumer shutting down");
    dispatched
}
