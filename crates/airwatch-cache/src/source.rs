use std::path::{Path, PathBuf};

use airwatch_models::flight::{FlightRecord, RouteDataFile, RouteKey, RouteSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::CacheError;

/// Where the cache gets fresh flights from. Mockable for testing.
#[async_trait]
pub trait FlightSource: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch the current flights for a route.
    async fn fetch(&self, route: &RouteKey) -> Result<Vec<FlightRecord>, CacheError>;
}

/// Reads per-route data files (`flight_prices_{origin}_{destination}.json`).
///
/// The search provider appends a snapshot to the route file after every
/// search; the last snapshot is the current one.
pub struct FileFlightSource {
    data_dir: PathBuf,
}

impl FileFlightSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn route_path(&self, route: &RouteKey) -> PathBuf {
        self.data_dir.join(route.file_name())
    }

    /// Append a snapshot to the route file, creating it if needed.
    /// The file is replaced through a temporary sibling so readers never see a partial write.
    pub async fn append_snapshot(
        &self,
        route: &RouteKey,
        flights: Vec<FlightRecord>,
        searched_at: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        let path = self.route_path(route);

        let mut document = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str::<RouteDataFile>(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RouteDataFile {
                route: route.to_string(),
                searches: Vec::new(),
            },
            Err(e) => return Err(e.into()),
        };

        document.searches.push(RouteSnapshot {
            search_timestamp: searched_at,
            total_flights_found: flights.len(),
            flights,
        });

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&document)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl FlightSource for FileFlightSource {
    fn name(&self) -> &str {
        "route_files"
    }

    async fn fetch(&self, route: &RouteKey) -> Result<Vec<FlightRecord>, CacheError> {
        let path = self.route_path(route);
        debug!(route = %route, path = %path.display(), "Reading route file");
        let raw = tokio::fs::read_to_string(&path).await?;
        parse_current_snapshot(&raw, route)
    }
}

/// Decode the last snapshot of a route file.
///
/// Individual flights that fail to decode, or carry a negative price, are
/// skipped so one bad entry does not hide the rest of the snapshot.
pub fn parse_current_snapshot(raw: &str, route: &RouteKey) -> Result<Vec<FlightRecord>, CacheError> {
    let document: serde_json::Value = serde_json::from_str(raw)?;
    let searches = document
        .get("searches")
        .and_then(|s| s.as_array())
        .ok_or_else(|| CacheError::Malformed(format!("{route}: missing `searches` array")))?;

    let Some(current) = searches.last() else {
        return Ok(Vec::new());
    };

    let flights = current
        .get("flights")
        .and_then(|f| f.as_array())
        .ok_or_else(|| CacheError::Malformed(format!("{route}: snapshot has no `flights` array")))?;

    let mut records = Vec::with_capacity(flights.len());
    for (index, value) in flights.iter().enumerate() {
        match serde_json::from_value::<FlightRecord>(value.clone()) {
            Ok(record) if record.price.is_sign_negative() => {
                warn!(route = %route, index, price = %record.price, "Skipping flight with negative price");
            }
            Ok(mut record) => {
                if record.origin.is_empty() {
                    record.origin = route.origin.clone();
                }
                if record.destination.is_empty() {
                    record.destination = route.destination.clone();
                }
                records.push(record);
            }
            Err(e) => {
                warn!(route = %route, index, error = %e, "Skipping malformed flight");
            }
        }
    }
    Ok(records)
}
