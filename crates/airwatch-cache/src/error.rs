use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed route data: {0}")]
    Malformed(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Fetch timed out after {0} seconds")]
    Timeout(u64),

    #[error("No flight data available for {route}: {reason}")]
    DataUnavailable { route: String, reason: String },
}
