use thiserror::Error;

/// Record store failures. All of them are transient: the next poll retries.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Store returned HTTP {status} for {path}")]
    Status { status: u16, path: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unexpected store response for {path}: {detail}")]
    Unexpected { path: String, detail: String },
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Processing failed: {0}")]
    Failed(String),

    #[error("Processing timed out after {0} seconds")]
    Timeout(u64),

    #[error("Cache error: {0}")]
    Cache(#[from] airwatch_cache::CacheError),
}

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Listener is already running")]
    AlreadyRunning,

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),
}
