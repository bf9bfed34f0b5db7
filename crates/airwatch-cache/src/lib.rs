pub mod error;
pub mod manager;
pub mod source;

pub use error::CacheError;
pub use manager::{CacheStats, FlightCacheManager, RouteUpdate, MAX_REFRESH_FAILURES};
pub use source::{FileFlightSource, FlightSource};
