pub mod config;
pub mod error;
pub mod flight;
pub mod notification;
pub mod search;
pub mod timestamp;

pub use config::{AirwatchConfig, CacheConfig, ChannelKind, NotificationsConfig, StoreConfig};
pub use error::ConfigError;
pub use flight::{FlightIdentity, FlightRecord, RouteCacheEntry, RouteDataFile, RouteKey, RouteSnapshot};
pub use notification::{NotificationFingerprint, NotificationHistory, NotificationRecord};
pub use search::{ProcessedResult, ResultStatus, SearchRequest};
