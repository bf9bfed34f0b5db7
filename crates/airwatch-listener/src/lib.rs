pub mod error;
pub mod listener;
pub mod memory;
pub mod processor;
pub mod store;

pub mod test_support;

pub use error::{ListenerError, ProcessError, StoreError};
pub use listener::{AlertPolicy, ListenerState, ListenerStatus, PollingListener};
pub use memory::InMemoryRecordStore;
pub use processor::{CacheBackedProcessor, ProcessingOutcome, SearchProcessor};
pub use store::{HttpRecordStore, RecordStore};
