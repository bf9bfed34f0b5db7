use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::store::RecordStore;

/// Process-local record store for tests and offline runs.
///
/// Reads and writes can be switched to fail, standing in for an unreachable
/// remote store.
#[derive(Default)]
pub struct InMemoryRecordStore {
    collections: Mutex<BTreeMap<String, BTreeMap<String, Value>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, key: &str, value: Value) {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(path.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    pub fn get(&self, path: &str, key: &str) -> Option<Value> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .and_then(|c| c.get(key).cloned())
    }

    pub fn len(&self, path: &str) -> usize {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, path: &str) -> bool {
        self.len(path) == 0
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn list(&self, path: &str) -> Result<Vec<(String, Value)>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Status {
                status: 503,
                path: path.to_string(),
            });
        }
        Ok(self
            .collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .map(|c| c.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn write(&self, path: &str, key: &str, value: &Value) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Status {
                status: 503,
                path: format!("{path}/{key}"),
            });
        }
        self.insert(path, key, value.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
