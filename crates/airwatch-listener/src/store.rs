use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::StoreError;

/// Remote JSON document collection holding requests and results.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Every record under `path`, as `(key, record)` pairs.
    async fn list(&self, path: &str) -> Result<Vec<(String, Value)>, StoreError>;

    /// Create or replace the record at `path/key`.
    async fn write(&self, path: &str, key: &str, value: &Value) -> Result<(), StoreError>;
}

/// REST client for a Firebase-style realtime database.
///
/// Collections are read with `GET {base}/{path}.json` and records written with
/// `PUT {base}/{path}/{key}.json`. Every request carries `timeout`.
pub struct HttpRecordStore {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
    timeout: Duration,
}

impl HttpRecordStore {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: None,
            timeout,
        }
    }

    pub fn with_auth_token(mut self, token: Option<String>) -> Self {
        self.auth_token = token.filter(|t| !t.is_empty());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path.trim_matches('/'))
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.timeout(self.timeout);
        match &self.auth_token {
            Some(token) => builder.query(&[("auth", token)]),
            None => builder,
        }
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn list(&self, path: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let url = self.url(path);
        debug!(path, "Listing records");

        let response = self.request(self.client.get(&url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }

        let body: Value = response.json().await?;
        collection_entries(path, body)
    }

    async fn write(&self, path: &str, key: &str, value: &Value) -> Result<(), StoreError> {
        let record_path = format!("{}/{}", path.trim_matches('/'), key);
        let url = self.url(&record_path);
        debug!(path = %record_path, "Writing record");

        let response = self.request(self.client.put(&url)).json(value).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                path: record_path,
            });
        }
        Ok(())
    }
}

/// Flatten a collection body into `(key, record)` pairs.
///
/// An empty collection comes back as `null`. Collections whose keys are all
/// small integers may come back as an array with `null` holes.
pub fn collection_entries(path: &str, body: Value) -> Result<Vec<(String, Value)>, StoreError> {
    match body {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => Ok(map.into_iter().collect()),
        Value::Array(items) => Ok(items
            .into_iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v))
            .collect()),
        other => Err(StoreError::Unexpected {
            path: path.to_string(),
            detail: format!("expected an object, got {other}"),
        }),
    }
}
