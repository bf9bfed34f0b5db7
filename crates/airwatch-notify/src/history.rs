use std::path::{Path, PathBuf};

use airwatch_models::notification::{NotificationHistory, NotificationRecord};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::channel::Alert;
use crate::error::NotifyError;

/// Flat JSON file holding dispatched alerts and the throttle cache.
///
/// Writes go through a temporary sibling and a rename; the in-process mutex
/// serializes read-modify-write cycles.
pub struct HistoryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the history. A missing file is an empty history.
    pub async fn load(&self) -> Result<NotificationHistory, NotifyError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(NotificationHistory::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Append a dispatched alert and update its throttle timestamp.
    pub async fn record(&self, alert: &Alert) -> Result<(), NotifyError> {
        let _guard = self.write_lock.lock().await;
        let mut history = match self.load().await {
            Ok(history) => history,
            Err(NotifyError::Json(e)) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Notification history unreadable, starting fresh");
                NotificationHistory::default()
            }
            Err(e) => return Err(e),
        };

        history.notifications.push(NotificationRecord {
            id: Uuid::new_v4(),
            fingerprint: alert.fingerprint.clone(),
            flight: alert.flight.clone(),
            sent_at: alert.triggered_at,
        });
        history
            .throttle_cache
            .insert(alert.fingerprint.clone(), alert.triggered_at);

        self.write(&history).await
    }

    /// Reset to an empty history.
    pub async fn clear(&self) -> Result<(), NotifyError> {
        let _guard = self.write_lock.lock().await;
        self.write(&NotificationHistory::default()).await
    }

    async fn write(&self, history: &NotificationHistory) -> Result<(), NotifyError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(history)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
