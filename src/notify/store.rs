//! Notification store seam.
//!
//! This core reads notifications but never writes their content; the
//! in-memory backend's `insert`/`mark_read` stand in for the external write
//! path.

use crate::presence::store::StoreError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A notification owned by the external notification system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Opaque payload; passed through to broadcasts untouched.
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn is_unread(&self) -> bool {
        self.read_at.is_none()
    }
}

/// Read-side operations this core needs from the notification system.
pub trait NotificationStore: Send + Sync {
    fn find(&self, id: &str) -> Result<Option<Notification>, StoreError>;
    fn latest_for_user(&self, user_id: &str) -> Result<Option<Notification>, StoreError>;
    /// Recomputed on every call; never cached.
    fn unread_count(&self, user_id: &str) -> Result<u64, StoreError>;
}

/// In-memory notification store.
#[derive(Default)]
pub struct InMemoryNotificationStore {
    notifications: Mutex<Vec<Notification>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// External write path stand-in.
    pub fn insert(&self, notification: Notification) {
        self.notifications.lock().push(notification);
    }

    pub fn mark_read(&self, id: &str, at: DateTime<Utc>) -> bool {
        let mut notifications = self.notifications.lock();
        if let Some(n) = notifications.iter_mut().find(|n| n.id == id) {
            n.read_at = Some(at);
            true
        } else {
            false
        }
    }
}

impl NotificationStore for InMemoryNotificationStore {
    fn find(&self, id: &str) -> Result<Option<Notification>, StoreError> {
        Ok(self
            .notifications
            .lock()
            .iter()
            .find(|n| n.id == id)
            .cloned())
    }

    fn latest_for_user(&self, user_id: &str) -> Result<Option<Notification>, StoreError> {
        Ok(self
            .notifications
            .lock()
            .iter()
            .filter(|n| n.user_id == user_id)
            .max_by_key(|n| n.created_at)
            .cloned())
    }

    fn unread_count(&self, user_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .notifications
            .lock()
            .iter()
            .filter(|n| n.user_id == user_id && n.is_unread())
            .count() as u64)
    }
}
