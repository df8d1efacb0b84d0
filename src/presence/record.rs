use serde::{Deserialize, Serialize};

/// Connection status of a user within a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Offline,
}

/// Record key: (room, user) pairs are unique per record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresenceKey {
    pub room_id: String,
    pub user_id: String,
}

impl PresenceKey {
    pub fn new(room_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// Durable presence state for one (room, user) pair.
///
/// Invariants enforced by the store:
/// - `status == Offline` implies `active_connection_count == 0`.
/// - `last_active_at` is monotonically non-decreasing except when reset by a
///   new session (`mark_online` on an offline record).
///
/// Records are never hard-deleted; they persist as offline history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub room_id: String,
    pub user_id: String,
    pub status: PresenceStatus,
    /// Last known activity (heartbeat, message, reconnect), Unix epoch seconds.
    pub last_active_at: u64,
    /// Live connections currently attributed to this pair.
    pub active_connection_count: u32,
}

impl PresenceRecord {
    /// Fresh record for a newly attributed connection.
    pub fn new_online(
        room_id: impl Into<String>,
        user_id: impl Into<String>,
        now_secs: u64,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            user_id: user_id.into(),
            status: PresenceStatus::Online,
            last_active_at: now_secs,
            active_connection_count: 1,
        }
    }

    pub fn key(&self) -> PresenceKey {
        PresenceKey::new(self.room_id.clone(), self.user_id.clone())
    }

    pub fn is_online(&self) -> bool {
        self.status == PresenceStatus::Online
    }

    /// Stale iff online and inactive for longer than the threshold.
    pub fn is_stale_at(&self, threshold_secs: u64, now_secs: u64) -> bool {
        self.is_online() && self.last_active_at < now_secs.saturating_sub(threshold_secs)
    }
}
