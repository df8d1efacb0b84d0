//! Live connection attribution.
//!
//! The registry is an explicit, passable object constructed per worker; it is
//! process-local and never the source of truth for presence. Its attribution
//! map is intentionally lost on restart: the inactivity sweeper is the
//! durability backstop.

use crate::ops::observability::PresenceMetrics;
use crate::presence::store::{PresenceStore, ReleaseOutcome, StoreError};
use crate::time::unix_now;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Which (room, user) a live connection is currently attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub room_id: String,
    pub user_id: String,
}

/// "Possibly disconnected" signal handed to the reconciler when a release
/// drops a record's connection count to zero.
#[derive(Debug, Clone)]
pub struct DisconnectSignal {
    pub room_id: String,
    pub user_id: String,
    pub connection_id: String,
}

/// Result of detaching a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachOutcome {
    /// Other connections keep the record online.
    Remaining(u32),
    /// Count reached zero; a disconnect signal was emitted.
    ReachedZero,
    /// The connection was never registered here (duplicate signal, or the
    /// attribution map was lost to a restart). Treated as a no-op.
    Unknown,
}

/// Tracks which logical connections belong to which (room, user) pair and
/// keeps the presence store's connection counts in step.
pub struct ConnectionRegistry {
    store: Arc<dyn PresenceStore>,
    attributions: Mutex<HashMap<String, Attribution>>,
    signals: mpsc::UnboundedSender<DisconnectSignal>,
    metrics: Arc<PresenceMetrics>,
}

impl ConnectionRegistry {
    pub fn new(
        store: Arc<dyn PresenceStore>,
        signals: mpsc::UnboundedSender<DisconnectSignal>,
        metrics: Arc<PresenceMetrics>,
    ) -> Self {
        Self {
            store,
            attributions: Mutex::new(HashMap::new()),
            signals,
            metrics,
        }
    }

    /// Register a live connection for (room, user).
    pub fn attach(
        &self,
        connection_id: &str,
        room_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError> {
        self.attach_at(connection_id, room_id, user_id, unix_now())
    }

    pub fn attach_at(
        &self,
        connection_id: &str,
        room_id: &str,
        user_id: &str,
        now_secs: u64,
    ) -> Result<(), StoreError> {
        let mut attributions = self.attributions.lock();
        if let Some(existing) = attributions.get(connection_id) {
            if existing.room_id == room_id && existing.user_id == user_id {
                // Re-attach of a known connection degrades to a heartbeat.
                return self.store.touch(room_id, user_id, now_secs);
            }
            // The connection moved; release its previous attribution first.
            let old = existing.clone();
            self.release(connection_id, &old)?;
        }
        self.store.mark_online(room_id, user_id, now_secs)?;
        attributions.insert(
            connection_id.to_string(),
            Attribution {
                room_id: room_id.to_string(),
                user_id: user_id.to_string(),
            },
        );
        self.metrics.attaches.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(connection_id, room_id, user_id, "connection attached");
        Ok(())
    }

    /// Activity heartbeat: refresh `last_active_at` for the attributed pair.
    /// Returns false for unknown connections.
    pub fn touch(&self, connection_id: &str) -> Result<bool, StoreError> {
        self.touch_at(connection_id, unix_now())
    }

    pub fn touch_at(&self, connection_id: &str, now_secs: u64) -> Result<bool, StoreError> {
        let attributions = self.attributions.lock();
        let Some(attribution) = attributions.get(connection_id) else {
            return Ok(false);
        };
        self.store
            .touch(&attribution.room_id, &attribution.user_id, now_secs)?;
        Ok(true)
    }

    /// Remove a connection and decrement its record's count.
    ///
    /// Emits exactly one disconnect signal per actual 1->0 transition;
    /// duplicate detaches and already-zero counts emit nothing.
    pub fn detach(&self, connection_id: &str) -> Result<DetachOutcome, StoreError> {
        let mut attributions = self.attributions.lock();
        let Some(attribution) = attributions.remove(connection_id) else {
            tracing::debug!(connection_id, "detach for unregistered connection; ignoring");
            return Ok(DetachOutcome::Unknown);
        };
        self.metrics.detaches.fetch_add(1, Ordering::Relaxed);
        self.release(connection_id, &attribution)
    }

    /// Inbound gateway disconnect: `{ userId, connectionId }`, delivered
    /// at-least-once. Idempotent under duplicates.
    pub fn handle_disconnect(
        &self,
        user_id: &str,
        connection_id: &str,
    ) -> Result<DetachOutcome, StoreError> {
        {
            let attributions = self.attributions.lock();
            if let Some(attribution) = attributions.get(connection_id) {
                if attribution.user_id != user_id {
                    tracing::warn!(
                        connection_id,
                        claimed = user_id,
                        attributed = %attribution.user_id,
                        "disconnect signal user mismatch; ignoring"
                    );
                    return Ok(DetachOutcome::Unknown);
                }
            }
        }
        self.detach(connection_id)
    }

    /// Number of live attributions held by this worker.
    pub fn active_connections(&self) -> usize {
        self.attributions.lock().len()
    }

    fn release(
        &self,
        connection_id: &str,
        attribution: &Attribution,
    ) -> Result<DetachOutcome, StoreError> {
        match self
            .store
            .release_connection(&attribution.room_id, &attribution.user_id)?
        {
            ReleaseOutcome::ReachedZero => {
                let signal = DisconnectSignal {
                    room_id: attribution.room_id.clone(),
                    user_id: attribution.user_id.clone(),
                    connection_id: connection_id.to_string(),
                };
                // Receiver gone means the runtime is shutting down; the
                // sweeper will catch the record either way.
                if self.signals.send(signal).is_err() {
                    tracing::debug!(connection_id, "reconciler channel closed; relying on sweep");
                }
                Ok(DetachOutcome::ReachedZero)
            }
            ReleaseOutcome::Remaining(n) => Ok(DetachOutcome::Remaining(n)),
            ReleaseOutcome::AlreadyZero => Ok(DetachOutcome::Remaining(0)),
            ReleaseOutcome::Missing => Ok(DetachOutcome::Unknown),
        }
    }
}
