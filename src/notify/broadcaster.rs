//! Broadcast payload assembly and fan-out.

use crate::notify::events::StateChange;
use crate::notify::store::{Notification, NotificationStore};
use crate::notify::transport::{BroadcastPayload, BroadcastTransport};
use crate::ops::observability::PresenceMetrics;
use crate::presence::store::StoreError;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// What happened to a broadcast attempt. Informational only: none of these
/// outcomes propagate to the caller that produced the state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    Delivered,
    /// No notification could be resolved for the subject; nothing was sent.
    Suppressed,
    /// The transport rejected the payload. The state change stands.
    TransportFailed,
}

/// Assembles broadcast payloads for state changes and hands them to the
/// real-time transport. Fire-and-forget: failures are logged, never raised.
pub struct NotificationBroadcaster {
    notifications: Arc<dyn NotificationStore>,
    transport: Arc<dyn BroadcastTransport>,
    metrics: Arc<PresenceMetrics>,
}

impl NotificationBroadcaster {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        transport: Arc<dyn BroadcastTransport>,
        metrics: Arc<PresenceMetrics>,
    ) -> Self {
        Self {
            notifications,
            transport,
            metrics,
        }
    }

    pub fn publish(&self, event: &StateChange) -> BroadcastOutcome {
        let user_id = event.user_id();

        let notification = match self.resolve(event) {
            Ok(Some(n)) => n,
            Ok(None) => {
                tracing::debug!(user_id, "no notification to broadcast; suppressing");
                return self.suppressed();
            }
            Err(err) => {
                tracing::warn!(error = %err, user_id, "notification lookup failed; suppressing broadcast");
                return self.suppressed();
            }
        };

        // Snapshot at emission time, never cached.
        let unread_count = match self.notifications.unread_count(user_id) {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(error = %err, user_id, "unread count unavailable; suppressing broadcast");
                return self.suppressed();
            }
        };

        let payload = BroadcastPayload {
            user_id: user_id.to_string(),
            notification_id: notification.id,
            kind: notification.kind,
            data: notification.data,
            created_at: notification.created_at,
            unread_count,
        };

        match self.transport.deliver(&payload) {
            Ok(()) => {
                self.metrics
                    .broadcasts_delivered
                    .fetch_add(1, Ordering::Relaxed);
                BroadcastOutcome::Delivered
            }
            Err(err) => {
                tracing::warn!(error = %err, user_id, "broadcast transport failed; state change stands");
                self.metrics
                    .broadcasts_failed
                    .fetch_add(1, Ordering::Relaxed);
                BroadcastOutcome::TransportFailed
            }
        }
    }

    /// Resolve the authoritative notification for a trigger, falling back to
    /// the subject's most recent notification when the direct lookup misses.
    fn resolve(&self, event: &StateChange) -> Result<Option<Notification>, StoreError> {
        match event {
            StateChange::NotificationCreated {
                user_id,
                notification_id,
            } => {
                if let Some(n) = self.notifications.find(notification_id)? {
                    return Ok(Some(n));
                }
                self.notifications.latest_for_user(user_id)
            }
            StateChange::PresenceChanged { user_id, .. } => {
                self.notifications.latest_for_user(user_id)
            }
        }
    }

    fn suppressed(&self) -> BroadcastOutcome {
        self.metrics
            .broadcasts_suppressed
            .fetch_add(1, Ordering::Relaxed);
        BroadcastOutcome::Suppressed
    }
}
