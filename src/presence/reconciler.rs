//! Disconnect reconciliation.
//!
//! Converts "possibly disconnected" signals into authoritative offline
//! transitions, using a single conditional update so rapid reconnects can
//! never be clobbered by a stale disconnect.

use crate::config::PresenceSettings;
use crate::notify::broadcaster::NotificationBroadcaster;
use crate::notify::events::StateChange;
use crate::ops::observability::PresenceMetrics;
use crate::presence::record::PresenceStatus;
use crate::presence::registry::DisconnectSignal;
use crate::presence::store::{CasOutcome, PresenceStore, StoreError};
use crate::time::Clock;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Result of a reconciliation pass for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The record transitioned offline; one broadcast was published.
    TransitionedOffline,
    /// A reconnect raced in first or the record was already offline.
    Skipped,
    /// No record exists for the key.
    NoRecord,
}

pub struct DisconnectReconciler<C: Clock> {
    store: Arc<dyn PresenceStore>,
    broadcaster: Arc<NotificationBroadcaster>,
    clock: C,
    retry_attempts: u32,
    retry_backoff: Duration,
    metrics: Arc<PresenceMetrics>,
}

impl<C: Clock> DisconnectReconciler<C> {
    pub fn new(
        store: Arc<dyn PresenceStore>,
        broadcaster: Arc<NotificationBroadcaster>,
        clock: C,
        settings: &PresenceSettings,
        metrics: Arc<PresenceMetrics>,
    ) -> Self {
        Self {
            store,
            broadcaster,
            clock,
            retry_attempts: settings.store_retry_attempts,
            retry_backoff: Duration::from_millis(settings.store_retry_backoff_ms),
            metrics,
        }
    }

    /// Reconcile one (room, user) key.
    ///
    /// Transient store failures are retried within the configured budget;
    /// exhausting it surfaces the error to the caller as non-fatal (presence
    /// stays stale until the next sweep catches it).
    pub async fn reconcile(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<ReconcileOutcome, StoreError> {
        let mut attempt = 0;
        loop {
            match self.store.transition_offline_if_idle(room_id, user_id) {
                Ok(CasOutcome::Applied) => {
                    self.metrics
                        .offline_transitions
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::info!(room_id, user_id, "presence reconciled offline");
                    self.broadcaster.publish(&StateChange::PresenceChanged {
                        room_id: room_id.to_string(),
                        user_id: user_id.to_string(),
                        status: PresenceStatus::Offline,
                    });
                    return Ok(ReconcileOutcome::TransitionedOffline);
                }
                Ok(CasOutcome::RaceLost) => {
                    tracing::debug!(room_id, user_id, "offline transition lost the race; no-op");
                    return Ok(ReconcileOutcome::Skipped);
                }
                Ok(CasOutcome::Missing) => return Ok(ReconcileOutcome::NoRecord),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.retry_attempts {
                        tracing::warn!(
                            error = %err,
                            room_id,
                            user_id,
                            attempts = attempt,
                            "reconciliation gave up; presence stays stale until the next sweep"
                        );
                        return Err(err);
                    }
                    tracing::warn!(error = %err, room_id, user_id, attempt, "store failure; retrying");
                    self.clock.sleep(self.retry_backoff).await;
                }
            }
        }
    }

    /// Drain disconnect signals until the channel closes.
    pub async fn run(self: Arc<Self>, mut signals: mpsc::UnboundedReceiver<DisconnectSignal>) {
        while let Some(signal) = signals.recv().await {
            if let Err(err) = self.reconcile(&signal.room_id, &signal.user_id).await {
                tracing::warn!(
                    error = %err,
                    room_id = %signal.room_id,
                    user_id = %signal.user_id,
                    connection_id = %signal.connection_id,
                    "disconnect reconciliation failed"
                );
            }
        }
        tracing::debug!("disconnect signal channel closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::store::InMemoryNotificationStore;
    use crate::notify::transport::MemoryTransport;
    use crate::ops::faults::FaultInjector;
    use crate::presence::store::InMemoryPresenceStore;
    use crate::time::SystemClock;

    struct Fixture {
        store: Arc<InMemoryPresenceStore>,
        faults: FaultInjector,
        transport: Arc<MemoryTransport>,
        reconciler: DisconnectReconciler<SystemClock>,
    }

    fn fixture() -> Fixture {
        let faults = FaultInjector::default();
        let store = Arc::new(InMemoryPresenceStore::with_faults(faults.clone()));
        let notifications = Arc::new(InMemoryNotificationStore::new());
        notifications.insert(crate::notify::store::Notification {
            id: "n1".into(),
            user_id: "u".into(),
            kind: "mention".into(),
            data: serde_json::json!({}),
            created_at: chrono::Utc::now(),
            read_at: None,
        });
        let metrics = Arc::new(PresenceMetrics::default());
        let transport = Arc::new(MemoryTransport::new());
        let broadcaster = Arc::new(NotificationBroadcaster::new(
            notifications,
            transport.clone(),
            metrics.clone(),
        ));
        let settings = PresenceSettings {
            store_retry_backoff_ms: 1,
            ..PresenceSettings::default()
        };
        let reconciler = DisconnectReconciler::new(
            store.clone(),
            broadcaster,
            SystemClock,
            &settings,
            metrics,
        );
        Fixture {
            store,
            faults,
            transport,
            reconciler,
        }
    }

    #[tokio::test]
    async fn transitions_idle_record_offline_once() {
        let fx = fixture();
        fx.store.mark_online("r", "u", 100).unwrap();
        fx.store.release_connection("r", "u").unwrap();

        let outcome = fx.reconciler.reconcile("r", "u").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::TransitionedOffline);

        // Duplicate signal: no second transition, no second broadcast.
        let outcome = fx.reconciler.reconcile("r", "u").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Skipped);
        assert_eq!(fx.transport.len(), 1);
    }

    #[tokio::test]
    async fn reconnect_race_is_a_noop() {
        let fx = fixture();
        fx.store.mark_online("r", "u", 100).unwrap();
        fx.store.release_connection("r", "u").unwrap();
        // A new connection attaches before reconciliation runs.
        fx.store.mark_online("r", "u", 101).unwrap();

        let outcome = fx.reconciler.reconcile("r", "u").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Skipped);
        let rec = fx.store.get("r", "u").unwrap().unwrap();
        assert!(rec.is_online());
        assert_eq!(rec.active_connection_count, 1);
        assert!(fx.transport.is_empty());
    }

    #[tokio::test]
    async fn retries_transient_failures_within_budget() {
        let fx = fixture();
        fx.store.mark_online("r", "u", 100).unwrap();
        fx.store.release_connection("r", "u").unwrap();

        // Two injected failures, budget of three attempts: succeeds.
        fx.faults.fail_store_ops(2);
        let outcome = fx.reconciler.reconcile("r", "u").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::TransitionedOffline);
    }

    #[tokio::test]
    async fn exhausted_budget_surfaces_the_error() {
        let fx = fixture();
        fx.store.mark_online("r", "u", 100).unwrap();
        fx.store.release_connection("r", "u").unwrap();

        fx.faults.fail_store_ops(5);
        assert!(fx.reconciler.reconcile("r", "u").await.is_err());
        // Presence stays stale (online) pending the next sweep.
        assert!(fx.store.get("r", "u").unwrap().unwrap().is_online());
    }

    #[tokio::test]
    async fn missing_record_is_reported() {
        let fx = fixture();
        let outcome = fx.reconciler.reconcile("r", "ghost").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::NoRecord);
    }
}
