//! Inactivity sweeping.
//!
//! The safety net behind disconnect reconciliation: any record that claims
//! to be online but has not been active within the threshold gets forced
//! offline. Selection and commit are separate store calls, and the commit
//! re-evaluates staleness per record, so a heartbeat that lands in between
//! keeps its user online.

use crate::notify::broadcaster::NotificationBroadcaster;
use crate::notify::events::StateChange;
use crate::ops::observability::PresenceMetrics;
use crate::presence::record::PresenceStatus;
use crate::presence::store::{PresenceStore, StoreError};
use crate::time::unix_now;
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// One record forced offline by a sweep.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SweptUser {
    pub room_id: String,
    pub user_id: String,
}

/// Summary of a completed sweep pass.
#[derive(Debug, Clone, Serialize, Default)]
pub struct SweepReport {
    pub transitioned: Vec<SweptUser>,
}

impl SweepReport {
    pub fn count(&self) -> usize {
        self.transitioned.len()
    }
}

pub struct InactivitySweeper {
    store: Arc<dyn PresenceStore>,
    broadcaster: Arc<NotificationBroadcaster>,
    metrics: Arc<PresenceMetrics>,
}

impl InactivitySweeper {
    pub fn new(
        store: Arc<dyn PresenceStore>,
        broadcaster: Arc<NotificationBroadcaster>,
        metrics: Arc<PresenceMetrics>,
    ) -> Self {
        Self {
            store,
            broadcaster,
            metrics,
        }
    }

    /// Sweep records idle longer than `inactive_minutes`, using wall time.
    pub fn sweep(&self, inactive_minutes: u64) -> Result<SweepReport, StoreError> {
        self.sweep_at(inactive_minutes, unix_now())
    }

    /// Sweep with an explicit notion of "now" in unix seconds.
    pub fn sweep_at(&self, inactive_minutes: u64, now_secs: u64) -> Result<SweepReport, StoreError> {
        let threshold_secs = inactive_minutes * 60;
        self.metrics.sweeps_run.fetch_add(1, Ordering::Relaxed);

        let candidates = self.store.stale_candidates(threshold_secs, now_secs)?;
        if candidates.is_empty() {
            tracing::debug!(inactive_minutes, "sweep found no stale records");
            return Ok(SweepReport::default());
        }

        let swept = self
            .store
            .sweep_offline(&candidates, threshold_secs, now_secs)?;
        self.metrics
            .swept_records
            .fetch_add(swept.len() as u64, Ordering::Relaxed);
        self.metrics
            .offline_transitions
            .fetch_add(swept.len() as u64, Ordering::Relaxed);

        let mut report = SweepReport::default();
        for key in &swept {
            tracing::info!(room_id = %key.room_id, user_id = %key.user_id, "swept stale presence offline");
            self.broadcaster.publish(&StateChange::PresenceChanged {
                room_id: key.room_id.clone(),
                user_id: key.user_id.clone(),
                status: PresenceStatus::Offline,
            });
            report.transitioned.push(SweptUser {
                room_id: key.room_id.clone(),
                user_id: key.user_id.clone(),
            });
        }
        tracing::info!(
            candidates = candidates.len(),
            swept = report.count(),
            inactive_minutes,
            "sweep complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::store::InMemoryNotificationStore;
    use crate::notify::transport::MemoryTransport;
    use crate::ops::faults::FaultInjector;
    use crate::presence::store::InMemoryPresenceStore;

    struct Fixture {
        store: Arc<InMemoryPresenceStore>,
        faults: FaultInjector,
        transport: Arc<MemoryTransport>,
        sweeper: InactivitySweeper,
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
        let sweeper = InactivitySweeper::new(store.clone(), broadcaster, metrics);
        Fixture {
            store,
            faults,
            transport,
            sweeper,
        }
    }

    #[test]
    fn sweeps_only_records_past_the_threshold() {
        let fx = fixture();
        let now = 10_000;
        fx.store.mark_online("r", "idle-10m", now - 600).unwrap();
        fx.store.mark_online("r", "idle-6m", now - 360).unwrap();
        fx.store.mark_online("r", "idle-3m", now - 180).unwrap();

        let report = fx.sweeper.sweep_at(5, now).unwrap();
        assert_eq!(report.count(), 2);
        assert!(fx.store.get("r", "idle-3m").unwrap().unwrap().is_online());
        assert!(!fx.store.get("r", "idle-10m").unwrap().unwrap().is_online());
        assert!(!fx.store.get("r", "idle-6m").unwrap().unwrap().is_online());
    }

    #[test]
    fn exactly_at_threshold_stays_online() {
        let fx = fixture();
        let now = 10_000;
        fx.store.mark_online("r", "u", now - 300).unwrap();

        let report = fx.sweeper.sweep_at(5, now).unwrap();
        assert_eq!(report.count(), 0);
        assert!(fx.store.get("r", "u").unwrap().unwrap().is_online());
    }

    #[test]
    fn offline_records_are_never_candidates() {
        let fx = fixture();
        let now = 10_000;
        fx.store.mark_online("r", "u", now - 900).unwrap();
        fx.store.release_connection("r", "u").unwrap();
        fx.store.transition_offline_if_idle("r", "u").unwrap();

        let report = fx.sweeper.sweep_at(5, now).unwrap();
        assert_eq!(report.count(), 0);
    }

    #[test]
    fn heartbeat_between_selection_and_commit_is_honored() {
        let fx = fixture();
        let now = 10_000;
        fx.store.mark_online("r", "u", now - 600).unwrap();

        let candidates = fx.store.stale_candidates(300, now).unwrap();
        assert_eq!(candidates.len(), 1);
        // Heartbeat lands after selection but before the commit.
        fx.store.touch("r", "u", now).unwrap();
        let swept = fx.store.sweep_offline(&candidates, 300, now).unwrap();
        assert!(swept.is_empty());
        assert!(fx.store.get("r", "u").unwrap().unwrap().is_online());
    }

    #[test]
    fn sweep_is_idempotent() {
        let fx = fixture();
        let now = 10_000;
        fx.store.mark_online("r", "u", now - 600).unwrap();

        assert_eq!(fx.sweeper.sweep_at(5, now).unwrap().count(), 1);
        assert_eq!(fx.sweeper.sweep_at(5, now).unwrap().count(), 0);
        assert_eq!(fx.transport.len(), 1);
    }

    #[test]
    fn store_failure_leaves_records_for_the_next_run() {
        let fx = fixture();
        let now = 10_000;
        fx.store.mark_online("r", "u", now - 600).unwrap();

        fx.faults.fail_store_ops(1);
        assert!(fx.sweeper.sweep_at(5, now).is_err());
        assert!(fx.store.get("r", "u").unwrap().unwrap().is_online());
        assert!(fx.transport.is_empty());

        // Next run succeeds once the store recovers.
        let report = fx.sweeper.sweep_at(5, now).unwrap();
        assert_eq!(report.count(), 1);
    }
}
