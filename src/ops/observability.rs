//! Presence counters served by the control endpoint.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters for the presence core.
#[derive(Debug, Default)]
pub struct PresenceMetrics {
    pub attaches: AtomicU64,
    pub detaches: AtomicU64,
    /// Offline transitions, whether via reconciliation or sweep.
    pub offline_transitions: AtomicU64,
    pub sweeps_run: AtomicU64,
    pub swept_records: AtomicU64,
    pub broadcasts_delivered: AtomicU64,
    pub broadcasts_suppressed: AtomicU64,
    pub broadcasts_failed: AtomicU64,
}

impl PresenceMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            attaches: self.attaches.load(Ordering::Relaxed),
            detaches: self.detaches.load(Ordering::Relaxed),
            offline_transitions: self.offline_transitions.load(Ordering::Relaxed),
            sweeps_run: self.sweeps_run.load(Ordering::Relaxed),
            swept_records: self.swept_records.load(Ordering::Relaxed),
            broadcasts_delivered: self.broadcasts_delivered.load(Ordering::Relaxed),
            broadcasts_suppressed: self.broadcasts_suppressed.load(Ordering::Relaxed),
            broadcasts_failed: self.broadcasts_failed.load(Ordering::Relaxed),
        }
    }
}

/// Serializable point-in-time view of [`PresenceMetrics`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub attaches: u64,
    pub detaches: u64,
    pub offline_transitions: u64,
    pub sweeps_run: u64,
    pub swept_records: u64,
    pub broadcasts_delivered: u64,
    pub broadcasts_suppressed: u64,
    pub broadcasts_failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let metrics = PresenceMetrics::default();
        metrics.attaches.fetch_add(3, Ordering::Relaxed);
        metrics.offline_transitions.fetch_add(1, Ordering::Relaxed);
        let snap = metrics.snapshot();
        assert_eq!(snap.attaches, 3);
        assert_eq!(snap.offline_transitions, 1);
        assert_eq!(snap.detaches, 0);
    }
}
