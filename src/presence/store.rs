//! Presence store seam and in-memory backend.
//!
//! The persistence layer is a collaborator: everything the core needs from it
//! is an atomic conditional read-modify-write keyed by (room_id, user_id).
//! Per-record consistency comes from these conditional updates, never from
//! application-level locks that cannot span worker processes.

use crate::ops::faults::FaultInjector;
use crate::presence::record::{PresenceKey, PresenceRecord, PresenceStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;

/// Transient failure of a backing store. Callers retry within a bounded
/// budget before surfacing the error as recoverable.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backing store unavailable: {0}")]
    Unavailable(String),
    #[error("backing store operation timed out")]
    Timeout,
}

/// Result of an atomic connection-count decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Connections remain attributed after the decrement.
    Remaining(u32),
    /// This decrement took the count from one to zero.
    ReachedZero,
    /// Count was already zero; no decrement, no signal.
    AlreadyZero,
    /// No record exists for the key.
    Missing,
}

/// Result of a conditional offline transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The record transitioned online -> offline.
    Applied,
    /// The precondition no longer held (reconnect raced in, or the record was
    /// already offline). A successful no-op, never an error.
    RaceLost,
    /// No record exists for the key.
    Missing,
}

/// Atomic conditional operations on presence records.
///
/// All mutating operations take effect atomically per key; `sweep_offline`
/// takes effect atomically per batch (all-or-nothing).
pub trait PresenceStore: Send + Sync {
    /// Create or resurrect a record on connection attach.
    ///
    /// Offline or missing: transitions to online with count 1 and
    /// `last_active_at` reset to `now_secs` (a new session). Online:
    /// increments the count and refreshes `last_active_at`.
    fn mark_online(
        &self,
        room_id: &str,
        user_id: &str,
        now_secs: u64,
    ) -> Result<PresenceRecord, StoreError>;

    /// Refresh `last_active_at` (monotonic; never moves backwards).
    fn touch(&self, room_id: &str, user_id: &str, now_secs: u64) -> Result<(), StoreError>;

    /// Decrement the connection count, floored at zero.
    fn release_connection(&self, room_id: &str, user_id: &str)
        -> Result<ReleaseOutcome, StoreError>;

    /// Transition to offline iff currently online with zero connections.
    ///
    /// The check and the write are one atomic update; a concurrent attach
    /// between them is impossible.
    fn transition_offline_if_idle(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<CasOutcome, StoreError>;

    /// Keys of online records with `last_active_at < now - threshold`.
    fn stale_candidates(
        &self,
        threshold_secs: u64,
        now_secs: u64,
    ) -> Result<Vec<PresenceKey>, StoreError>;

    /// Force the given candidates offline, zeroing their counts.
    ///
    /// The staleness predicate is re-evaluated at commit time, so records
    /// refreshed since selection are skipped. The batch is all-or-nothing: on
    /// failure no record is modified.
    fn sweep_offline(
        &self,
        candidates: &[PresenceKey],
        threshold_secs: u64,
        now_secs: u64,
    ) -> Result<Vec<PresenceRecord>, StoreError>;

    fn get(&self, room_id: &str, user_id: &str) -> Result<Option<PresenceRecord>, StoreError>;
}

/// In-memory presence store.
///
/// A single mutex gives every operation (and every sweep batch) the atomicity
/// the trait contract demands. A [`FaultInjector`] lets tests force transient
/// failures and verify batch rollback.
#[derive(Default)]
pub struct InMemoryPresenceStore {
    records: Mutex<HashMap<PresenceKey, PresenceRecord>>,
    faults: FaultInjector,
}

impl InMemoryPresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: FaultInjector) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            faults,
        }
    }

    fn check_faults(&self) -> Result<(), StoreError> {
        if self.faults.take_store_fault() {
            return Err(StoreError::Unavailable("injected fault".into()));
        }
        Ok(())
    }
}

impl PresenceStore for InMemoryPresenceStore {
    fn mark_online(
        &self,
        room_id: &str,
        user_id: &str,
        now_secs: u64,
    ) -> Result<PresenceRecord, StoreError> {
        self.check_faults()?;
        let mut records = self.records.lock();
        let key = PresenceKey::new(room_id, user_id);
        let record = records
            .entry(key)
            .and_modify(|rec| {
                if rec.is_online() {
                    rec.active_connection_count = rec.active_connection_count.saturating_add(1);
                    rec.last_active_at = rec.last_active_at.max(now_secs);
                } else {
                    // Resurrection: a new session explicitly resets activity.
                    rec.status = PresenceStatus::Online;
                    rec.active_connection_count = 1;
                    rec.last_active_at = now_secs;
                }
            })
            .or_insert_with(|| PresenceRecord::new_online(room_id, user_id, now_secs));
        Ok(record.clone())
    }

    fn touch(&self, room_id: &str, user_id: &str, now_secs: u64) -> Result<(), StoreError> {
        self.check_faults()?;
        let mut records = self.records.lock();
        if let Some(rec) = records.get_mut(&PresenceKey::new(room_id, user_id)) {
            rec.last_active_at = rec.last_active_at.max(now_secs);
        }
        Ok(())
    }

    fn release_connection(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<ReleaseOutcome, StoreError> {
        self.check_faults()?;
        let mut records = self.records.lock();
        let Some(rec) = records.get_mut(&PresenceKey::new(room_id, user_id)) else {
            return Ok(ReleaseOutcome::Missing);
        };
        match rec.active_connection_count {
            0 => Ok(ReleaseOutcome::AlreadyZero),
            1 => {
                rec.active_connection_count = 0;
                Ok(ReleaseOutcome::ReachedZero)
            }
            n => {
                rec.active_connection_count = n - 1;
                Ok(ReleaseOutcome::Remaining(n - 1))
            }
        }
    }

    fn transition_offline_if_idle(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<CasOutcome, StoreError> {
        self.check_faults()?;
        let mut records = self.records.lock();
        let Some(rec) = records.get_mut(&PresenceKey::new(room_id, user_id)) else {
            return Ok(CasOutcome::Missing);
        };
        if rec.is_online() && rec.active_connection_count == 0 {
            rec.status = PresenceStatus::Offline;
            Ok(CasOutcome::Applied)
        } else {
            Ok(CasOutcome::RaceLost)
        }
    }

    fn stale_candidates(
        &self,
        threshold_secs: u64,
        now_secs: u64,
    ) -> Result<Vec<PresenceKey>, StoreError> {
        self.check_faults()?;
        let records = self.records.lock();
        Ok(records
            .values()
            .filter(|rec| rec.is_stale_at(threshold_secs, now_secs))
            .map(PresenceRecord::key)
            .collect())
    }

    fn sweep_offline(
        &self,
        candidates: &[PresenceKey],
        threshold_secs: u64,
        now_secs: u64,
    ) -> Result<Vec<PresenceRecord>, StoreError> {
        // Fail before any mutation: the batch is all-or-nothing.
        self.check_faults()?;
        let mut records = self.records.lock();
        let mut swept = Vec::new();
        for key in candidates {
            if let Some(rec) = records.get_mut(key) {
                // Re-check at commit time: activity since selection wins.
                if rec.is_stale_at(threshold_secs, now_secs) {
                    rec.status = PresenceStatus::Offline;
                    rec.active_connection_count = 0;
                    swept.push(rec.clone());
                }
            }
        }
        Ok(swept)
    }

    fn get(&self, room_id: &str, user_id: &str) -> Result<Option<PresenceRecord>, StoreError> {
        self.check_faults()?;
        let records = self.records.lock();
        Ok(records.get(&PresenceKey::new(room_id, user_id)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_online_increments_and_refreshes() {
        let store = InMemoryPresenceStore::new();
        let rec = store.mark_online("r", "u", 100).unwrap();
        assert_eq!(rec.active_connection_count, 1);

        let rec = store.mark_online("r", "u", 150).unwrap();
        assert_eq!(rec.active_connection_count, 2);
        assert_eq!(rec.last_active_at, 150);
    }

    #[test]
    fn mark_online_resurrects_offline_record() {
        let store = InMemoryPresenceStore::new();
        store.mark_online("r", "u", 100).unwrap();
        store.release_connection("r", "u").unwrap();
        store.transition_offline_if_idle("r", "u").unwrap();

        let rec = store.mark_online("r", "u", 50).unwrap();
        assert!(rec.is_online());
        assert_eq!(rec.active_connection_count, 1);
        // A new session resets activity even backwards.
        assert_eq!(rec.last_active_at, 50);
    }

    #[test]
    fn touch_never_moves_backwards() {
        let store = InMemoryPresenceStore::new();
        store.mark_online("r", "u", 100).unwrap();
        store.touch("r", "u", 80).unwrap();
        let rec = store.get("r", "u").unwrap().unwrap();
        assert_eq!(rec.last_active_at, 100);

        store.touch("r", "u", 120).unwrap();
        let rec = store.get("r", "u").unwrap().unwrap();
        assert_eq!(rec.last_active_at, 120);
    }

    #[test]
    fn release_floors_at_zero() {
        let store = InMemoryPresenceStore::new();
        store.mark_online("r", "u", 100).unwrap();
        assert_eq!(
            store.release_connection("r", "u").unwrap(),
            ReleaseOutcome::ReachedZero
        );
        assert_eq!(
            store.release_connection("r", "u").unwrap(),
            ReleaseOutcome::AlreadyZero
        );
        let rec = store.get("r", "u").unwrap().unwrap();
        assert_eq!(rec.active_connection_count, 0);
    }

    #[test]
    fn release_missing_record_is_reported() {
        let store = InMemoryPresenceStore::new();
        assert_eq!(
            store.release_connection("r", "ghost").unwrap(),
            ReleaseOutcome::Missing
        );
    }

    #[test]
    fn offline_cas_requires_idle_online_record() {
        let store = InMemoryPresenceStore::new();
        assert_eq!(
            store.transition_offline_if_idle("r", "u").unwrap(),
            CasOutcome::Missing
        );

        store.mark_online("r", "u", 100).unwrap();
        assert_eq!(
            store.transition_offline_if_idle("r", "u").unwrap(),
            CasOutcome::RaceLost
        );

        store.release_connection("r", "u").unwrap();
        assert_eq!(
            store.transition_offline_if_idle("r", "u").unwrap(),
            CasOutcome::Applied
        );
        // Second attempt: already offline, still a no-op.
        assert_eq!(
            store.transition_offline_if_idle("r", "u").unwrap(),
            CasOutcome::RaceLost
        );
        let rec = store.get("r", "u").unwrap().unwrap();
        assert_eq!(rec.status, PresenceStatus::Offline);
        assert_eq!(rec.active_connection_count, 0);
    }

    #[test]
    fn sweep_refilters_at_commit_time() {
        let store = InMemoryPresenceStore::new();
        let now = 10_000;
        store.mark_online("r", "stale", now - 600).unwrap();
        store.mark_online("r", "fresh", now - 600).unwrap();

        let candidates = store.stale_candidates(300, now).unwrap();
        assert_eq!(candidates.len(), 2);

        // Activity lands between selection and commit.
        store.touch("r", "fresh", now).unwrap();

        let swept = store.sweep_offline(&candidates, 300, now).unwrap();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].user_id, "stale");
        assert!(store.get("r", "fresh").unwrap().unwrap().is_online());
    }

    #[test]
    fn sweep_failure_leaves_records_unchanged() {
        let faults = FaultInjector::default();
        let store = InMemoryPresenceStore::with_faults(faults.clone());
        let now = 10_000;
        store.mark_online("r", "u", now - 600).unwrap();
        let candidates = store.stale_candidates(300, now).unwrap();

        faults.fail_store_ops(1);
        assert!(store.sweep_offline(&candidates, 300, now).is_err());
        assert!(store.get("r", "u").unwrap().unwrap().is_online());

        // The next run retries the same records.
        let swept = store.sweep_offline(&candidates, 300, now).unwrap();
        assert_eq!(swept.len(), 1);
    }
}
