//! Common test harness utilities for integration tests.
//!
//! Builds the presence subsystem around in-memory backends with an
//! inspectable transport and injectable store faults.

// Not all test files use all helpers; silence dead_code warnings for unused exports.
#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use vigil::broadcaster::NotificationBroadcaster;
use vigil::config::PresenceSettings;
use vigil::faults::FaultInjector;
use vigil::notify::store::{InMemoryNotificationStore, Notification};
use vigil::observability::PresenceMetrics;
use vigil::reconciler::DisconnectReconciler;
use vigil::registry::{ConnectionRegistry, DisconnectSignal};
use vigil::store::InMemoryPresenceStore;
use vigil::sweeper::InactivitySweeper;
use vigil::time::SystemClock;
use vigil::transport::MemoryTransport;

pub struct Harness {
    pub store: Arc<InMemoryPresenceStore>,
    pub faults: FaultInjector,
    pub notifications: Arc<InMemoryNotificationStore>,
    pub transport: Arc<MemoryTransport>,
    pub metrics: Arc<PresenceMetrics>,
    pub registry: ConnectionRegistry,
    pub reconciler: Arc<DisconnectReconciler<SystemClock>>,
    pub sweeper: InactivitySweeper,
    pub signals: mpsc::UnboundedReceiver<DisconnectSignal>,
}

/// Assemble the full presence pipeline with fast retry backoff.
pub fn harness() -> Harness {
    let faults = FaultInjector::default();
    let store = Arc::new(InMemoryPresenceStore::with_faults(faults.clone()));
    let notifications = Arc::new(InMemoryNotificationStore::new());
    let transport = Arc::new(MemoryTransport::new());
    let metrics = Arc::new(PresenceMetrics::default());
    let broadcaster = Arc::new(NotificationBroadcaster::new(
        notifications.clone(),
        transport.clone(),
        metrics.clone(),
    ));
    let (signal_tx, signals) = mpsc::unbounded_channel();
    let registry = ConnectionRegistry::new(store.clone(), signal_tx, metrics.clone());
    let settings = PresenceSettings {
        store_retry_backoff_ms: 1,
        ..PresenceSettings::default()
    };
    let reconciler = Arc::new(DisconnectReconciler::new(
        store.clone(),
        broadcaster.clone(),
        SystemClock,
        &settings,
        metrics.clone(),
    ));
    let sweeper = InactivitySweeper::new(store.clone(), broadcaster, metrics.clone());
    Harness {
        store,
        faults,
        notifications,
        transport,
        metrics,
        registry,
        reconciler,
        sweeper,
        signals,
    }
}

/// Seed an unread notification with a deterministic timestamp.
pub fn seed_notification(
    notifications: &InMemoryNotificationStore,
    id: &str,
    user_id: &str,
    created_secs: i64,
) -> Notification {
    let notification = Notification {
        id: id.to_string(),
        user_id: user_id.to_string(),
        kind: "mention".to_string(),
        data: serde_json::json!({ "messageId": format!("msg-{id}") }),
        created_at: Utc.timestamp_opt(created_secs, 0).unwrap(),
        read_at: None,
    };
    notifications.insert(notification.clone());
    notification
}
