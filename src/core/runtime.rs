//! Runtime scaffold: wires the presence store, registry, reconciler, sweeper,
//! and broadcaster, then runs the scheduled sweep loop and control endpoint
//! until shutdown.

use crate::config::Config;
use crate::notify::broadcaster::NotificationBroadcaster;
use crate::notify::events::StateChange;
use crate::notify::store::{InMemoryNotificationStore, Notification, NotificationStore};
use crate::notify::transport::{BroadcastTransport, LoggingTransport};
use crate::ops::observability::PresenceMetrics;
use crate::presence::reconciler::DisconnectReconciler;
use crate::presence::registry::{ConnectionRegistry, DisconnectSignal};
use crate::presence::store::{InMemoryPresenceStore, PresenceStore};
use crate::presence::sweeper::InactivitySweeper;
use crate::telemetry;
use crate::telemetry::LogHandle;
use crate::time::Clock;
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// The assembled presence subsystem, shared between the runtime loops and the
/// control endpoint.
pub struct PresenceService {
    pub store: Arc<dyn PresenceStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub sweeper: Arc<InactivitySweeper>,
    pub broadcaster: Arc<NotificationBroadcaster>,
    pub notifications: Arc<InMemoryNotificationStore>,
    pub metrics: Arc<PresenceMetrics>,
    default_inactive_minutes: u64,
    notification_seq: AtomicU64,
}

impl PresenceService {
    pub fn default_inactive_minutes(&self) -> u64 {
        self.default_inactive_minutes
    }

    /// Accept a notification through the control endpoint and fan it out.
    /// Stands in for the external notification write path.
    pub fn create_notification(
        &self,
        user_id: &str,
        kind: &str,
        data: serde_json::Value,
    ) -> Notification {
        let seq = self.notification_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let notification = Notification {
            id: format!("ntf-{seq}"),
            user_id: user_id.to_string(),
            kind: kind.to_string(),
            data,
            created_at: Utc::now(),
            read_at: None,
        };
        self.notifications.insert(notification.clone());
        self.broadcaster.publish(&StateChange::NotificationCreated {
            user_id: notification.user_id.clone(),
            notification_id: notification.id.clone(),
        });
        notification
    }
}

/// Builds a [`PresenceService`] around in-memory backends and the given
/// transport, returning the disconnect signal receiver for the reconciler.
pub fn build_service(
    config: &Config,
    transport: Arc<dyn BroadcastTransport>,
) -> (Arc<PresenceService>, mpsc::UnboundedReceiver<DisconnectSignal>) {
    let metrics = Arc::new(PresenceMetrics::default());
    let store: Arc<dyn PresenceStore> = Arc::new(InMemoryPresenceStore::new());
    let notifications = Arc::new(InMemoryNotificationStore::new());
    let notification_reads: Arc<dyn NotificationStore> = notifications.clone();
    let broadcaster = Arc::new(NotificationBroadcaster::new(
        notification_reads,
        transport,
        metrics.clone(),
    ));
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    let registry = Arc::new(ConnectionRegistry::new(
        store.clone(),
        signal_tx,
        metrics.clone(),
    ));
    let sweeper = Arc::new(InactivitySweeper::new(
        store.clone(),
        broadcaster.clone(),
        metrics.clone(),
    ));
    let service = Arc::new(PresenceService {
        store,
        registry,
        sweeper,
        broadcaster,
        notifications,
        metrics,
        default_inactive_minutes: config.presence.inactive_minutes,
        notification_seq: AtomicU64::new(0),
    });
    (service, signal_rx)
}

/// Unified runtime: reconciler loop, scheduled sweep loop, control endpoint,
/// and graceful shutdown.
pub struct Runtime<C: Clock> {
    config: Config,
    clock: C,
    service: Arc<PresenceService>,
    signal_rx: Option<mpsc::UnboundedReceiver<DisconnectSignal>>,
    reconciler: Arc<DisconnectReconciler<C>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    log_handle: Option<LogHandle>,
}

impl<C: Clock> Runtime<C> {
    pub fn new(config: Config, clock: C, log_handle: Option<LogHandle>) -> Result<Self> {
        config.validate()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (service, signal_rx) = build_service(&config, Arc::new(LoggingTransport));
        let reconciler = Arc::new(DisconnectReconciler::new(
            service.store.clone(),
            service.broadcaster.clone(),
            clock.clone(),
            &config.presence,
            service.metrics.clone(),
        ));
        Ok(Self {
            config,
            clock,
            service,
            signal_rx: Some(signal_rx),
            reconciler,
            shutdown_tx,
            shutdown_rx,
            log_handle,
        })
    }

    pub fn service(&self) -> Arc<PresenceService> {
        self.service.clone()
    }

    /// Start the runtime: reconciler drain, sweep loop, control endpoint,
    /// then wait for shutdown.
    pub async fn run(&mut self) -> Result<()> {
        let signal_rx = self
            .signal_rx
            .take()
            .context("runtime already started")?;
        tokio::spawn(self.reconciler.clone().run(signal_rx));
        self.start_sweep_loop();
        telemetry::start_http(
            &self.config.control.bind,
            self.service.clone(),
            self.log_handle.clone(),
        )
        .await?;
        self.handle_shutdown().await
    }

    fn start_sweep_loop(&self) {
        let sweeper = self.service.sweeper.clone();
        let inactive_minutes = self.config.presence.inactive_minutes;
        let period = Duration::from_secs(self.config.presence.sweep_interval_seconds);
        let mut shutdown = self.shutdown_rx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick fires immediately; skip it so startup stays quiet.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = sweeper.sweep(inactive_minutes) {
                            tracing::warn!(error = %err, "scheduled sweep failed; will retry next tick");
                        }
                    }
                    _ = shutdown.changed() => {
                        tracing::debug!("sweep loop stopping");
                        return;
                    }
                }
            }
        });
    }

    async fn handle_shutdown(&mut self) -> Result<()> {
        let _started_at = self.clock.now();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("shutdown signal received");
            }
            _ = self.shutdown_rx.changed() => {
                tracing::info!("shutdown requested by component");
            }
        }
        self.shutdown_tx
            .send(true)
            .context("failed to broadcast shutdown")?;
        Ok(())
    }

    #[doc(hidden)]
    pub fn shutdown_for_tests(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
