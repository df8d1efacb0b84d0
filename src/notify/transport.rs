//! Real-time transport seam for broadcast fan-out.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure inside the fan-out channel. Isolated to the broadcaster: logged,
/// never rolled back against the state change that triggered it.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("broadcast channel unavailable: {0}")]
    Unavailable(String),
}

/// Outbound event handed to the real-time transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastPayload {
    pub user_id: String,
    pub notification_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: serde_json::Value,
    /// Serialized as ISO-8601.
    pub created_at: DateTime<Utc>,
    /// Snapshot of the unread count at emission time.
    pub unread_count: u64,
}

pub trait BroadcastTransport: Send + Sync {
    fn deliver(&self, payload: &BroadcastPayload) -> Result<(), TransportError>;
}

/// Default transport for the standalone binary: structured log output.
#[derive(Default)]
pub struct LoggingTransport;

impl BroadcastTransport for LoggingTransport {
    fn deliver(&self, payload: &BroadcastPayload) -> Result<(), TransportError> {
        tracing::info!(
            user_id = %payload.user_id,
            notification_id = %payload.notification_id,
            kind = %payload.kind,
            unread_count = payload.unread_count,
            "broadcast delivered"
        );
        Ok(())
    }
}

/// Transport that records payloads in memory, for tests and embedders that
/// want to inspect fan-out.
#[derive(Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<BroadcastPayload>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<BroadcastPayload> {
        self.sent.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }
}

impl BroadcastTransport for MemoryTransport {
    fn deliver(&self, payload: &BroadcastPayload) -> Result<(), TransportError> {
        self.sent.lock().push(payload.clone());
        Ok(())
    }
}

/// Transport that always fails; exercises fire-and-forget isolation.
#[derive(Default)]
pub struct FailingTransport;

impl BroadcastTransport for FailingTransport {
    fn deliver(&self, _payload: &BroadcastPayload) -> Result<(), TransportError> {
        Err(TransportError::Unavailable("transport down".into()))
    }
}
