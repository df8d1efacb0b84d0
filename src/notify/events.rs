use crate::presence::record::PresenceStatus;
use serde::{Deserialize, Serialize};

/// Typed state-change events.
///
/// Delivered synchronously by the component that produced the state change;
/// transport fan-out happens afterward and independently, so a transport
/// failure can never roll back the change that triggered it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StateChange {
    /// A presence record flipped status (this core only emits offline flips;
    /// online flips are implicit in attach traffic).
    PresenceChanged {
        room_id: String,
        user_id: String,
        status: PresenceStatus,
    },
    /// A notification was created for a user by the external write path.
    NotificationCreated {
        user_id: String,
        notification_id: String,
    },
}

impl StateChange {
    /// The subject user of the event.
    pub fn user_id(&self) -> &str {
        match self {
            StateChange::PresenceChanged { user_id, .. }
            | StateChange::NotificationCreated { user_id, .. } => user_id,
        }
    }
}
