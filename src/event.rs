//! Gate event system.

use tokio::sync::broadcast;

/// Events emitted by the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateEvent {
    /// Content sealed and stored.
    ContentPublished {
        /// Content id.
        content_id: String,
    },

    /// A paid signature unlocked content.
    ContentUnlocked {
        /// Content id.
        content_id: String,
    },

    /// An unlock attempt failed.
    UnlockRejected {
        /// Content id.
        content_id: String,
        /// Audit reason, e.g. `amount_too_low` or `replay_detected`.
        reason: String,
    },

    /// A preview was served.
    PreviewServed {
        /// Content id.
        content_id: String,
    },

    /// Old audit entries and redemption details were pruned.
    AuditPruned {
        /// Audit entries removed.
        audit_entries: usize,
        /// Redemption records removed.
        redemptions: usize,
    },
}

/// Channel for receiving gate events.
pub type GateEventsChannel = broadcast::Receiver<GateEvent>;

/// Sender for gate events.
pub type GateEventsSender = broadcast::Sender<GateEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (GateEventsSender, GateEventsChannel) {
    broadcast::channel(256)
}
