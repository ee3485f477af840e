//! In-process realtime push hub.
//!
//! A broadcast channel fanning audit and chat inserts out to SSE
//! subscribers. Delivery is at-least-once from the consumer's point of
//! view: a lagged receiver drops the oldest entries and keeps going, and
//! consumers must tolerate duplicates after a reconnect.

use tokio::sync::broadcast;

use ridgeline_core::{AuditEventId, ChatRoomId};

use crate::models::{AuditEvent, Message};

/// Default channel capacity. Slow subscribers past this lag lose the
/// oldest pushes rather than applying backpressure to emitters.
const HUB_CAPACITY: usize = 256;

/// One push delivered to subscribers.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Push {
    /// A new audit event was appended.
    AuditInserted {
        /// The appended event.
        event: AuditEvent,
    },
    /// An audit event was resolved.
    AuditResolved {
        /// The resolved event's ID.
        id: AuditEventId,
    },
    /// The settings row changed.
    SettingsUpdated,
    /// A chat message was stored.
    MessageInserted {
        /// The stored (ciphertext) message.
        message: Message,
    },
}

impl Push {
    /// The room this push belongs to, for per-room SSE filtering.
    #[must_use]
    pub const fn room_id(&self) -> Option<ChatRoomId> {
        match self {
            Self::MessageInserted { message } => Some(message.room_id),
            _ => None,
        }
    }

    /// Whether this push belongs on the security console feed.
    #[must_use]
    pub const fn is_security(&self) -> bool {
        matches!(
            self,
            Self::AuditInserted { .. } | Self::AuditResolved { .. } | Self::SettingsUpdated
        )
    }
}

/// The shared push hub.
#[derive(Debug, Clone)]
pub struct EventHub {
    tx: broadcast::Sender<Push>,
}

impl EventHub {
    /// Create a hub with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(HUB_CAPACITY);
        Self { tx }
    }

    /// Publish a push. A hub with no subscribers drops it silently.
    pub fn publish(&self, push: Push) {
        let _ = self.tx.send(push);
    }

    /// Subscribe to all pushes from this point on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Push> {
        self.tx.subscribe()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe();

        hub.publish(Push::SettingsUpdated);

        let push = rx.recv().await.unwrap();
        assert!(matches!(push, Push::SettingsUpdated));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_does_not_panic() {
        let hub = EventHub::new();
        hub.publish(Push::SettingsUpdated);
    }

    #[test]
    fn test_push_classification() {
        let push = Push::SettingsUpdated;
        assert!(push.is_security());
        assert!(push.room_id().is_none());
    }
}
