//! Event Notifier
//!
//! Process-wide publish/subscribe port for domain events. Delivery is
//! best-effort and at-most-once per connected subscriber: publishing
//! never blocks, never fails the caller, and keeps no history for
//! subscribers that connect later. A lagging subscriber drops events.

use tokio::sync::broadcast;

use crate::domain::OrderEvent;

const DEFAULT_CAPACITY: usize = 256;

/// Broadcast bus for order events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<OrderEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe from now on; events published before this call are not
    /// replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.tx.subscribe()
    }

    /// Fire-and-forget publish. A send error only means there are no
    /// subscribers right now, which is not a failure of the caller.
    pub fn publish(&self, event: OrderEvent) {
        let kind = event.event_type();
        let order_id = event.order_id();
        match self.tx.send(event) {
            Ok(receivers) => {
                tracing::debug!(%order_id, event = kind, receivers, "published order event");
            }
            Err(_) => {
                tracing::debug!(%order_id, event = kind, "no subscribers for order event");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
