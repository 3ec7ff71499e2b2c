//! Domain Events
//!
//! Events published to the notifier after a committed state change.
//! Delivery is best-effort and at-most-once; subscribers that connect
//! late do not see earlier events.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Order, OrderStatus};

/// Events fanned out to kitchen displays and dashboards
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OrderEvent {
    /// An order was settled and entered the kitchen queue
    OrderPlaced {
        order_id: Uuid,
        owner_display_name: String,
        item_names: Vec<String>,
        status: OrderStatus,
    },

    /// A kitchen transition actually moved an order forward
    OrderStatusChanged { order_id: Uuid, status: OrderStatus },
}

impl OrderEvent {
    pub fn placed(order: &Order) -> Self {
        OrderEvent::OrderPlaced {
            order_id: order.id,
            owner_display_name: order.owner_name.clone(),
            item_names: order.item_names(),
            status: order.status,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced { .. } => "OrderPlaced",
            OrderEvent::OrderStatusChanged { .. } => "OrderStatusChanged",
        }
    }

    pub fn order_id(&self) -> Uuid {
        match self {
            OrderEvent::OrderPlaced { order_id, .. } => *order_id,
            OrderEvent::OrderStatusChanged { order_id, .. } => *order_id,
        }
    }
}
