//! Order model
//!
//! Orders are created exactly once by the settlement unit; the total is
//! immutable after creation and only the status advances afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Money;

/// Kitchen-side lifecycle of an order.
///
/// Statuses form a forward-only ladder. Transition requests at or
/// behind the current status are no-op successes so that kitchen
/// clients can retry freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Preparing,
    Ready,
    PickedUp,
}

impl OrderStatus {
    /// Position on the status ladder
    pub fn rank(&self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Preparing => 1,
            OrderStatus::Ready => 2,
            OrderStatus::PickedUp => 3,
        }
    }

    /// Apply an idempotent transition request. Returns the new status
    /// when the request moves the order forward, `None` when the order
    /// is already at or past the requested status (retry delivered
    /// late or twice).
    pub fn advance_to(&self, requested: OrderStatus) -> Option<OrderStatus> {
        (requested.rank() > self.rank()).then_some(requested)
    }
}

/// One order line. `line_total` is `unit_price * quantity`, computed in
/// exact fixed-point arithmetic during validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

/// A settled order against a wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub wallet_id: Uuid,
    pub owner_id: Uuid,
    /// Denormalized display name for the kitchen queue and events
    pub owner_name: String,
    pub items: Vec<OrderItem>,
    pub total_price: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn item_names(&self) -> Vec<String> {
        self.items.iter().map(|i| i.product_name.clone()).collect()
    }
}
