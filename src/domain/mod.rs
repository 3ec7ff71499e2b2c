//! Domain module
//!
//! Pure domain types and rules: money, wallets, products, orders,
//! ledger entries, payment intents and the error taxonomy. Nothing in
//! this module touches storage or the network.

mod error;
mod events;
mod money;
mod order;
mod wallet;

pub use error::DomainError;
pub use events::OrderEvent;
pub use money::{Money, MoneyError};
pub use order::{Order, OrderItem, OrderStatus};
pub use wallet::{
    LedgerEntry, LedgerEntryType, PaymentIntent, PaymentIntentStatus, PaymentMethod, Product,
    Wallet,
};
