//! Domain Error Types
//!
//! Business rule violations and domain invariant failures, independent
//! of the web and storage layers.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Domain-level failures surfaced by validation, settlement and
/// reconciliation. Each variant maps to exactly one rejection reason,
/// replacing "throw a string, catch by message".
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Order carried no line items
    #[error("Order must contain at least one item")]
    EmptyCart,

    /// Line item quantity was zero or negative
    #[error("Invalid quantity for product {product_id}")]
    InvalidQuantity { product_id: Uuid },

    /// Product does not exist or belongs to another tenant
    #[error("Unknown product: {0}")]
    UnknownProduct(Uuid),

    /// Product exists but is not for sale
    #[error("Product is unavailable: {0}")]
    ProductUnavailable(Uuid),

    /// Product is blacklisted for this wallet owner
    #[error("Product is blacklisted for this consumer: {0}")]
    BlacklistedProduct(Uuid),

    /// Ordered quantity exceeds remaining stock
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: u32,
        available: u32,
    },

    /// Balance plus credit line does not cover the order total
    #[error("Insufficient wallet balance/credit: required {required}, available {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    /// Order would push today's debits past the daily spending limit
    #[error("Daily spending limit exceeded: limit {limit}, spent today {spent_today}, attempted {attempted}")]
    DailyLimitExceeded {
        limit: Decimal,
        spent_today: Decimal,
        attempted: Decimal,
    },

    /// Consumer has no wallet for this tenant
    #[error("Wallet not found for consumer {owner_id}")]
    WalletNotFound { owner_id: Uuid },

    /// Gateway notification references no registered payment intent
    #[error("Unknown payment: {0}")]
    UnknownPayment(String),

    /// Concurrent settlements kept conflicting through every retry
    #[error("Settlement aborted after repeated write conflicts, retry the order")]
    Contention,

    /// Malformed monetary value in a request
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

impl DomainError {
    /// Input-shape problems: the request itself is malformed.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyCart | Self::InvalidQuantity { .. } | Self::InvalidAmount(_)
        )
    }

    /// Business rule rejections: well-formed request, rule says no.
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            Self::UnknownProduct(_)
                | Self::ProductUnavailable(_)
                | Self::BlacklistedProduct(_)
                | Self::InsufficientStock { .. }
                | Self::InsufficientFunds { .. }
                | Self::DailyLimitExceeded { .. }
        )
    }

    /// Transient failures the caller may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Contention)
    }
}
