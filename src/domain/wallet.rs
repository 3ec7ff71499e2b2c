//! Wallet, product and ledger model
//!
//! Core persisted entities. Wallets and products carry a `version`
//! counter for optimistic concurrency: every committed mutation bumps
//! it, and the settlement unit aborts when a guarded row moved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use super::Money;

/// Prepaid balance account for one consumer.
///
/// Governance fields (daily limit, blacklist) are stored on the wallet
/// row so a settlement reads them in the same consistent snapshot as
/// the balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub owner_id: Uuid,
    /// Display identity carried into order events
    pub owner_name: String,
    /// May be negative, never below `-credit_limit` at a committed state
    pub balance: Money,
    /// Always >= 0
    pub credit_limit: Money,
    /// Zero means unlimited
    pub daily_spending_limit: Money,
    /// Products this owner may not purchase
    pub blacklist: HashSet<Uuid>,
    pub version: i64,
}

impl Wallet {
    /// Balance plus credit line: the funds an order may draw on.
    pub fn available_funds(&self) -> Money {
        self.balance
            .checked_add(self.credit_limit)
            .unwrap_or(self.balance)
    }
}

/// Catalog item sold by a tenant. Stock is mutated only by the
/// settlement unit and never clamped: an order that would drive it
/// negative aborts instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    /// Always > 0
    pub price: Money,
    pub stock: u32,
    pub is_available: bool,
    pub version: i64,
}

/// Direction of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEntryType {
    Debit,
    Credit,
}

/// Payment instrument that produced a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Wallet,
    Pix,
}

/// Immutable record of a single debit or credit against a wallet.
/// Append-only: entries are never updated or deleted, and the sum of
/// credits minus debits always equals the wallet balance minus its
/// initial balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub wallet_id: Uuid,
    /// Positive magnitude; direction comes from `entry_type`
    pub amount: Money,
    pub entry_type: LedgerEntryType,
    pub method: PaymentMethod,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn debit(wallet_id: Uuid, amount: Money, method: PaymentMethod, description: String) -> Self {
        Self::new(wallet_id, amount, LedgerEntryType::Debit, method, description)
    }

    pub fn credit(wallet_id: Uuid, amount: Money, method: PaymentMethod, description: String) -> Self {
        Self::new(wallet_id, amount, LedgerEntryType::Credit, method, description)
    }

    fn new(
        wallet_id: Uuid,
        amount: Money,
        entry_type: LedgerEntryType,
        method: PaymentMethod,
        description: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            wallet_id,
            amount,
            entry_type,
            method,
            description,
            created_at: Utc::now(),
        }
    }
}

/// Lifecycle of a recharge registered with the payment gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentIntentStatus {
    Pending,
    Received,
}

/// A recharge initiated against the external gateway, keyed by the
/// gateway's payment reference. Transitions PENDING -> RECEIVED exactly
/// once, driven by the reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: Uuid,
    /// Gateway payment reference, the idempotency key for reconciliation
    pub external_id: String,
    pub wallet_id: Uuid,
    pub amount: Money,
    /// PIX copy-and-paste payload shown to the payer
    pub qr_code: Option<String>,
    pub status: PaymentIntentStatus,
    pub created_at: DateTime<Utc>,
}

impl PaymentIntent {
    pub fn pending(external_id: String, wallet_id: Uuid, amount: Money, qr_code: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_id,
            wallet_id,
            amount,
            qr_code,
            status: PaymentIntentStatus::Pending,
            created_at: Utc::now(),
        }
    }
}
