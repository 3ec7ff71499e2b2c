//! Storage ports
//!
//! Repository traits the engine and reconciler depend on, plus the two
//! atomic commit units. Any backend satisfying these contracts can sit
//! under the core; the crate ships a Postgres implementation and an
//! in-memory one used by tests and local runs.
//!
//! Concurrency discipline: wallets and products carry a version
//! counter. Reads return the version alongside the data, and
//! `commit_settlement` refuses to apply if any guarded row moved in
//! between. The engine retries the whole validate-then-commit unit on
//! `StoreError::VersionConflict`, emulating serializable isolation per
//! wallet and per product row.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    LedgerEntry, Money, Order, OrderStatus, PaymentIntent, Product, Wallet,
};

/// Errors raised by storage backends
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A guarded row was moved by a concurrent transaction
    #[error("Write conflict on {entity} {id}: concurrent modification detected")]
    VersionConflict { entity: &'static str, id: Uuid },

    /// Referenced row does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Stored data violates a domain invariant (corrupt row, bad enum tag)
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Conflicts are worth retrying with a fresh snapshot. Postgres
    /// deadlock aborts (SQLSTATE 40P01) roll the transaction back
    /// cleanly, so they retry the same way a version conflict does.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::VersionConflict { .. } => true,
            StoreError::Database(sqlx::Error::Database(e)) => {
                e.code().as_deref() == Some("40P01")
            }
            _ => false,
        }
    }
}

/// Stock mutation guarded by the product version seen at validation
#[derive(Debug, Clone)]
pub struct StockDecrement {
    pub product_id: Uuid,
    pub quantity: u32,
    pub expected_version: i64,
}

/// All effects of one order settlement. Either every effect commits or
/// none does; there is no observable partial state.
#[derive(Debug, Clone)]
pub struct SettlementCommit {
    /// Fully built order (id, lines, total, PENDING status)
    pub order: Order,
    pub wallet_id: Uuid,
    pub expected_wallet_version: i64,
    /// Amount to subtract from the wallet balance
    pub debit: Money,
    pub stock_decrements: Vec<StockDecrement>,
    /// The single DEBIT entry recording the settlement
    pub ledger_entry: LedgerEntry,
}

/// All effects of one reconciled gateway payment.
#[derive(Debug, Clone)]
pub struct RechargeCommit {
    /// Gateway payment reference of the intent to flip
    pub external_id: String,
    pub wallet_id: Uuid,
    /// Gateway-confirmed amount, never a client-supplied one
    pub amount: Money,
    /// The single CREDIT entry recording the recharge
    pub ledger_entry: LedgerEntry,
}

/// Sponsor governance update. `blacklist` adds (`true`) or removes
/// (`false`) one product from the owner's blacklist.
#[derive(Debug, Clone, Default)]
pub struct GovernanceChange {
    pub daily_spending_limit: Option<Money>,
    pub blacklist: Option<(Uuid, bool)>,
}

#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Wallet for a consumer; each owner has at most one wallet.
    async fn wallet_for_owner(&self, owner_id: Uuid) -> Result<Option<Wallet>, StoreError>;

    async fn wallet_by_id(&self, wallet_id: Uuid) -> Result<Option<Wallet>, StoreError>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Products of one tenant by id. Missing ids are simply absent from
    /// the result; the validator turns that into `UnknownProduct`.
    async fn products_by_ids(
        &self,
        tenant_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<Product>, StoreError>;

    async fn list_products(&self, tenant_id: Uuid) -> Result<Vec<Product>, StoreError>;

    /// Merchant catalog upsert. Bumps the version on replace.
    async fn upsert_product(&self, product: Product) -> Result<Product, StoreError>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Sum of DEBIT entries for a wallet at or after `since`. Source of
    /// truth for "spent today".
    async fn debits_since(
        &self,
        wallet_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Money, StoreError>;

    /// Most recent entries, newest first.
    async fn recent_entries(
        &self,
        wallet_id: Uuid,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, StoreError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Orders a kitchen still cares about (PENDING, PREPARING, READY),
    /// oldest first.
    async fn kitchen_queue(&self, tenant_id: Uuid) -> Result<Vec<Order>, StoreError>;

    /// Idempotent status transition: applies the request when it moves
    /// the order forward, otherwise leaves it untouched. Returns the
    /// resulting order and whether anything changed.
    async fn advance_order_status(
        &self,
        order_id: Uuid,
        requested: OrderStatus,
    ) -> Result<(Order, bool), StoreError>;
}

#[async_trait]
pub trait PaymentIntentStore: Send + Sync {
    async fn insert_intent(&self, intent: PaymentIntent) -> Result<(), StoreError>;

    async fn intent_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<PaymentIntent>, StoreError>;
}

/// The full storage contract the core runs against.
#[async_trait]
pub trait CoreStore:
    WalletStore + ProductStore + LedgerStore + OrderStore + PaymentIntentStore
{
    /// Apply all settlement effects in one atomic unit: decrement stock,
    /// debit the wallet, insert the order with its items and append one
    /// DEBIT ledger entry. Fails with `VersionConflict` when any guarded
    /// row moved since the validating read, with nothing applied.
    async fn commit_settlement(&self, commit: SettlementCommit) -> Result<Order, StoreError>;

    /// Atomically flip a PENDING intent to RECEIVED, credit the wallet
    /// and append one CREDIT ledger entry. Returns `false` without any
    /// mutation when the intent is no longer pending (duplicate
    /// delivery), making this the single exactly-once guard.
    async fn commit_recharge(&self, commit: RechargeCommit) -> Result<bool, StoreError>;

    /// Update governance fields on the owner's wallet in one
    /// version-bumping write, so a change applies fully before or fully
    /// after any given settlement.
    async fn apply_governance(
        &self,
        owner_id: Uuid,
        change: GovernanceChange,
    ) -> Result<Wallet, StoreError>;

    /// UTC offset used to resolve the tenant-local start of day for the
    /// daily spending cap. Unknown tenants default to UTC.
    async fn tenant_utc_offset_minutes(&self, tenant_id: Uuid) -> Result<i32, StoreError>;
}
