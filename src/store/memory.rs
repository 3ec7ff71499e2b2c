//! In-memory store
//!
//! A mutex-guarded implementation of the storage ports. Every commit
//! unit runs under one lock acquisition, which trivially satisfies the
//! atomicity contract; version counters behave exactly like the
//! Postgres backend so the engine's retry path is exercised the same
//! way. Used by the test suites and local runs without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::domain::{
    LedgerEntry, LedgerEntryType, Money, Order, OrderStatus, PaymentIntent, PaymentIntentStatus,
    Product, Wallet,
};

use super::{
    CoreStore, GovernanceChange, LedgerStore, OrderStore, PaymentIntentStore, ProductStore,
    RechargeCommit, SettlementCommit, StoreError, WalletStore,
};

#[derive(Debug, Default)]
struct Tables {
    wallets: HashMap<Uuid, Wallet>,
    products: HashMap<Uuid, Product>,
    orders: HashMap<Uuid, Order>,
    ledger: Vec<LedgerEntry>,
    intents: HashMap<String, PaymentIntent>,
    tenant_offsets: HashMap<Uuid, i32>,
}

/// In-memory backend for tests and local runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // A poisoned lock only means another test thread panicked
        // mid-mutation; the tables themselves are still usable.
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed a wallet (consumer onboarding is outside the core).
    pub fn insert_wallet(&self, wallet: Wallet) {
        self.lock().wallets.insert(wallet.id, wallet);
    }

    /// Seed a product directly, keeping its version.
    pub fn insert_product(&self, product: Product) {
        self.lock().products.insert(product.id, product);
    }

    /// Configure a tenant's UTC offset for daily-limit day boundaries.
    pub fn set_tenant_offset(&self, tenant_id: Uuid, offset_minutes: i32) {
        self.lock().tenant_offsets.insert(tenant_id, offset_minutes);
    }
}

#[async_trait]
impl WalletStore for MemoryStore {
    async fn wallet_for_owner(&self, owner_id: Uuid) -> Result<Option<Wallet>, StoreError> {
        let tables = self.lock();
        Ok(tables
            .wallets
            .values()
            .find(|w| w.owner_id == owner_id)
            .cloned())
    }

    async fn wallet_by_id(&self, wallet_id: Uuid) -> Result<Option<Wallet>, StoreError> {
        Ok(self.lock().wallets.get(&wallet_id).cloned())
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn products_by_ids(
        &self,
        tenant_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<Product>, StoreError> {
        let tables = self.lock();
        Ok(ids
            .iter()
            .filter_map(|id| tables.products.get(id))
            .filter(|p| p.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn list_products(&self, tenant_id: Uuid) -> Result<Vec<Product>, StoreError> {
        let tables = self.lock();
        let mut products: Vec<Product> = tables
            .products
            .values()
            .filter(|p| p.tenant_id == tenant_id)
            .cloned()
            .collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn upsert_product(&self, mut product: Product) -> Result<Product, StoreError> {
        let mut tables = self.lock();
        product.version = match tables.products.get(&product.id) {
            Some(existing) => existing.version + 1,
            None => 1,
        };
        tables.products.insert(product.id, product.clone());
        Ok(product)
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn debits_since(
        &self,
        wallet_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Money, StoreError> {
        let tables = self.lock();
        let mut sum = Money::zero();
        for entry in tables
            .ledger
            .iter()
            .filter(|e| {
                e.wallet_id == wallet_id
                    && e.entry_type == LedgerEntryType::Debit
                    && e.created_at >= since
            })
        {
            sum = sum
                .checked_add(entry.amount)
                .map_err(|e| StoreError::Invariant(e.to_string()))?;
        }
        Ok(sum)
    }

    async fn recent_entries(
        &self,
        wallet_id: Uuid,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let tables = self.lock();
        let mut entries: Vec<LedgerEntry> = tables
            .ledger
            .iter()
            .filter(|e| e.wallet_id == wallet_id)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.lock().orders.get(&order_id).cloned())
    }

    async fn kitchen_queue(&self, tenant_id: Uuid) -> Result<Vec<Order>, StoreError> {
        let tables = self.lock();
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| {
                o.tenant_id == tenant_id
                    && matches!(
                        o.status,
                        OrderStatus::Pending | OrderStatus::Preparing | OrderStatus::Ready
                    )
            })
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }

    async fn advance_order_status(
        &self,
        order_id: Uuid,
        requested: OrderStatus,
    ) -> Result<(Order, bool), StoreError> {
        let mut tables = self.lock();
        let order = tables
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::not_found("order", order_id))?;

        match order.status.advance_to(requested) {
            Some(next) => {
                order.status = next;
                Ok((order.clone(), true))
            }
            None => Ok((order.clone(), false)),
        }
    }
}

#[async_trait]
impl PaymentIntentStore for MemoryStore {
    async fn insert_intent(&self, intent: PaymentIntent) -> Result<(), StoreError> {
        self.lock()
            .intents
            .insert(intent.external_id.clone(), intent);
        Ok(())
    }

    async fn intent_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<PaymentIntent>, StoreError> {
        Ok(self.lock().intents.get(external_id).cloned())
    }
}

#[async_trait]
impl CoreStore for MemoryStore {
    async fn commit_settlement(&self, commit: SettlementCommit) -> Result<Order, StoreError> {
        let mut tables = self.lock();

        // Verify every guard before touching anything, so a conflict
        // leaves no partial state behind.
        let wallet = tables
            .wallets
            .get(&commit.wallet_id)
            .ok_or_else(|| StoreError::not_found("wallet", commit.wallet_id))?;
        if wallet.version != commit.expected_wallet_version {
            return Err(StoreError::VersionConflict {
                entity: "wallet",
                id: commit.wallet_id,
            });
        }

        for dec in &commit.stock_decrements {
            let product = tables
                .products
                .get(&dec.product_id)
                .ok_or_else(|| StoreError::not_found("product", dec.product_id))?;
            if product.version != dec.expected_version || product.stock < dec.quantity {
                return Err(StoreError::VersionConflict {
                    entity: "product",
                    id: dec.product_id,
                });
            }
        }

        let new_balance = wallet
            .balance
            .checked_sub(commit.debit)
            .map_err(|e| StoreError::Invariant(e.to_string()))?;

        let wallet = tables
            .wallets
            .get_mut(&commit.wallet_id)
            .ok_or_else(|| StoreError::not_found("wallet", commit.wallet_id))?;
        wallet.balance = new_balance;
        wallet.version += 1;

        for dec in &commit.stock_decrements {
            if let Some(product) = tables.products.get_mut(&dec.product_id) {
                product.stock -= dec.quantity;
                product.version += 1;
            }
        }

        tables.ledger.push(commit.ledger_entry);
        tables.orders.insert(commit.order.id, commit.order.clone());

        Ok(commit.order)
    }

    async fn commit_recharge(&self, commit: RechargeCommit) -> Result<bool, StoreError> {
        let mut tables = self.lock();

        let intent = match tables.intents.get_mut(&commit.external_id) {
            Some(intent) => intent,
            None => return Ok(false),
        };
        if intent.status != PaymentIntentStatus::Pending {
            return Ok(false);
        }
        intent.status = PaymentIntentStatus::Received;

        let wallet = tables
            .wallets
            .get_mut(&commit.wallet_id)
            .ok_or_else(|| StoreError::not_found("wallet", commit.wallet_id))?;
        wallet.balance = wallet
            .balance
            .checked_add(commit.amount)
            .map_err(|e| StoreError::Invariant(e.to_string()))?;
        wallet.version += 1;

        tables.ledger.push(commit.ledger_entry);

        Ok(true)
    }

    async fn apply_governance(
        &self,
        owner_id: Uuid,
        change: GovernanceChange,
    ) -> Result<Wallet, StoreError> {
        let mut tables = self.lock();
        let wallet = tables
            .wallets
            .values_mut()
            .find(|w| w.owner_id == owner_id)
            .ok_or_else(|| StoreError::not_found("wallet", owner_id))?;

        if let Some(limit) = change.daily_spending_limit {
            wallet.daily_spending_limit = limit;
        }
        if let Some((product_id, blocked)) = change.blacklist {
            if blocked {
                wallet.blacklist.insert(product_id);
            } else {
                wallet.blacklist.remove(&product_id);
            }
        }
        wallet.version += 1;

        Ok(wallet.clone())
    }

    async fn tenant_utc_offset_minutes(&self, tenant_id: Uuid) -> Result<i32, StoreError> {
        Ok(self
            .lock()
            .tenant_offsets
            .get(&tenant_id)
            .copied()
            .unwrap_or(0))
    }
}
