//! Ledger Transaction Engine
//!
//! Settlement is the sole mutation boundary for wallet balances and
//! product stock. Each attempt reads a versioned snapshot, runs the
//! pure validator against it, and asks the store to commit all effects
//! guarded by those versions. A version conflict retries the whole
//! unit with a fresh snapshot, bounded: three attempts with linear
//! backoff, then a contention error the caller may retry.

use chrono::{DateTime, FixedOffset, LocalResult, NaiveTime, Offset, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{
    DomainError, LedgerEntry, Order, OrderEvent, OrderStatus, PaymentMethod, Product, Wallet,
};
use crate::notifier::EventBus;
use crate::store::{
    CoreStore, LedgerStore, OrderStore, ProductStore, SettlementCommit, StockDecrement,
    StoreError, WalletStore,
};
use crate::validation::{referenced_product_ids, validate_order, CartItem, ValidationOutcome};

const MAX_RETRIES: u32 = 3;

/// Failures surfaced by the engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Executes order settlements and kitchen status transitions.
pub struct SettlementEngine {
    store: Arc<dyn CoreStore>,
    events: EventBus,
}

impl SettlementEngine {
    pub fn new(store: Arc<dyn CoreStore>, events: EventBus) -> Self {
        Self { store, events }
    }

    /// Validate and commit an order as one atomic unit.
    ///
    /// On success the order exists, stock is decremented, the wallet is
    /// debited and one DEBIT ledger entry is appended; on any failure
    /// none of those effects are visible. The `OrderPlaced` event is
    /// published after the commit and cannot roll it back.
    pub async fn settle(
        &self,
        tenant_id: Uuid,
        owner_id: Uuid,
        items: &[CartItem],
    ) -> Result<Order, EngineError> {
        for attempt in 0..MAX_RETRIES {
            let (wallet, products, outcome) =
                self.validate_snapshot(tenant_id, owner_id, items).await?;
            let commit = build_commit(&wallet, &products, items, &outcome);

            match self.store.commit_settlement(commit).await {
                Ok(order) => {
                    self.events.publish(OrderEvent::placed(&order));
                    tracing::info!(
                        order_id = %order.id,
                        wallet_id = %wallet.id,
                        total = %order.total_price,
                        "order settled"
                    );
                    return Ok(order);
                }
                Err(e) if e.is_retryable() && attempt < MAX_RETRIES - 1 => {
                    tracing::warn!(
                        %owner_id,
                        "settlement write conflict, retrying (attempt {}/{})",
                        attempt + 1,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(Duration::from_millis(50 * (attempt as u64 + 1))).await;
                    continue;
                }
                Err(e) if e.is_retryable() => return Err(DomainError::Contention.into()),
                Err(e) => return Err(e.into()),
            }
        }

        Err(DomainError::Contention.into())
    }

    /// Dry-run: the same snapshot read and validation as `settle`,
    /// without committing anything.
    pub async fn preview(
        &self,
        tenant_id: Uuid,
        owner_id: Uuid,
        items: &[CartItem],
    ) -> Result<ValidationOutcome, EngineError> {
        let (_, _, outcome) = self.validate_snapshot(tenant_id, owner_id, items).await?;
        Ok(outcome)
    }

    /// Idempotent kitchen status transition. Requests at or behind the
    /// current status succeed without effect; forward transitions
    /// publish `OrderStatusChanged`.
    pub async fn advance_status(
        &self,
        order_id: Uuid,
        requested: OrderStatus,
    ) -> Result<Order, EngineError> {
        let (order, changed) = self.store.advance_order_status(order_id, requested).await?;

        if changed {
            self.events.publish(OrderEvent::OrderStatusChanged {
                order_id: order.id,
                status: order.status,
            });
            tracing::info!(%order_id, status = ?order.status, "order status advanced");
        }

        Ok(order)
    }

    async fn validate_snapshot(
        &self,
        tenant_id: Uuid,
        owner_id: Uuid,
        items: &[CartItem],
    ) -> Result<(Wallet, Vec<Product>, ValidationOutcome), EngineError> {
        let wallet = self
            .store
            .wallet_for_owner(owner_id)
            .await?
            .filter(|w| w.tenant_id == tenant_id)
            .ok_or(DomainError::WalletNotFound { owner_id })?;

        let product_ids = referenced_product_ids(items);
        let products = self.store.products_by_ids(tenant_id, &product_ids).await?;

        let offset_minutes = self.store.tenant_utc_offset_minutes(tenant_id).await?;
        let day_start = start_of_tenant_day(Utc::now(), offset_minutes);
        let spent_today = self.store.debits_since(wallet.id, day_start).await?;

        let outcome = validate_order(&wallet, &products, items, spent_today)?;
        Ok((wallet, products, outcome))
    }
}

fn build_commit(
    wallet: &Wallet,
    products: &[Product],
    items: &[CartItem],
    outcome: &ValidationOutcome,
) -> SettlementCommit {
    let order = Order {
        id: Uuid::new_v4(),
        tenant_id: wallet.tenant_id,
        wallet_id: wallet.id,
        owner_id: wallet.owner_id,
        owner_name: wallet.owner_name.clone(),
        items: outcome.lines.clone(),
        total_price: outcome.total,
        status: OrderStatus::Pending,
        created_at: Utc::now(),
    };

    // One decrement per product, quantities summed across cart lines,
    // guarded by the version seen during validation. Sorted by product
    // id so concurrent settlements lock product rows in the same order.
    let mut product_ids = referenced_product_ids(items);
    product_ids.sort_unstable();
    let stock_decrements = product_ids
        .into_iter()
        .map(|product_id| StockDecrement {
            product_id,
            quantity: items
                .iter()
                .filter(|i| i.product_id == product_id)
                .map(|i| i.quantity)
                .sum(),
            expected_version: products
                .iter()
                .find(|p| p.id == product_id)
                .map(|p| p.version)
                .unwrap_or(0),
        })
        .collect();

    let ledger_entry = LedgerEntry::debit(
        wallet.id,
        outcome.total,
        PaymentMethod::Wallet,
        format!("Order {}", order.id),
    );

    SettlementCommit {
        order,
        wallet_id: wallet.id,
        expected_wallet_version: wallet.version,
        debit: outcome.total,
        stock_decrements,
        ledger_entry,
    }
}

/// Start of the current day in the tenant's configured UTC offset,
/// expressed back in UTC. Drives the "spent today" window of the daily
/// spending cap.
pub fn start_of_tenant_day(now: DateTime<Utc>, offset_minutes: i32) -> DateTime<Utc> {
    let offset = FixedOffset::east_opt(offset_minutes * 60).unwrap_or_else(|| Utc.fix());
    let local = now.with_timezone(&offset);
    let midnight = local.date_naive().and_time(NaiveTime::MIN);
    match offset.from_local_datetime(&midnight) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        // Unreachable for a fixed offset, but never guess around time.
        _ => now,
    }
}
