//! Postgres store
//!
//! sqlx-backed implementation of the storage ports. Mutation units run
//! inside a single transaction; version-guarded UPDATEs provide the
//! optimistic concurrency the engine's retry loop expects. Schema lives
//! in `migrations/0001_init.sql`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashSet;
use uuid::Uuid;

use crate::domain::{
    LedgerEntry, LedgerEntryType, Money, Order, OrderItem, OrderStatus, PaymentIntent,
    PaymentIntentStatus, PaymentMethod, Product, Wallet,
};

use super::{
    CoreStore, GovernanceChange, LedgerStore, OrderStore, PaymentIntentStore, ProductStore,
    RechargeCommit, SettlementCommit, StoreError, WalletStore,
};

/// Postgres-backed store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_order_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
    ) -> Result<Option<Order>, StoreError> {
        let row: Option<(Uuid, Uuid, Uuid, Uuid, String, Decimal, String, DateTime<Utc>)> =
            sqlx::query_as(
                r#"
                SELECT id, tenant_id, wallet_id, owner_id, owner_name, total_price, status, created_at
                FROM orders
                WHERE id = $1
                "#,
            )
            .bind(order_id)
            .fetch_optional(&mut **tx)
            .await?;

        let Some((id, tenant_id, wallet_id, owner_id, owner_name, total, status, created_at)) = row
        else {
            return Ok(None);
        };

        let items: Vec<(Uuid, String, i32, Decimal, Decimal)> = sqlx::query_as(
            r#"
            SELECT product_id, product_name, quantity, unit_price, line_total
            FROM order_items
            WHERE order_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut **tx)
        .await?;

        Ok(Some(Order {
            id,
            tenant_id,
            wallet_id,
            owner_id,
            owner_name,
            items: items
                .into_iter()
                .map(|(product_id, product_name, quantity, unit_price, line_total)| {
                    Ok(OrderItem {
                        product_id,
                        product_name,
                        quantity: quantity.max(0) as u32,
                        unit_price: money(unit_price)?,
                        line_total: money(line_total)?,
                    })
                })
                .collect::<Result<Vec<_>, StoreError>>()?,
            total_price: money(total)?,
            status: parse_order_status(&status)?,
            created_at,
        }))
    }

    async fn insert_ledger_entry_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        entry: &LedgerEntry,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, wallet_id, amount, entry_type, method, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(entry.wallet_id)
        .bind(entry.amount.value())
        .bind(ledger_type_str(entry.entry_type))
        .bind(method_str(entry.method))
        .bind(&entry.description)
        .bind(entry.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl WalletStore for PgStore {
    async fn wallet_for_owner(&self, owner_id: Uuid) -> Result<Option<Wallet>, StoreError> {
        let row: Option<WalletRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, owner_id, owner_name, balance, credit_limit,
                   daily_spending_limit, blacklist, version
            FROM wallets
            WHERE owner_id = $1
            "#,
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(wallet_from_row).transpose()
    }

    async fn wallet_by_id(&self, wallet_id: Uuid) -> Result<Option<Wallet>, StoreError> {
        let row: Option<WalletRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, owner_id, owner_name, balance, credit_limit,
                   daily_spending_limit, blacklist, version
            FROM wallets
            WHERE id = $1
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(wallet_from_row).transpose()
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn products_by_ids(
        &self,
        tenant_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<Product>, StoreError> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, name, price, stock, is_available, version
            FROM products
            WHERE tenant_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(tenant_id)
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(product_from_row).collect()
    }

    async fn list_products(&self, tenant_id: Uuid) -> Result<Vec<Product>, StoreError> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, name, price, stock, is_available, version
            FROM products
            WHERE tenant_id = $1
            ORDER BY name ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(product_from_row).collect()
    }

    async fn upsert_product(&self, product: Product) -> Result<Product, StoreError> {
        let row: ProductRow = sqlx::query_as(
            r#"
            INSERT INTO products (id, tenant_id, name, price, stock, is_available, version)
            VALUES ($1, $2, $3, $4, $5, $6, 1)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                price = EXCLUDED.price,
                stock = EXCLUDED.stock,
                is_available = EXCLUDED.is_available,
                version = products.version + 1
            RETURNING id, tenant_id, name, price, stock, is_available, version
            "#,
        )
        .bind(product.id)
        .bind(product.tenant_id)
        .bind(&product.name)
        .bind(product.price.value())
        .bind(product.stock as i32)
        .bind(product.is_available)
        .fetch_one(&self.pool)
        .await?;

        product_from_row(row)
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn debits_since(
        &self,
        wallet_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Money, StoreError> {
        let sum: Decimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount), 0)
            FROM ledger_entries
            WHERE wallet_id = $1 AND entry_type = 'DEBIT' AND created_at >= $2
            "#,
        )
        .bind(wallet_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        money(sum.round_dp(2))
    }

    async fn recent_entries(
        &self,
        wallet_id: Uuid,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows: Vec<(Uuid, Uuid, Decimal, String, String, String, DateTime<Utc>)> =
            sqlx::query_as(
                r#"
                SELECT id, wallet_id, amount, entry_type, method, description, created_at
                FROM ledger_entries
                WHERE wallet_id = $1
                ORDER BY created_at DESC
                LIMIT $2
                "#,
            )
            .bind(wallet_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|(id, wallet_id, amount, entry_type, method, description, created_at)| {
                Ok(LedgerEntry {
                    id,
                    wallet_id,
                    amount: money(amount)?,
                    entry_type: parse_ledger_type(&entry_type)?,
                    method: parse_method(&method)?,
                    description,
                    created_at,
                })
            })
            .collect()
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn order(&self, order_id: Uuid) -> Result<Option<Order>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let order = self.load_order_tx(&mut tx, order_id).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn kitchen_queue(&self, tenant_id: Uuid) -> Result<Vec<Order>, StoreError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id
            FROM orders
            WHERE tenant_id = $1 AND status IN ('PENDING', 'PREPARING', 'READY')
            ORDER BY created_at ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        let mut tx = self.pool.begin().await?;
        let mut orders = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(order) = self.load_order_tx(&mut tx, id).await? {
                orders.push(order);
            }
        }
        tx.commit().await?;
        Ok(orders)
    }

    async fn advance_order_status(
        &self,
        order_id: Uuid,
        requested: OrderStatus,
    ) -> Result<(Order, bool), StoreError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(order_id)
                .fetch_optional(&mut *tx)
                .await?;

        let current =
            parse_order_status(&current.ok_or_else(|| StoreError::not_found("order", order_id))?)?;

        let changed = match current.advance_to(requested) {
            Some(next) => {
                sqlx::query("UPDATE orders SET status = $1 WHERE id = $2")
                    .bind(order_status_str(next))
                    .bind(order_id)
                    .execute(&mut *tx)
                    .await?;
                true
            }
            None => false,
        };

        let order = self
            .load_order_tx(&mut tx, order_id)
            .await?
            .ok_or_else(|| StoreError::not_found("order", order_id))?;

        tx.commit().await?;
        Ok((order, changed))
    }
}

#[async_trait]
impl PaymentIntentStore for PgStore {
    async fn insert_intent(&self, intent: PaymentIntent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO payment_intents (id, external_id, wallet_id, amount, qr_code, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(intent.id)
        .bind(&intent.external_id)
        .bind(intent.wallet_id)
        .bind(intent.amount.value())
        .bind(&intent.qr_code)
        .bind(intent_status_str(intent.status))
        .bind(intent.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn intent_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<PaymentIntent>, StoreError> {
        let row: Option<(Uuid, String, Uuid, Decimal, Option<String>, String, DateTime<Utc>)> =
            sqlx::query_as(
                r#"
                SELECT id, external_id, wallet_id, amount, qr_code, status, created_at
                FROM payment_intents
                WHERE external_id = $1
                "#,
            )
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(id, external_id, wallet_id, amount, qr_code, status, created_at)| {
            Ok(PaymentIntent {
                id,
                external_id,
                wallet_id,
                amount: money(amount)?,
                qr_code,
                status: parse_intent_status(&status)?,
                created_at,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl CoreStore for PgStore {
    async fn commit_settlement(&self, commit: SettlementCommit) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Version-guarded debit: zero rows hit means a concurrent writer
        // moved the wallet and the whole unit must be retried.
        let rows = sqlx::query(
            r#"
            UPDATE wallets
            SET balance = balance - $1, version = version + 1
            WHERE id = $2 AND version = $3
            "#,
        )
        .bind(commit.debit.value())
        .bind(commit.wallet_id)
        .bind(commit.expected_wallet_version)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(StoreError::VersionConflict {
                entity: "wallet",
                id: commit.wallet_id,
            });
        }

        for dec in &commit.stock_decrements {
            // The stock >= quantity predicate keeps the invariant even
            // if the version somehow matched a replayed counter.
            let rows = sqlx::query(
                r#"
                UPDATE products
                SET stock = stock - $1, version = version + 1
                WHERE id = $2 AND version = $3 AND stock >= $1
                "#,
            )
            .bind(dec.quantity as i32)
            .bind(dec.product_id)
            .bind(dec.expected_version)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if rows == 0 {
                return Err(StoreError::VersionConflict {
                    entity: "product",
                    id: dec.product_id,
                });
            }
        }

        let order = &commit.order;
        sqlx::query(
            r#"
            INSERT INTO orders (id, tenant_id, wallet_id, owner_id, owner_name, total_price, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id)
        .bind(order.tenant_id)
        .bind(order.wallet_id)
        .bind(order.owner_id)
        .bind(&order.owner_name)
        .bind(order.total_price.value())
        .bind(order_status_str(order.status))
        .bind(order.created_at)
        .execute(&mut *tx)
        .await?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, position, product_id, product_name, quantity, unit_price, line_total)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(order.id)
            .bind(position as i32)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.quantity as i32)
            .bind(item.unit_price.value())
            .bind(item.line_total.value())
            .execute(&mut *tx)
            .await?;
        }

        self.insert_ledger_entry_tx(&mut tx, &commit.ledger_entry)
            .await?;

        tx.commit().await?;
        Ok(commit.order)
    }

    async fn commit_recharge(&self, commit: RechargeCommit) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        // The status predicate is the exactly-once guard: a concurrent
        // delivery that lost the race hits zero rows and mutates nothing.
        let rows = sqlx::query(
            r#"
            UPDATE payment_intents
            SET status = 'RECEIVED'
            WHERE external_id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(&commit.external_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows == 0 {
            return Ok(false);
        }

        let rows = sqlx::query(
            r#"
            UPDATE wallets
            SET balance = balance + $1, version = version + 1
            WHERE id = $2
            "#,
        )
        .bind(commit.amount.value())
        .bind(commit.wallet_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(StoreError::not_found("wallet", commit.wallet_id));
        }

        self.insert_ledger_entry_tx(&mut tx, &commit.ledger_entry)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn apply_governance(
        &self,
        owner_id: Uuid,
        change: GovernanceChange,
    ) -> Result<Wallet, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(Uuid, Vec<Uuid>)> =
            sqlx::query_as("SELECT id, blacklist FROM wallets WHERE owner_id = $1 FOR UPDATE")
                .bind(owner_id)
                .fetch_optional(&mut *tx)
                .await?;

        let (wallet_id, blacklist) =
            row.ok_or_else(|| StoreError::not_found("wallet", owner_id))?;

        let mut blacklist: HashSet<Uuid> = blacklist.into_iter().collect();
        if let Some((product_id, blocked)) = change.blacklist {
            if blocked {
                blacklist.insert(product_id);
            } else {
                blacklist.remove(&product_id);
            }
        }
        let blacklist: Vec<Uuid> = blacklist.into_iter().collect();

        match change.daily_spending_limit {
            Some(limit) => {
                sqlx::query(
                    r#"
                    UPDATE wallets
                    SET daily_spending_limit = $1, blacklist = $2, version = version + 1
                    WHERE id = $3
                    "#,
                )
                .bind(limit.value())
                .bind(&blacklist)
                .bind(wallet_id)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE wallets
                    SET blacklist = $1, version = version + 1
                    WHERE id = $2
                    "#,
                )
                .bind(&blacklist)
                .bind(wallet_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        let row: WalletRow = sqlx::query_as(
            r#"
            SELECT id, tenant_id, owner_id, owner_name, balance, credit_limit,
                   daily_spending_limit, blacklist, version
            FROM wallets
            WHERE id = $1
            "#,
        )
        .bind(wallet_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        wallet_from_row(row)
    }

    async fn tenant_utc_offset_minutes(&self, tenant_id: Uuid) -> Result<i32, StoreError> {
        let offset: Option<i32> =
            sqlx::query_scalar("SELECT utc_offset_minutes FROM tenants WHERE id = $1")
                .bind(tenant_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(offset.unwrap_or(0))
    }
}

// =========================================================================
// Row mapping
// =========================================================================

type WalletRow = (
    Uuid,
    Uuid,
    Uuid,
    String,
    Decimal,
    Decimal,
    Decimal,
    Vec<Uuid>,
    i64,
);

type ProductRow = (Uuid, Uuid, String, Decimal, i32, bool, i64);

fn wallet_from_row(row: WalletRow) -> Result<Wallet, StoreError> {
    let (id, tenant_id, owner_id, owner_name, balance, credit_limit, daily_limit, blacklist, version) =
        row;
    Ok(Wallet {
        id,
        tenant_id,
        owner_id,
        owner_name,
        balance: money(balance)?,
        credit_limit: money(credit_limit)?,
        daily_spending_limit: money(daily_limit)?,
        blacklist: blacklist.into_iter().collect(),
        version,
    })
}

fn product_from_row(row: ProductRow) -> Result<Product, StoreError> {
    let (id, tenant_id, name, price, stock, is_available, version) = row;
    Ok(Product {
        id,
        tenant_id,
        name,
        price: money(price)?,
        stock: stock.max(0) as u32,
        is_available,
        version,
    })
}

fn money(value: Decimal) -> Result<Money, StoreError> {
    Money::new(value.normalize().round_dp(2)).map_err(|e| StoreError::Invariant(e.to_string()))
}

fn order_status_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "PENDING",
        OrderStatus::Preparing => "PREPARING",
        OrderStatus::Ready => "READY",
        OrderStatus::PickedUp => "PICKED_UP",
    }
}

fn parse_order_status(s: &str) -> Result<OrderStatus, StoreError> {
    match s {
        "PENDING" => Ok(OrderStatus::Pending),
        "PREPARING" => Ok(OrderStatus::Preparing),
        "READY" => Ok(OrderStatus::Ready),
        "PICKED_UP" => Ok(OrderStatus::PickedUp),
        other => Err(StoreError::Invariant(format!("bad order status: {other}"))),
    }
}

fn ledger_type_str(entry_type: LedgerEntryType) -> &'static str {
    match entry_type {
        LedgerEntryType::Debit => "DEBIT",
        LedgerEntryType::Credit => "CREDIT",
    }
}

fn parse_ledger_type(s: &str) -> Result<LedgerEntryType, StoreError> {
    match s {
        "DEBIT" => Ok(LedgerEntryType::Debit),
        "CREDIT" => Ok(LedgerEntryType::Credit),
        other => Err(StoreError::Invariant(format!("bad ledger type: {other}"))),
    }
}

fn method_str(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Wallet => "WALLET",
        PaymentMethod::Pix => "PIX",
    }
}

fn parse_method(s: &str) -> Result<PaymentMethod, StoreError> {
    match s {
        "WALLET" => Ok(PaymentMethod::Wallet),
        "PIX" => Ok(PaymentMethod::Pix),
        other => Err(StoreError::Invariant(format!("bad payment method: {other}"))),
    }
}

fn intent_status_str(status: PaymentIntentStatus) -> &'static str {
    match status {
        PaymentIntentStatus::Pending => "PENDING",
        PaymentIntentStatus::Received => "RECEIVED",
    }
}

fn parse_intent_status(s: &str) -> Result<PaymentIntentStatus, StoreError> {
    match s {
        "PENDING" => Ok(PaymentIntentStatus::Pending),
        "RECEIVED" => Ok(PaymentIntentStatus::Received),
        other => Err(StoreError::Invariant(format!("bad intent status: {other}"))),
    }
}
