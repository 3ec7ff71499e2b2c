//! Shared test fixtures
//!
//! Builds an application state backed by the in-memory store and a
//! canned payment gateway, so tests run without Postgres or network.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use merenda::api::AppState;
use merenda::domain::{Money, Product, Wallet};
use merenda::gateway::{GatewayError, PaymentGateway, PixCharge};
use merenda::notifier::EventBus;
use merenda::store::MemoryStore;

/// Gateway double that mints sequential payment ids offline
pub struct FakeGateway {
    counter: AtomicU32,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            counter: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_pix_charge(
        &self,
        _customer_name: &str,
        _external_ref: Uuid,
        _amount: Money,
        _description: &str,
    ) -> Result<PixCharge, GatewayError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(PixCharge {
            payment_id: format!("pay_test_{n}"),
            qr_code: format!("00020126pixpayload{n}"),
        })
    }
}

pub fn test_state() -> (AppState, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState {
        store: store.clone(),
        events: EventBus::default(),
        gateway: Arc::new(FakeGateway::new()),
    };
    (state, store)
}

pub fn money(v: Decimal) -> Money {
    Money::new(v).unwrap()
}

pub fn seed_wallet(
    store: &MemoryStore,
    tenant_id: Uuid,
    owner_name: &str,
    balance: Decimal,
) -> Wallet {
    let wallet = Wallet {
        id: Uuid::new_v4(),
        tenant_id,
        owner_id: Uuid::new_v4(),
        owner_name: owner_name.to_string(),
        balance: money(balance),
        credit_limit: Money::zero(),
        daily_spending_limit: Money::zero(),
        blacklist: HashSet::new(),
        version: 1,
    };
    store.insert_wallet(wallet.clone());
    wallet
}

pub fn seed_product(
    store: &MemoryStore,
    tenant_id: Uuid,
    name: &str,
    price: Decimal,
    stock: u32,
) -> Product {
    let product = Product {
        id: Uuid::new_v4(),
        tenant_id,
        name: name.to_string(),
        price: money(price),
        stock,
        is_available: true,
        version: 1,
    };
    store.insert_product(product.clone());
    product
}
