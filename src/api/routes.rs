//! API Routes
//!
//! HTTP endpoint definitions.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    middleware,
    routing::{get, patch, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    LedgerEntryType, Money, Order, OrderStatus, PaymentIntent, PaymentMethod, Product, Wallet,
};
use crate::engine::{start_of_tenant_day, SettlementEngine};
use crate::error::AppError;
use crate::gateway::PaymentGateway;
use crate::notifier::EventBus;
use crate::reconcile::PaymentReconciler;
use crate::store::{
    CoreStore, GovernanceChange, LedgerStore, OrderStore, PaymentIntentStore, ProductStore,
    WalletStore,
};
use crate::validation::CartItem;

use super::middleware::{identity_middleware, Identity, Role};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CoreStore>,
    pub events: EventBus,
    pub gateway: Arc<dyn PaymentGateway>,
}

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    /// Consumer the terminal is ordering for
    pub consumer_id: Uuid,
    pub items: Vec<CartItem>,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub status: OrderStatus,
    pub total_price: Money,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            status: order.status,
            total_price: order.total_price,
            created_at: order.created_at,
            items: order
                .items
                .into_iter()
                .map(|item| OrderItemResponse {
                    product_id: item.product_id,
                    product_name: item.product_name,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    line_total: item.line_total,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ValidateOrderResponse {
    pub valid: bool,
    pub total_price: Money,
    pub items: Vec<OrderItemResponse>,
}

#[derive(Debug, Deserialize)]
pub struct ProductRequest {
    pub name: String,
    /// Unit price as a decimal string
    pub price: String,
    pub stock: u32,
    pub is_available: bool,
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub id: Uuid,
    pub name: String,
    pub price: Money,
    pub stock: u32,
    pub is_available: bool,
}

impl From<Product> for ProductResponse {
    fn from(p: Product) -> Self {
        Self {
            id: p.id,
            name: p.name,
            price: p.price,
            stock: p.stock,
            is_available: p.is_available,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePixRequest {
    /// Consumer whose wallet the recharge targets
    pub consumer_id: Uuid,
    /// Recharge amount as a decimal string
    pub amount: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatePixResponse {
    pub payment_id: String,
    pub qr_code: String,
    pub amount: Money,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct WebhookRequest {
    pub event: String,
    pub payment: WebhookPayment,
}

#[derive(Debug, Deserialize)]
pub struct WebhookPayment {
    pub id: String,
    pub value: Decimal,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub credited: bool,
}

#[derive(Debug, Serialize)]
pub struct StatementEntry {
    pub id: Uuid,
    pub amount: Money,
    pub entry_type: LedgerEntryType,
    pub method: PaymentMethod,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StatementResponse {
    pub consumer_id: Uuid,
    pub balance: Money,
    pub credit_limit: Money,
    pub daily_spending_limit: Money,
    pub spent_today: Money,
    pub blacklist: Vec<Uuid>,
    pub entries: Vec<StatementEntry>,
}

#[derive(Debug, Deserialize)]
pub struct GovernanceRequest {
    /// New daily cap as a decimal string; "0" removes the cap
    #[serde(default)]
    pub daily_spending_limit: Option<String>,
    #[serde(default)]
    pub blacklist_add: Option<Uuid>,
    #[serde(default)]
    pub blacklist_remove: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct GovernanceResponse {
    pub consumer_id: Uuid,
    pub daily_spending_limit: Money,
    pub blacklist: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

// =========================================================================
// Router
// =========================================================================

/// Build the full application router. Webhook and health endpoints stay
/// outside the identity layer: the gateway signs no identity headers.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/orders", post(place_order))
        .route("/orders/validate", post(validate_order))
        .route("/products", get(list_products).post(create_product))
        .route("/products/:product_id", put(replace_product))
        .route("/payments/pix", post(create_pix_payment))
        .route("/sponsor/:consumer_id/statement", get(consumer_statement))
        .route("/sponsor/:consumer_id/governance", patch(update_governance))
        .route("/kitchen/queue", get(kitchen_queue))
        .route("/kitchen/orders/:order_id/status", patch(advance_order_status))
        .layer(middleware::from_fn(identity_middleware));

    let api = Router::new()
        .route("/payments/webhook", post(payment_webhook))
        .merge(protected);

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// =========================================================================
// Orders
// =========================================================================

/// Place a terminal order on behalf of the identified consumer,
/// settling it against that consumer's wallet
async fn place_order(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    identity.require(&[Role::Merchant])?;

    let engine = SettlementEngine::new(state.store.clone(), state.events.clone());
    let order = engine
        .settle(identity.tenant_id, request.consumer_id, &request.items)
        .await?;

    Ok((StatusCode::CREATED, Json(order.into())))
}

/// Dry-run validation: same checks as placing, nothing committed
async fn validate_order(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<Json<ValidateOrderResponse>, AppError> {
    identity.require(&[Role::Merchant])?;

    let engine = SettlementEngine::new(state.store.clone(), state.events.clone());
    let outcome = engine
        .preview(identity.tenant_id, request.consumer_id, &request.items)
        .await?;

    Ok(Json(ValidateOrderResponse {
        valid: true,
        total_price: outcome.total,
        items: outcome
            .lines
            .into_iter()
            .map(|item| OrderItemResponse {
                product_id: item.product_id,
                product_name: item.product_name,
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: item.line_total,
            })
            .collect(),
    }))
}

// =========================================================================
// Products
// =========================================================================

async fn list_products(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<ProductResponse>>, AppError> {
    let products = state.store.list_products(identity.tenant_id).await?;
    Ok(Json(products.into_iter().map(Into::into).collect()))
}

async fn create_product(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<ProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), AppError> {
    identity.require(&[Role::Merchant])?;

    let price: Money = request.price.parse()?;
    let product = state
        .store
        .upsert_product(Product {
            id: Uuid::new_v4(),
            tenant_id: identity.tenant_id,
            name: request.name,
            price,
            stock: request.stock,
            is_available: request.is_available,
            version: 1,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(product.into())))
}

async fn replace_product(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(product_id): Path<Uuid>,
    Json(request): Json<ProductRequest>,
) -> Result<Json<ProductResponse>, AppError> {
    identity.require(&[Role::Merchant])?;

    let price: Money = request.price.parse()?;
    let product = state
        .store
        .upsert_product(Product {
            id: product_id,
            tenant_id: identity.tenant_id,
            name: request.name,
            price,
            stock: request.stock,
            is_available: request.is_available,
            version: 1,
        })
        .await?;

    Ok(Json(product.into()))
}

// =========================================================================
// Payments
// =========================================================================

/// Create a PIX charge at the gateway and register a pending intent
/// against the targeted consumer's wallet
async fn create_pix_payment(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(request): Json<CreatePixRequest>,
) -> Result<(StatusCode, Json<CreatePixResponse>), AppError> {
    identity.require(&[Role::Sponsor])?;

    let amount: Money = request.amount.parse()?;
    if !amount.is_positive() {
        return Err(AppError::InvalidRequest(
            "amount must be positive".to_string(),
        ));
    }

    let wallet = wallet_of(&state, request.consumer_id, identity.tenant_id).await?;
    let description = request
        .description
        .unwrap_or_else(|| "Wallet recharge".to_string());

    let charge = state
        .gateway
        .create_pix_charge(&wallet.owner_name, wallet.owner_id, amount, &description)
        .await?;

    state
        .store
        .insert_intent(PaymentIntent::pending(
            charge.payment_id.clone(),
            wallet.id,
            amount,
            Some(charge.qr_code.clone()),
        ))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatePixResponse {
            payment_id: charge.payment_id,
            qr_code: charge.qr_code,
            amount,
            status: "PENDING".to_string(),
        }),
    ))
}

/// Gateway confirmation webhook. Always answers 200 for deliveries we
/// understood, so the gateway stops redelivering them.
async fn payment_webhook(
    State(state): State<AppState>,
    Json(request): Json<WebhookRequest>,
) -> Result<Json<WebhookResponse>, AppError> {
    if request.event != "PAYMENT_RECEIVED" {
        return Ok(Json(WebhookResponse { credited: false }));
    }

    let amount = Money::new(request.payment.value.round_dp(2))
        .map_err(|e| AppError::InvalidRequest(e.to_string()))?;

    let reconciler = PaymentReconciler::new(state.store.clone());
    let outcome = reconciler
        .reconcile(&request.payment.id, amount, &request.payment.status)
        .await?;

    Ok(Json(WebhookResponse {
        credited: outcome.credited(),
    }))
}

// =========================================================================
// Sponsor
// =========================================================================

/// Balance, today's spend and recent ledger entries for a consumer
async fn consumer_statement(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(consumer_id): Path<Uuid>,
) -> Result<Json<StatementResponse>, AppError> {
    identity.require(&[Role::Sponsor])?;

    let wallet = wallet_of(&state, consumer_id, identity.tenant_id).await?;
    let offset = state
        .store
        .tenant_utc_offset_minutes(wallet.tenant_id)
        .await?;
    let day_start = start_of_tenant_day(Utc::now(), offset);
    let spent_today = state.store.debits_since(wallet.id, day_start).await?;
    let entries = state.store.recent_entries(wallet.id, 50).await?;

    Ok(Json(StatementResponse {
        consumer_id,
        balance: wallet.balance,
        credit_limit: wallet.credit_limit,
        daily_spending_limit: wallet.daily_spending_limit,
        spent_today,
        blacklist: wallet.blacklist.into_iter().collect(),
        entries: entries
            .into_iter()
            .map(|e| StatementEntry {
                id: e.id,
                amount: e.amount,
                entry_type: e.entry_type,
                method: e.method,
                description: e.description,
                created_at: e.created_at,
            })
            .collect(),
    }))
}

/// Update the consumer's daily cap and product blacklist
async fn update_governance(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(consumer_id): Path<Uuid>,
    Json(request): Json<GovernanceRequest>,
) -> Result<Json<GovernanceResponse>, AppError> {
    identity.require(&[Role::Sponsor])?;

    let daily_spending_limit = match request.daily_spending_limit {
        Some(raw) => {
            let limit: Money = raw.parse()?;
            if limit.is_negative() {
                return Err(AppError::InvalidRequest(
                    "daily_spending_limit cannot be negative".to_string(),
                ));
            }
            Some(limit)
        }
        None => None,
    };

    // One blacklist mutation per request keeps the change unambiguous.
    let blacklist = match (request.blacklist_add, request.blacklist_remove) {
        (Some(_), Some(_)) => {
            return Err(AppError::InvalidRequest(
                "provide blacklist_add or blacklist_remove, not both".to_string(),
            ));
        }
        (Some(id), None) => Some((id, true)),
        (None, Some(id)) => Some((id, false)),
        (None, None) => None,
    };

    let wallet = state
        .store
        .apply_governance(
            consumer_id,
            GovernanceChange {
                daily_spending_limit,
                blacklist,
            },
        )
        .await?;

    Ok(Json(GovernanceResponse {
        consumer_id,
        daily_spending_limit: wallet.daily_spending_limit,
        blacklist: wallet.blacklist.into_iter().collect(),
    }))
}

// =========================================================================
// Kitchen
// =========================================================================

async fn kitchen_queue(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<OrderResponse>>, AppError> {
    identity.require(&[Role::Merchant])?;

    let orders = state.store.kitchen_queue(identity.tenant_id).await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

/// Move an order forward. Stale or repeated requests succeed without
/// changing anything.
async fn advance_order_status(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    identity.require(&[Role::Merchant])?;

    if state.store.order(order_id).await?.is_none() {
        return Err(AppError::OrderNotFound(order_id));
    }

    let engine = SettlementEngine::new(state.store.clone(), state.events.clone());
    let order = engine.advance_status(order_id, request.status).await?;

    Ok(Json(order.into()))
}

// =========================================================================
// Helpers
// =========================================================================

/// Look up a consumer's wallet, refusing wallets that belong to
/// another tenant.
async fn wallet_of(state: &AppState, owner_id: Uuid, tenant_id: Uuid) -> Result<Wallet, AppError> {
    state
        .store
        .wallet_for_owner(owner_id)
        .await?
        .filter(|w| w.tenant_id == tenant_id)
        .ok_or(AppError::Domain(
            crate::domain::DomainError::WalletNotFound { owner_id },
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_place_order_request_deserialize() {
        let json = r#"{
            "consumer_id": "9f3c1a4e-0d2b-41d4-a716-446655440099",
            "items": [
                { "product_id": "550e8400-e29b-41d4-a716-446655440000", "quantity": 2 }
            ]
        }"#;

        let request: PlaceOrderRequest = serde_json::from_str(json).unwrap();
        assert_eq!(
            request.consumer_id,
            "9f3c1a4e-0d2b-41d4-a716-446655440099".parse::<Uuid>().unwrap()
        );
        assert_eq!(request.items.len(), 1);
        assert_eq!(request.items[0].quantity, 2);
    }

    #[test]
    fn test_webhook_request_deserialize() {
        let json = r#"{
            "event": "PAYMENT_RECEIVED",
            "payment": { "id": "pay_123", "value": 25.5, "status": "RECEIVED" }
        }"#;

        let request: WebhookRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.event, "PAYMENT_RECEIVED");
        assert_eq!(request.payment.id, "pay_123");
        assert_eq!(request.payment.value, rust_decimal_macros::dec!(25.5));
    }

    #[test]
    fn test_governance_request_defaults() {
        let request: GovernanceRequest = serde_json::from_str("{}").unwrap();
        assert!(request.daily_spending_limit.is_none());
        assert!(request.blacklist_add.is_none());
        assert!(request.blacklist_remove.is_none());
    }
}
