//! API Integration Tests
//!
//! Exercise the router end to end over the in-memory store: role
//! checks, terminal order placement, webhook idempotency, governance
//! and the kitchen flow.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

use merenda::api::build_router;
use merenda::store::WalletStore;

mod common;
use common::{seed_product, seed_wallet, test_state};

fn request(
    method: &str,
    uri: &str,
    role: &str,
    user_id: Uuid,
    tenant_id: Uuid,
    body: Option<Value>,
) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("X-Role", role)
        .header("X-User-Id", user_id.to_string())
        .header("X-Tenant-Id", tenant_id.to_string());
    match body {
        Some(value) => builder.body(Body::from(value.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    (status, json_body(response).await)
}

fn order_body(consumer_id: Uuid, product_id: Uuid, quantity: u32) -> Value {
    json!({
        "consumer_id": consumer_id,
        "items": [{ "product_id": product_id, "quantity": quantity }]
    })
}

#[tokio::test]
async fn test_health_is_not_versioned() {
    let (state, _) = test_state();
    let app = build_router(state);

    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // the API itself lives under /api/v1
    let req = Request::builder()
        .method("GET")
        .uri("/api/v1/health")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_identity_headers_are_required() {
    let (state, _) = test_state();
    let app = build_router(state);

    let req = Request::builder()
        .method("GET")
        .uri("/api/v1/products")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .method("GET")
        .uri("/api/v1/products")
        .header("X-Role", "JANITOR")
        .header("X-User-Id", Uuid::new_v4().to_string())
        .header("X-Tenant-Id", Uuid::new_v4().to_string())
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_role_allow_lists() {
    let (state, store) = test_state();
    let tenant_id = Uuid::new_v4();
    let consumer = seed_wallet(&store, tenant_id, "Ana", dec!(10.00));
    let app = build_router(state);

    // consumers cannot see the kitchen queue
    let (status, body) = send(
        &app,
        request("GET", "/api/v1/kitchen/queue", "CONSUMER", consumer.owner_id, tenant_id, None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "forbidden");

    // orders come from the merchant terminal, never the consumer directly
    let (status, _) = send(
        &app,
        request(
            "POST",
            "/api/v1/orders",
            "CONSUMER",
            consumer.owner_id,
            tenant_id,
            Some(order_body(consumer.owner_id, Uuid::new_v4(), 1)),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // recharges are sponsor-initiated
    let (status, _) = send(
        &app,
        request(
            "POST",
            "/api/v1/payments/pix",
            "MERCHANT",
            Uuid::new_v4(),
            tenant_id,
            Some(json!({ "consumer_id": consumer.owner_id, "amount": "10.00" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // superadmin passes every gate
    let (status, _) = send(
        &app,
        request("GET", "/api/v1/kitchen/queue", "SUPERADMIN", Uuid::new_v4(), tenant_id, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_order_placement_e2e() {
    let (state, store) = test_state();
    let tenant_id = Uuid::new_v4();
    let wallet = seed_wallet(&store, tenant_id, "Ana", dec!(20.00));
    let merchant_id = Uuid::new_v4();
    let product = seed_product(&store, tenant_id, "Coxinha", dec!(12.50), 2);
    let app = build_router(state);

    // dry-run first
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/v1/orders/validate",
            "MERCHANT",
            merchant_id,
            tenant_id,
            Some(order_body(wallet.owner_id, product.id, 1)),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["total_price"], "12.50");

    // validation commits nothing
    let reloaded = store.wallet_by_id(wallet.id).await.unwrap().unwrap();
    assert_eq!(reloaded.balance.to_string(), "20.00");

    // place it for real, billed to the consumer's wallet
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/v1/orders",
            "MERCHANT",
            merchant_id,
            tenant_id,
            Some(order_body(wallet.owner_id, product.id, 1)),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["total_price"], "12.50");

    let reloaded = store.wallet_by_id(wallet.id).await.unwrap().unwrap();
    assert_eq!(reloaded.balance.to_string(), "7.50");

    // another order of the same item no longer fits the balance
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/v1/orders",
            "MERCHANT",
            merchant_id,
            tenant_id,
            Some(order_body(wallet.owner_id, product.id, 1)),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error_code"], "order_rejected");

    // empty carts are malformed, not a business rejection
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/v1/orders",
            "MERCHANT",
            merchant_id,
            tenant_id,
            Some(json!({ "consumer_id": wallet.owner_id, "items": [] })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_order");

    // consumers without a wallet cannot be billed
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/v1/orders",
            "MERCHANT",
            merchant_id,
            tenant_id,
            Some(order_body(Uuid::new_v4(), product.id, 1)),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "wallet_not_found");
}

#[tokio::test]
async fn test_merchant_catalog_management() {
    let (state, _) = test_state();
    let tenant_id = Uuid::new_v4();
    let merchant_id = Uuid::new_v4();
    let app = build_router(state);

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/v1/products",
            "MERCHANT",
            merchant_id,
            tenant_id,
            Some(json!({ "name": "Pao de queijo", "price": "3.50", "stock": 40, "is_available": true })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let product_id = body["id"].as_str().unwrap().to_string();
    assert_eq!(body["price"], "3.50");

    let (status, _) = send(
        &app,
        request(
            "PUT",
            &format!("/api/v1/products/{product_id}"),
            "MERCHANT",
            merchant_id,
            tenant_id,
            Some(json!({ "name": "Pao de queijo", "price": "4.00", "stock": 35, "is_available": true })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        request("GET", "/api/v1/products", "CONSUMER", Uuid::new_v4(), tenant_id, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["price"], "4.00");
    assert_eq!(body[0]["stock"], 35);
}

#[tokio::test]
async fn test_sponsor_recharges_consumer_wallet() {
    let (state, store) = test_state();
    let tenant_id = Uuid::new_v4();
    let wallet = seed_wallet(&store, tenant_id, "Ana", dec!(0.00));
    let sponsor_id = Uuid::new_v4();
    let app = build_router(state);

    // the sponsor owns no wallet, only the targeted consumer does
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/v1/payments/pix",
            "SPONSOR",
            sponsor_id,
            tenant_id,
            Some(json!({ "consumer_id": wallet.owner_id, "amount": "25.00" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "PENDING");
    assert!(!body["qr_code"].as_str().unwrap().is_empty());

    // a consumer from another tenant is out of reach
    let other_tenant = Uuid::new_v4();
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/v1/payments/pix",
            "SPONSOR",
            sponsor_id,
            other_tenant,
            Some(json!({ "consumer_id": wallet.owner_id, "amount": "25.00" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "wallet_not_found");
}

#[tokio::test]
async fn test_pix_recharge_and_webhook_idempotency() {
    let (state, store) = test_state();
    let tenant_id = Uuid::new_v4();
    let wallet = seed_wallet(&store, tenant_id, "Ana", dec!(0.00));
    let sponsor_id = Uuid::new_v4();
    let app = build_router(state);

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/v1/payments/pix",
            "SPONSOR",
            sponsor_id,
            tenant_id,
            Some(json!({ "consumer_id": wallet.owner_id, "amount": "25.00" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "PENDING");
    let payment_id = body["payment_id"].as_str().unwrap().to_string();
    assert!(!body["qr_code"].as_str().unwrap().is_empty());

    // webhook requires no identity headers
    let webhook = |value: f64| {
        Request::builder()
            .method("POST")
            .uri("/api/v1/payments/webhook")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({
                    "event": "PAYMENT_RECEIVED",
                    "payment": { "id": payment_id.as_str(), "value": value, "status": "RECEIVED" }
                })
                .to_string(),
            ))
            .unwrap()
    };

    let (status, body) = send(&app, webhook(25.0)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["credited"], true);

    // redelivery acknowledges without crediting twice
    let (status, body) = send(&app, webhook(25.0)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["credited"], false);

    let reloaded = store.wallet_by_id(wallet.id).await.unwrap().unwrap();
    assert_eq!(reloaded.balance.to_string(), "25.00");

    // the credit shows up on the sponsor statement
    let (status, body) = send(
        &app,
        request(
            "GET",
            &format!("/api/v1/sponsor/{}/statement", wallet.owner_id),
            "SPONSOR",
            sponsor_id,
            tenant_id,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], "25.00");
    assert_eq!(body["entries"].as_array().unwrap().len(), 1);
    assert_eq!(body["entries"][0]["entry_type"], "CREDIT");

    // unknown payment ids are rejected
    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/payments/webhook")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "event": "PAYMENT_RECEIVED",
                "payment": { "id": "pay_ghost", "value": 10.0, "status": "RECEIVED" }
            })
            .to_string(),
        ))
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "unknown_payment");
}

#[tokio::test]
async fn test_governance_applies_to_next_order() {
    let (state, store) = test_state();
    let tenant_id = Uuid::new_v4();
    let wallet = seed_wallet(&store, tenant_id, "Ana", dec!(50.00));
    let sponsor_id = Uuid::new_v4();
    let merchant_id = Uuid::new_v4();
    let product = seed_product(&store, tenant_id, "Chocolate", dec!(4.00), 10);
    let app = build_router(state);

    let (status, body) = send(
        &app,
        request(
            "PATCH",
            &format!("/api/v1/sponsor/{}/governance", wallet.owner_id),
            "SPONSOR",
            sponsor_id,
            tenant_id,
            Some(json!({ "daily_spending_limit": "15.00", "blacklist_add": product.id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["daily_spending_limit"], "15.00");
    assert_eq!(body["blacklist"][0], product.id.to_string());

    // governed consumer can no longer buy the blacklisted product
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/v1/orders",
            "MERCHANT",
            merchant_id,
            tenant_id,
            Some(order_body(wallet.owner_id, product.id, 1)),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error_code"], "order_rejected");

    // removing the entry restores the product
    let (status, _) = send(
        &app,
        request(
            "PATCH",
            &format!("/api/v1/sponsor/{}/governance", wallet.owner_id),
            "SPONSOR",
            sponsor_id,
            tenant_id,
            Some(json!({ "blacklist_remove": product.id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/api/v1/orders",
            "MERCHANT",
            merchant_id,
            tenant_id,
            Some(order_body(wallet.owner_id, product.id, 1)),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // both blacklist fields at once is ambiguous
    let (status, _) = send(
        &app,
        request(
            "PATCH",
            &format!("/api/v1/sponsor/{}/governance", wallet.owner_id),
            "SPONSOR",
            sponsor_id,
            tenant_id,
            Some(json!({ "blacklist_add": product.id, "blacklist_remove": product.id })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_kitchen_queue_and_status_flow() {
    let (state, store) = test_state();
    let tenant_id = Uuid::new_v4();
    let wallet = seed_wallet(&store, tenant_id, "Ana", dec!(50.00));
    let merchant_id = Uuid::new_v4();
    let product = seed_product(&store, tenant_id, "Esfiha", dec!(5.00), 10);
    let app = build_router(state);

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/v1/orders",
            "MERCHANT",
            merchant_id,
            tenant_id,
            Some(order_body(wallet.owner_id, product.id, 2)),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let order_id = body["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        request("GET", "/api/v1/kitchen/queue", "MERCHANT", merchant_id, tenant_id, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["id"], order_id);

    // ready, then a stale "preparing" request that must not regress
    let (status, body) = send(
        &app,
        request(
            "PATCH",
            &format!("/api/v1/kitchen/orders/{order_id}/status"),
            "MERCHANT",
            merchant_id,
            tenant_id,
            Some(json!({ "status": "READY" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "READY");

    let (status, body) = send(
        &app,
        request(
            "PATCH",
            &format!("/api/v1/kitchen/orders/{order_id}/status"),
            "MERCHANT",
            merchant_id,
            tenant_id,
            Some(json!({ "status": "PREPARING" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "READY");

    // picked-up orders leave the queue
    let (status, _) = send(
        &app,
        request(
            "PATCH",
            &format!("/api/v1/kitchen/orders/{order_id}/status"),
            "MERCHANT",
            merchant_id,
            tenant_id,
            Some(json!({ "status": "PICKED_UP" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        request("GET", "/api/v1/kitchen/queue", "MERCHANT", merchant_id, tenant_id, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());

    // unknown orders are a 404
    let (status, _) = send(
        &app,
        request(
            "PATCH",
            &format!("/api/v1/kitchen/orders/{}/status", Uuid::new_v4()),
            "MERCHANT",
            merchant_id,
            tenant_id,
            Some(json!({ "status": "READY" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
