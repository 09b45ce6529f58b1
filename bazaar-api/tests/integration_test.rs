use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header::CONTENT_TYPE, Request, StatusCode};
use axum::Router;
use bazaar_api::{app, AppState};
use bazaar_catalog::{Product, ProductStore};
use bazaar_checkout::cart::CartService;
use bazaar_checkout::promo::PromoEngine;
use bazaar_core::GatewayRegistry;
use bazaar_order::gateways::{MockGateway, OfflineGateway};
use bazaar_order::{InvoiceGenerator, OrderService, PaymentService};
use bazaar_store::{EventLog, MemoryStore};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn test_app() -> (Router, Arc<MemoryStore>, Product) {
    let store = Arc::new(MemoryStore::new());

    let product = Product::new("کتاب قصه‌های مجید", "BK-100", 250_000, 10);
    store.insert_product(product.clone()).await.unwrap();

    let orders = Arc::new(OrderService::new(store.clone(), store.clone()));
    let invoices = Arc::new(InvoiceGenerator::new(
        store.clone(),
        store.clone(),
        store.clone(),
    ));

    let mut registry = GatewayRegistry::new("mock");
    registry.register(Arc::new(MockGateway::new()));
    registry.register(Arc::new(OfflineGateway));

    let payments = Arc::new(PaymentService::new(
        orders.clone(),
        store.clone(),
        invoices.clone(),
        Arc::new(registry),
        "http://localhost:8080",
    ));

    let carts = Arc::new(CartService::new(
        store.clone(),
        store.clone(),
        PromoEngine::new(store.clone()),
    ));

    let state = AppState {
        carts,
        orders,
        payments,
        invoices,
        products: store.clone(),
        events: EventLog::new(),
    };

    (app(state), store, product)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, cart_id: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json");
    if let Some(cart_id) = cart_id {
        builder = builder.header("x-cart-id", cart_id);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(uri: &str, cart_id: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cart_id) = cart_id {
        builder = builder.header("x-cart-id", cart_id);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_anonymous_cart_to_confirmed_order() {
    let (router, _store, product) = test_app().await;

    // First contact mints an anonymous cart id.
    let (status, body) = send(
        &router,
        json_request(
            "POST",
            "/v1/cart/items",
            None,
            json!({ "product_id": product.id, "quantity": 2 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let cart_id = body["anonymous_cart_id"].as_str().unwrap().to_string();
    assert_eq!(body["items_count"], 2);
    assert_eq!(body["subtotal"], 500_000);

    // Checkout with standard post to Tehran (below the free threshold).
    let (status, order) = send(
        &router,
        json_request(
            "POST",
            "/v1/checkout",
            Some(&cart_id),
            json!({
                "shipping": {
                    "address": "خیابان آزادی، پلاک ۷",
                    "city": "تهران",
                    "province": "تهران",
                    "postal_code": "1345678901",
                    "recipient_name": "مینا رضایی",
                    "phone_number": "09121112233",
                },
                "shipping_method": "standard_post",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "PENDING");
    assert_eq!(order["total_amount"], 550_000);
    let order_id = order["id"].as_str().unwrap().to_string();

    // The cart is empty after checkout.
    let (_, cart) = send(&router, get_request("/v1/cart", Some(&cart_id))).await;
    assert_eq!(cart["items_count"], 0);

    // Open a payment attempt against the default (mock) gateway.
    let (status, payment) = send(
        &router,
        json_request(
            "POST",
            &format!("/v1/orders/{order_id}/payments"),
            Some(&cart_id),
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payment["success"], true);
    let payment_id = payment["payment_id"].as_str().unwrap().to_string();
    let authority = payment["authority"].as_str().unwrap().to_string();
    assert!(payment["payment_url"].as_str().unwrap().contains(&authority));

    // Provider callback confirms the payment and the order.
    let (status, verified) = send(
        &router,
        get_request(
            &format!("/v1/payments/{payment_id}/callback?Authority={authority}&Status=OK"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verified["status"], "success");

    let (_, order) = send(&router, get_request(&format!("/v1/orders/{order_id}"), None)).await;
    assert_eq!(order["status"], "CONFIRMED");
    assert_eq!(order["can_ship"], true);

    // A replayed callback is a benign success, not a second settlement.
    let (status, replay) = send(
        &router,
        get_request(
            &format!("/v1/payments/{payment_id}/callback?Authority={authority}&Status=OK"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay["status"], "success");
    assert_eq!(replay["message"], "Payment was already verified");
}

#[tokio::test]
async fn test_invalid_transition_returns_structured_error() {
    let (router, _store, product) = test_app().await;

    let (_, body) = send(
        &router,
        json_request(
            "POST",
            "/v1/cart/items",
            None,
            json!({ "product_id": product.id, "quantity": 1 }),
        ),
    )
    .await;
    let cart_id = body["anonymous_cart_id"].as_str().unwrap().to_string();

    let (_, order) = send(
        &router,
        json_request(
            "POST",
            "/v1/checkout",
            Some(&cart_id),
            json!({
                "shipping": {
                    "address": "میدان نقش جهان",
                    "city": "اصفهان",
                    "province": "اصفهان",
                    "postal_code": "8143679415",
                    "recipient_name": "رضا کریمی",
                    "phone_number": "09134445566",
                },
                "shipping_method": "standard_post",
            }),
        ),
    )
    .await;
    let order_id = order["id"].as_str().unwrap().to_string();

    // PENDING -> DELIVERED skips the whole middle of the lifecycle.
    let (status, body) = send(
        &router,
        json_request(
            "POST",
            &format!("/v1/orders/{order_id}/deliver"),
            None,
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn test_express_shipping_not_offered_outside_tehran() {
    let (router, _store, product) = test_app().await;

    let (_, body) = send(
        &router,
        json_request(
            "POST",
            "/v1/cart/items",
            None,
            json!({ "product_id": product.id, "quantity": 1 }),
        ),
    )
    .await;
    let cart_id = body["anonymous_cart_id"].as_str().unwrap().to_string();

    // "اصفهان", percent-encoded.
    let (status, body) = send(
        &router,
        get_request(
            "/v1/shipping/methods?province=%D8%A7%D8%B5%D9%81%D9%87%D8%A7%D9%86",
            Some(&cart_id),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let methods = body["methods"].as_array().unwrap();
    assert_eq!(methods.len(), 1);
    assert_eq!(methods[0]["id"], "standard_post");
    assert_eq!(methods[0]["cost"], 70_000);

    // "تهران": both methods, and express keeps its price.
    let (_, body) = send(
        &router,
        get_request(
            "/v1/shipping/methods?province=%D8%AA%D9%87%D8%B1%D8%A7%D9%86",
            Some(&cart_id),
        ),
    )
    .await;
    let methods = body["methods"].as_array().unwrap();
    assert_eq!(methods.len(), 2);
    assert_eq!(methods[1]["id"], "express");
    assert_eq!(methods[1]["cost"], 80_000);
}

#[tokio::test]
async fn test_manual_receipt_and_admin_approval_over_http() {
    let (router, _store, product) = test_app().await;

    let (_, body) = send(
        &router,
        json_request(
            "POST",
            "/v1/cart/items",
            None,
            json!({ "product_id": product.id, "quantity": 1 }),
        ),
    )
    .await;
    let cart_id = body["anonymous_cart_id"].as_str().unwrap().to_string();

    let (_, order) = send(
        &router,
        json_request(
            "POST",
            "/v1/checkout",
            Some(&cart_id),
            json!({
                "shipping": {
                    "address": "بلوار کشاورز",
                    "city": "تهران",
                    "province": "تهران",
                    "postal_code": "1417613151",
                    "recipient_name": "نرگس احمدی",
                    "phone_number": "09359998877",
                },
                "shipping_method": "standard_post",
            }),
        ),
    )
    .await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let (status, receipt) = send(
        &router,
        json_request(
            "POST",
            &format!("/v1/orders/{order_id}/receipt"),
            None,
            json!({ "receipt_reference": "receipts/2026/08/r-77.jpg" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["status"], "PROCESSING");
    assert_eq!(receipt["gateway"], "offline");
    let payment_id = receipt["payment_id"].as_str().unwrap().to_string();

    let (_, order) = send(&router, get_request(&format!("/v1/orders/{order_id}"), None)).await;
    assert_eq!(order["status"], "AWAITING_VERIFICATION");

    let (status, approved) = send(
        &router,
        json_request(
            "POST",
            &format!("/v1/payments/{payment_id}/approve"),
            None,
            json!({ "approved": true }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "success");

    let (_, order) = send(&router, get_request(&format!("/v1/orders/{order_id}"), None)).await;
    assert_eq!(order["status"], "CONFIRMED");
}
