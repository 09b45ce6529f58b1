use std::sync::Arc;

use bazaar_catalog::{Product, ProductStore};
use bazaar_checkout::cart::{CartOwner, CartService};
use bazaar_checkout::promo::{DiscountType, PromoCode, PromoEngine, PromoStore};
use bazaar_checkout::ShippingMethodId;
use bazaar_core::GatewayRegistry;
use bazaar_order::gateways::{MockGateway, OfflineGateway};
use bazaar_order::models::{OrderStatus, PaymentStatus};
use bazaar_order::reconciliation::{CallbackData, PaymentError, PaymentService};
use bazaar_order::service::{OrderError, OrderService, ShippingDetails};
use bazaar_order::InvoiceGenerator;
use bazaar_store::MemoryStore;
use chrono::{Duration, Utc};
use uuid::Uuid;

struct World {
    store: Arc<MemoryStore>,
    carts: CartService,
    orders: Arc<OrderService>,
    payments: PaymentService,
}

fn world() -> World {
    world_with_gateway(MockGateway::new())
}

fn world_with_gateway(gateway: MockGateway) -> World {
    let store = Arc::new(MemoryStore::new());

    let orders = Arc::new(OrderService::new(store.clone(), store.clone()));
    let invoices = Arc::new(InvoiceGenerator::new(
        store.clone(),
        store.clone(),
        store.clone(),
    ));

    let mut registry = GatewayRegistry::new("mock");
    registry.register(Arc::new(gateway));
    registry.register(Arc::new(OfflineGateway));

    let payments = PaymentService::new(
        orders.clone(),
        store.clone(),
        invoices,
        Arc::new(registry),
        "http://localhost:8080",
    );

    let carts = CartService::new(
        store.clone(),
        store.clone(),
        PromoEngine::new(store.clone()),
    );

    World {
        store,
        carts,
        orders,
        payments,
    }
}

fn shipping_details() -> ShippingDetails {
    ShippingDetails {
        address: "خیابان ولیعصر، پلاک ۱۲".to_string(),
        city: "تهران".to_string(),
        province: "تهران".to_string(),
        postal_code: "1966733711".to_string(),
        recipient_name: "سارا محمدی".to_string(),
        phone_number: "09123456789".to_string(),
    }
}

async fn seed_product(world: &World, title: &str, sku: &str, price: i64, stock: u32) -> Product {
    let product = Product::new(title, sku, price, stock);
    world.store.insert_product(product.clone()).await.unwrap();
    product
}

/// Fill a cart and check out, returning the created order.
async fn checkout(world: &World, owner: &CartOwner) -> bazaar_order::Order {
    let cart = world
        .carts
        .details(owner)
        .await
        .map(|details| details.cart_id)
        .unwrap();
    let cart = world.store_cart(cart).await;

    world
        .orders
        .create_from_cart(
            &cart,
            shipping_details(),
            ShippingMethodId::StandardPost,
            50_000,
            Some("user-1".to_string()),
            "",
        )
        .await
        .unwrap()
}

impl World {
    async fn store_cart(&self, cart_id: Uuid) -> bazaar_checkout::Cart {
        use bazaar_checkout::cart::CartStore;
        self.store.get_cart(cart_id).await.unwrap().unwrap()
    }
}

#[tokio::test]
async fn test_checkout_creates_pending_order_with_items_and_totals() {
    let world = world();
    let owner = CartOwner::User("user-1".to_string());
    let book = seed_product(&world, "کتاب قصه", "BK-1", 250_000, 5).await;
    let doll = seed_product(&world, "عروسک", "TY-1", 150_000, 3).await;

    world.carts.add_item(&owner, book.id, 2).await.unwrap();
    world.carts.add_item(&owner, doll.id, 1).await.unwrap();

    let order = checkout(&world, &owner).await;

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total_amount, 2 * 250_000 + 150_000 + 50_000);
    assert_eq!(order.shipping_cost, 50_000);

    let items = world.orders.items(order.id).await.unwrap();
    assert_eq!(items.len(), 2);

    // Cart cleared, stock consumed.
    let details = world.carts.details(&owner).await.unwrap();
    assert!(details.items.is_empty());
    assert_eq!(
        world.store.get_product(book.id).await.unwrap().unwrap().stock,
        3
    );
}

#[tokio::test]
async fn test_checkout_empty_cart_rejected() {
    let world = world();
    let owner = CartOwner::User("user-1".to_string());
    let details = world.carts.details(&owner).await.unwrap();
    let cart = world.store_cart(details.cart_id).await;

    let err = world
        .orders
        .create_from_cart(
            &cart,
            shipping_details(),
            ShippingMethodId::StandardPost,
            50_000,
            Some("user-1".to_string()),
            "",
        )
        .await
        .unwrap_err();

    assert!(matches!(err, OrderError::EmptyCart));
    assert!(world.orders.list_for_user("user-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_checkout_applies_promo_and_increments_usage() {
    let world = world();
    let owner = CartOwner::User("user-1".to_string());
    let book = seed_product(&world, "کتاب قصه", "BK-1", 300_000, 5).await;
    world.carts.add_item(&owner, book.id, 2).await.unwrap();

    let now = Utc::now();
    world
        .store
        .insert_promo(PromoCode {
            id: Uuid::new_v4(),
            code: "YALDA".to_string(),
            discount_type: DiscountType::Percentage,
            discount_value: 10,
            min_purchase: 0,
            max_discount: None,
            valid_from: now - Duration::days(1),
            valid_to: now + Duration::days(1),
            is_active: true,
            max_uses: Some(10),
            used_count: 0,
        })
        .await
        .unwrap();

    let details = world.carts.apply_promo(&owner, "YALDA", now).await.unwrap();
    assert_eq!(details.discount_amount, 60_000);

    let order = checkout(&world, &owner).await;
    assert_eq!(order.discount_amount, 60_000);
    assert_eq!(order.total_amount, 600_000 - 60_000 + 50_000);

    let promo = world.store.find_by_code("YALDA").await.unwrap().unwrap();
    assert_eq!(promo.used_count, 1);
}

#[tokio::test]
async fn test_payment_happy_path_confirms_order_and_generates_invoice() {
    let world = world();
    let owner = CartOwner::User("user-1".to_string());
    let book = seed_product(&world, "کتاب قصه", "BK-1", 250_000, 5).await;
    world.carts.add_item(&owner, book.id, 1).await.unwrap();
    let order = checkout(&world, &owner).await;

    let request = world.payments.request_payment(order.id, None).await.unwrap();
    assert!(request.success);
    let authority = request.authority.clone().unwrap();
    assert!(request.redirect_url.unwrap().contains(&authority));

    let payment = world.payments.get_payment(request.payment_id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Processing);
    assert_eq!(payment.reference_id.as_deref(), Some(authority.as_str()));
    assert_eq!(
        world.orders.get_order(order.id).await.unwrap().status,
        OrderStatus::Processing
    );

    let verification = world
        .payments
        .verify_payment(request.payment_id, CallbackData::ok(authority.as_str()), None)
        .await
        .unwrap();
    assert!(verification.success);
    assert_eq!(verification.reference_id.as_deref(), Some("12345"));

    let payment = world.payments.get_payment(request.payment_id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert_eq!(
        world.orders.get_order(order.id).await.unwrap().status,
        OrderStatus::Confirmed
    );

    // Invoice snapshot exists with the frozen item data.
    use bazaar_order::repository::InvoiceStore;
    let invoice = world
        .store
        .invoice_for_order(order.id)
        .await
        .unwrap()
        .expect("invoice should be generated");
    assert_eq!(invoice.total_amount, order.total_amount);
    let invoice_items = world.store.invoice_items(invoice.id).await.unwrap();
    assert_eq!(invoice_items.len(), 1);
    assert_eq!(invoice_items[0].product_title, "کتاب قصه");
    assert_eq!(invoice_items[0].product_sku, "BK-1");

    // History rows follow every transition.
    let history = world.orders.history(order.id).await.unwrap();
    let moves: Vec<_> = history
        .iter()
        .map(|row| (row.from_status, row.to_status))
        .collect();
    assert_eq!(
        moves,
        vec![
            (OrderStatus::Pending, OrderStatus::Processing),
            (OrderStatus::Processing, OrderStatus::Confirmed),
        ]
    );
}

#[tokio::test]
async fn test_duplicate_verification_is_benign_and_invoice_created_once() {
    let world = world();
    let owner = CartOwner::User("user-1".to_string());
    let book = seed_product(&world, "کتاب قصه", "BK-1", 250_000, 5).await;
    world.carts.add_item(&owner, book.id, 1).await.unwrap();
    let order = checkout(&world, &owner).await;

    let request = world.payments.request_payment(order.id, None).await.unwrap();
    let authority = request.authority.clone().unwrap();

    world
        .payments
        .verify_payment(request.payment_id, CallbackData::ok(authority.as_str()), None)
        .await
        .unwrap();

    use bazaar_order::repository::InvoiceStore;
    let first_invoice = world.store.invoice_for_order(order.id).await.unwrap().unwrap();

    // Replayed provider callback.
    let err = world
        .payments
        .verify_payment(request.payment_id, CallbackData::ok(authority.as_str()), None)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::AlreadyVerified));

    let second_invoice = world.store.invoice_for_order(order.id).await.unwrap().unwrap();
    assert_eq!(first_invoice.id, second_invoice.id);
    assert_eq!(first_invoice.invoice_number, second_invoice.invoice_number);
}

#[tokio::test]
async fn test_cancelled_callback_leaves_order_retryable() {
    let world = world();
    let owner = CartOwner::User("user-1".to_string());
    let book = seed_product(&world, "کتاب قصه", "BK-1", 250_000, 5).await;
    world.carts.add_item(&owner, book.id, 1).await.unwrap();
    let order = checkout(&world, &owner).await;

    let request = world.payments.request_payment(order.id, None).await.unwrap();

    // Customer bailed out on the gateway page.
    let verification = world
        .payments
        .verify_payment(
            request.payment_id,
            CallbackData {
                authority: request.authority.clone(),
                status: Some("NOK".to_string()),
            },
            None,
        )
        .await
        .unwrap();
    assert!(!verification.success);

    let payment = world.payments.get_payment(request.payment_id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);

    // The order keeps its state and a fresh attempt succeeds.
    let order_now = world.orders.get_order(order.id).await.unwrap();
    assert_eq!(order_now.status, OrderStatus::Processing);

    let retry = world.payments.request_payment(order.id, None).await.unwrap();
    assert!(retry.success);
    assert_ne!(retry.payment_id, request.payment_id);
    assert_eq!(
        world.payments.payments_for_order(order.id).await.unwrap().len(),
        2
    );
}

#[tokio::test]
async fn test_gateway_decline_is_a_result_not_an_error() {
    let world = world_with_gateway(MockGateway::declining());
    let owner = CartOwner::User("user-1".to_string());
    let book = seed_product(&world, "کتاب قصه", "BK-1", 250_000, 5).await;
    world.carts.add_item(&owner, book.id, 1).await.unwrap();
    let order = checkout(&world, &owner).await;

    let request = world.payments.request_payment(order.id, None).await.unwrap();
    assert!(!request.success);
    assert!(request.error_message.is_some());

    let payment = world.payments.get_payment(request.payment_id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);

    // Order untouched; the customer may retry.
    assert_eq!(
        world.orders.get_order(order.id).await.unwrap().status,
        OrderStatus::Pending
    );
}

#[tokio::test]
async fn test_gateway_outage_records_failed_audit_row() {
    let world = world_with_gateway(MockGateway::unreachable());
    let owner = CartOwner::User("user-1".to_string());
    let book = seed_product(&world, "کتاب قصه", "BK-1", 250_000, 5).await;
    world.carts.add_item(&owner, book.id, 1).await.unwrap();
    let order = checkout(&world, &owner).await;

    let err = world.payments.request_payment(order.id, None).await.unwrap_err();
    assert!(matches!(err, PaymentError::Gateway(_)));

    // The audit trail still carries the failed round-trip.
    let payment = world
        .payments
        .payments_for_order(order.id)
        .await
        .unwrap()
        .into_iter()
        .next()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);

    use bazaar_order::repository::PaymentStore;
    let transactions = world.store.transactions_for_payment(payment.id).await.unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(
        transactions[0].provider_status.as_deref(),
        Some("COMMUNICATION_ERROR")
    );
    assert!(transactions[0].raw_response.is_some());
}

#[tokio::test]
async fn test_unknown_gateway_rejected() {
    let world = world();
    let owner = CartOwner::User("user-1".to_string());
    let book = seed_product(&world, "کتاب قصه", "BK-1", 250_000, 5).await;
    world.carts.add_item(&owner, book.id, 1).await.unwrap();
    let order = checkout(&world, &owner).await;

    let err = world
        .payments
        .request_payment(order.id, Some("cash-under-the-door"))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::UnknownGateway(_)));
}

#[tokio::test]
async fn test_payment_rejected_for_unpayable_order() {
    let world = world();
    let owner = CartOwner::User("user-1".to_string());
    let book = seed_product(&world, "کتاب قصه", "BK-1", 250_000, 5).await;
    world.carts.add_item(&owner, book.id, 1).await.unwrap();
    let order = checkout(&world, &owner).await;

    world.orders.cancel(order.id, None).await.unwrap();

    let err = world.payments.request_payment(order.id, None).await.unwrap_err();
    assert!(matches!(
        err,
        PaymentError::InvalidOrderState {
            status: OrderStatus::Cancelled
        }
    ));
}

#[tokio::test]
async fn test_confirm_shipping_requires_tracking_code() {
    let world = world();
    let owner = CartOwner::User("user-1".to_string());
    let book = seed_product(&world, "کتاب قصه", "BK-1", 250_000, 5).await;
    world.carts.add_item(&owner, book.id, 1).await.unwrap();
    let order = checkout(&world, &owner).await;

    world
        .orders
        .transition(order.id, OrderStatus::Processing, None)
        .await
        .unwrap();
    world
        .orders
        .transition(order.id, OrderStatus::Confirmed, None)
        .await
        .unwrap();

    let err = world.orders.confirm_shipping(order.id, "  ").await.unwrap_err();
    assert!(matches!(err, OrderError::MissingTrackingCode));
    assert_eq!(
        world.orders.get_order(order.id).await.unwrap().status,
        OrderStatus::Confirmed
    );

    let shipped = world.orders.confirm_shipping(order.id, "TRK-123").await.unwrap();
    assert_eq!(shipped.status, OrderStatus::Shipped);
    assert_eq!(shipped.tracking_code.as_deref(), Some("TRK-123"));
}

#[tokio::test]
async fn test_invalid_transition_rejected_without_side_effects() {
    let world = world();
    let owner = CartOwner::User("user-1".to_string());
    let book = seed_product(&world, "کتاب قصه", "BK-1", 250_000, 5).await;
    world.carts.add_item(&owner, book.id, 1).await.unwrap();
    let order = checkout(&world, &owner).await;

    let err = world
        .orders
        .transition(order.id, OrderStatus::Delivered, None)
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::Transition(_)));

    assert_eq!(
        world.orders.get_order(order.id).await.unwrap().status,
        OrderStatus::Pending
    );
    assert!(world.orders.history(order.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_checkout_on_single_stock_product() {
    let world = world();
    let product = seed_product(&world, "نسخه امضاشده", "BK-LTD", 900_000, 1).await;

    let owner_a = CartOwner::User("user-a".to_string());
    let owner_b = CartOwner::User("user-b".to_string());
    world.carts.add_item(&owner_a, product.id, 1).await.unwrap();
    world.carts.add_item(&owner_b, product.id, 1).await.unwrap();

    let cart_a = world.store_cart(world.carts.details(&owner_a).await.unwrap().cart_id).await;
    let cart_b = world.store_cart(world.carts.details(&owner_b).await.unwrap().cart_id).await;

    let orders_a = world.orders.clone();
    let orders_b = world.orders.clone();

    let task_a = tokio::spawn(async move {
        orders_a
            .create_from_cart(
                &cart_a,
                shipping_details(),
                ShippingMethodId::StandardPost,
                50_000,
                Some("user-a".to_string()),
                "",
            )
            .await
    });
    let task_b = tokio::spawn(async move {
        orders_b
            .create_from_cart(
                &cart_b,
                shipping_details(),
                ShippingMethodId::StandardPost,
                50_000,
                Some("user-b".to_string()),
                "",
            )
            .await
    });

    let result_a = task_a.await.unwrap();
    let result_b = task_b.await.unwrap();

    let winners = [&result_a, &result_b]
        .iter()
        .filter(|result| result.is_ok())
        .count();
    assert_eq!(winners, 1, "exactly one checkout must win");

    let loser = if result_a.is_err() { result_a } else { result_b };
    assert!(matches!(
        loser.unwrap_err(),
        OrderError::InsufficientStock { .. }
    ));

    assert_eq!(
        world.store.get_product(product.id).await.unwrap().unwrap().stock,
        0
    );
}

#[tokio::test]
async fn test_manual_payment_flow_via_receipt_and_admin_approval() {
    let world = world();
    let owner = CartOwner::User("user-1".to_string());
    let book = seed_product(&world, "کتاب قصه", "BK-1", 250_000, 5).await;
    world.carts.add_item(&owner, book.id, 1).await.unwrap();
    let order = checkout(&world, &owner).await;

    let payment = world
        .payments
        .submit_receipt(order.id, "receipts/2026/08/receipt-14.jpg")
        .await
        .unwrap();

    assert_eq!(payment.status, PaymentStatus::Processing);
    assert_eq!(payment.gateway, "offline");
    assert!(payment.reference_id.as_deref().unwrap().starts_with("RCPT-"));
    assert_eq!(
        world.orders.get_order(order.id).await.unwrap().status,
        OrderStatus::AwaitingVerification
    );

    use bazaar_order::repository::PaymentStore;
    let transactions = world.store.transactions_for_payment(payment.id).await.unwrap();
    assert_eq!(
        transactions[0].receipt_reference.as_deref(),
        Some("receipts/2026/08/receipt-14.jpg")
    );

    // Administrative approval completes the manual path.
    let verification = world
        .payments
        .verify_payment(
            payment.id,
            CallbackData {
                authority: None,
                status: Some("OK".to_string()),
            },
            None,
        )
        .await
        .unwrap();
    assert!(verification.success);

    assert_eq!(
        world.orders.get_order(order.id).await.unwrap().status,
        OrderStatus::Confirmed
    );

    use bazaar_order::repository::InvoiceStore;
    assert!(world.store.invoice_for_order(order.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_full_lifecycle_to_delivery_and_return() {
    let world = world();
    let owner = CartOwner::User("user-1".to_string());
    let book = seed_product(&world, "کتاب قصه", "BK-1", 250_000, 5).await;
    world.carts.add_item(&owner, book.id, 1).await.unwrap();
    let order = checkout(&world, &owner).await;

    let request = world.payments.request_payment(order.id, None).await.unwrap();
    world
        .payments
        .verify_payment(
            request.payment_id,
            CallbackData::ok(request.authority.unwrap()),
            None,
        )
        .await
        .unwrap();

    world.orders.confirm_shipping(order.id, "TRK-9").await.unwrap();
    world.orders.mark_delivered(order.id).await.unwrap();
    world.orders.process_return(order.id).await.unwrap();
    let refunded = world.orders.process_refund(order.id).await.unwrap();
    assert_eq!(refunded.status, OrderStatus::Refunded);

    let history = world.orders.history(order.id).await.unwrap();
    assert_eq!(history.len(), 6);
}
