pub mod carts;
pub mod error;
pub mod identity;
pub mod invoices;
pub mod orders;
pub mod payments;
pub mod products;
pub mod state;

pub use state::AppState;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/cart", get(carts::get_cart).delete(carts::clear_cart))
        .route(
            "/v1/cart/items",
            post(carts::add_item).put(carts::update_item),
        )
        .route("/v1/cart/items/{product_id}", delete(carts::remove_item))
        .route("/v1/cart/promo", post(carts::apply_promo))
        .route("/v1/shipping/methods", get(carts::shipping_methods))
        .route("/v1/checkout", post(carts::checkout))
        .route(
            "/v1/products",
            get(products::list_products).post(products::create_product),
        )
        .route("/v1/products/{id}", get(products::get_product))
        .route("/v1/products/{id}/stock", put(products::set_stock))
        .route("/v1/orders", get(orders::list_orders))
        .route("/v1/orders/{id}", get(orders::get_order))
        .route("/v1/orders/{id}/history", get(orders::order_history))
        .route("/v1/orders/{id}/cancel", post(orders::cancel_order))
        .route("/v1/orders/{id}/ship", post(orders::ship_order))
        .route("/v1/orders/{id}/deliver", post(orders::deliver_order))
        .route("/v1/orders/{id}/return", post(orders::return_order))
        .route("/v1/orders/{id}/refund", post(orders::refund_order))
        .route(
            "/v1/orders/{id}/invoice",
            get(invoices::get_invoice).post(invoices::regenerate_invoice),
        )
        .route("/v1/orders/{id}/payments", post(payments::request_payment))
        .route("/v1/orders/{id}/receipt", post(payments::submit_receipt))
        .route("/v1/payments/{id}", get(payments::payment_status))
        .route("/v1/payments/{id}/callback", get(payments::payment_callback))
        .route("/v1/payments/{id}/approve", post(payments::approve_payment))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
