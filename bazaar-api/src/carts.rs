use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use bazaar_checkout::cart::CartDetails;
use bazaar_checkout::{ShippingCalculator, ShippingMethod, ShippingMethodId};
use bazaar_order::service::ShippingDetails;
use bazaar_shared::models::events::OrderPlacedEvent;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::identity;
use crate::orders::OrderResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CartResponse {
    /// Echoed back when the request minted a fresh anonymous cart.
    pub anonymous_cart_id: Option<Uuid>,
    #[serde(flatten)]
    pub details: CartDetails,
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub product_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct ApplyPromoRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ShippingQuery {
    pub province: String,
    #[serde(default)]
    pub city: String,
}

#[derive(Debug, Serialize)]
pub struct ShippingMethodsResponse {
    pub methods: Vec<ShippingMethod>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub shipping: ShippingDetails,
    pub shipping_method: String,
    #[serde(default)]
    pub notes: String,
}

/// GET /v1/cart
pub async fn get_cart(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CartResponse>, AppError> {
    let (owner, minted) = identity::cart_owner(&headers)?;
    let details = state.carts.details(&owner).await?;
    Ok(Json(CartResponse {
        anonymous_cart_id: minted,
        details,
    }))
}

/// DELETE /v1/cart
pub async fn clear_cart(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CartResponse>, AppError> {
    let (owner, minted) = identity::cart_owner(&headers)?;
    state.carts.clear(&owner).await?;
    let details = state.carts.details(&owner).await?;
    Ok(Json(CartResponse {
        anonymous_cart_id: minted,
        details,
    }))
}

/// POST /v1/cart/items
pub async fn add_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartResponse>, AppError> {
    let (owner, minted) = identity::cart_owner(&headers)?;
    state.carts.add_item(&owner, req.product_id, req.quantity).await?;
    let details = state.carts.details(&owner).await?;
    Ok(Json(CartResponse {
        anonymous_cart_id: minted,
        details,
    }))
}

/// PUT /v1/cart/items
pub async fn update_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<CartResponse>, AppError> {
    let (owner, minted) = identity::cart_owner(&headers)?;
    state
        .carts
        .update_quantity(&owner, req.product_id, req.quantity)
        .await?;
    let details = state.carts.details(&owner).await?;
    Ok(Json(CartResponse {
        anonymous_cart_id: minted,
        details,
    }))
}

/// DELETE /v1/cart/items/{product_id}
pub async fn remove_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(product_id): Path<Uuid>,
) -> Result<Json<CartResponse>, AppError> {
    let (owner, minted) = identity::cart_owner(&headers)?;
    state.carts.remove_item(&owner, product_id).await?;
    let details = state.carts.details(&owner).await?;
    Ok(Json(CartResponse {
        anonymous_cart_id: minted,
        details,
    }))
}

/// POST /v1/cart/promo
pub async fn apply_promo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ApplyPromoRequest>,
) -> Result<Json<CartResponse>, AppError> {
    let (owner, minted) = identity::cart_owner(&headers)?;
    let details = state.carts.apply_promo(&owner, &req.code, Utc::now()).await?;
    Ok(Json(CartResponse {
        anonymous_cart_id: minted,
        details,
    }))
}

/// GET /v1/shipping/methods?province=..&city=..
pub async fn shipping_methods(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ShippingQuery>,
) -> Result<Json<ShippingMethodsResponse>, AppError> {
    let (owner, _) = identity::cart_owner(&headers)?;
    let details = state.carts.details(&owner).await?;

    Ok(Json(ShippingMethodsResponse {
        methods: ShippingCalculator::get_shipping_methods(
            &query.province,
            &query.city,
            details.total_amount,
        ),
    }))
}

/// POST /v1/checkout
pub async fn checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let (owner, _) = identity::cart_owner(&headers)?;
    let user_id = identity::user_id(&headers);

    let method: ShippingMethodId = req.shipping_method.parse()?;
    let details = state.carts.details(&owner).await?;
    let shipping_cost = ShippingCalculator::calculate_shipping_cost(
        method,
        &req.shipping.province,
        details.total_amount,
    )?;

    let cart = state.carts.cart(&owner).await?;
    let order = state
        .orders
        .create_from_cart(&cart, req.shipping, method, shipping_cost, user_id, &req.notes)
        .await?;

    state.events.order_placed(&OrderPlacedEvent {
        order_id: order.id,
        cart_id: cart.id,
        user_id: order.user_id.clone(),
        total_amount: order.total_amount,
        items_count: cart.items.len(),
        timestamp: Utc::now().timestamp(),
    });

    crate::orders::order_response(&state, order).await
}
