use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use bazaar_order::models::{Order, OrderStatus, OrderStatusHistory};
use bazaar_shared::models::events::OrderStatusChangedEvent;
use bazaar_shared::Currency;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::identity;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub quantity: u32,
    pub price: i64,
    pub total_price: i64,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub status: OrderStatus,
    pub currency: Currency,
    pub total_amount: i64,
    pub shipping_cost: i64,
    pub discount_amount: i64,
    pub phone_number: String,
    pub tracking_code: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub can_cancel: bool,
    pub can_ship: bool,
    pub can_deliver: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ShipOrderRequest {
    pub tracking_code: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelOrderRequest {
    #[serde(default)]
    pub note: Option<String>,
}

pub(crate) async fn order_response(
    state: &AppState,
    order: Order,
) -> Result<Json<OrderResponse>, AppError> {
    let items = state.orders.items(order.id).await?;

    Ok(Json(OrderResponse {
        id: order.id,
        status: order.status,
        currency: order.currency,
        total_amount: order.total_amount,
        shipping_cost: order.shipping_cost,
        discount_amount: order.discount_amount,
        phone_number: order.phone_number.clone(),
        tracking_code: order.tracking_code.clone(),
        items: items
            .into_iter()
            .map(|item| OrderItemResponse {
                product_id: item.product_id,
                quantity: item.quantity,
                price: item.price,
                total_price: item.total_price(),
            })
            .collect(),
        can_cancel: order.can_cancel(),
        can_ship: order.can_ship(),
        can_deliver: order.can_deliver(),
        created_at: order.created_at,
        updated_at: order.updated_at,
    }))
}

/// Loads the order and enforces ownership when a user header is present.
async fn load_owned_order(
    state: &AppState,
    headers: &HeaderMap,
    order_id: Uuid,
) -> Result<Order, AppError> {
    let order = state.orders.get_order(order_id).await?;

    if let Some(user) = identity::user_id(headers) {
        if order.user_id.as_deref().is_some_and(|owner| owner != user) {
            return Err(AppError::forbidden(
                "You don't have permission to access this order",
            ));
        }
    }

    Ok(order)
}

/// GET /v1/orders
pub async fn list_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<OrderResponse>>, AppError> {
    let user = identity::user_id(&headers)
        .ok_or_else(|| AppError::unauthorized("Authentication required"))?;

    let orders = state.orders.list_for_user(&user).await?;
    let mut responses = Vec::with_capacity(orders.len());
    for order in orders {
        responses.push(order_response(&state, order).await?.0);
    }
    Ok(Json(responses))
}

/// GET /v1/orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let order = load_owned_order(&state, &headers, order_id).await?;
    order_response(&state, order).await
}

/// GET /v1/orders/{id}/history
pub async fn order_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Vec<OrderStatusHistory>>, AppError> {
    load_owned_order(&state, &headers, order_id).await?;
    Ok(Json(state.orders.history(order_id).await?))
}

/// POST /v1/orders/{id}/cancel
pub async fn cancel_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<Uuid>,
    Json(req): Json<CancelOrderRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let before = load_owned_order(&state, &headers, order_id).await?;
    let order = state.orders.cancel(order_id, req.note).await?;
    emit_status_change(&state, &before, &order);
    order_response(&state, order).await
}

/// POST /v1/orders/{id}/ship
pub async fn ship_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<ShipOrderRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let before = state.orders.get_order(order_id).await?;
    let order = state.orders.confirm_shipping(order_id, &req.tracking_code).await?;
    emit_status_change(&state, &before, &order);
    order_response(&state, order).await
}

/// POST /v1/orders/{id}/deliver
pub async fn deliver_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let before = state.orders.get_order(order_id).await?;
    let order = state.orders.mark_delivered(order_id).await?;
    emit_status_change(&state, &before, &order);
    order_response(&state, order).await
}

/// POST /v1/orders/{id}/return
pub async fn return_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let before = state.orders.get_order(order_id).await?;
    let order = state.orders.process_return(order_id).await?;
    emit_status_change(&state, &before, &order);
    order_response(&state, order).await
}

/// POST /v1/orders/{id}/refund
pub async fn refund_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, AppError> {
    let before = state.orders.get_order(order_id).await?;
    let order = state.orders.process_refund(order_id).await?;
    emit_status_change(&state, &before, &order);
    order_response(&state, order).await
}

fn emit_status_change(state: &AppState, before: &Order, after: &Order) {
    if before.status != after.status {
        state.events.order_status_changed(&OrderStatusChangedEvent {
            order_id: after.id,
            from_status: before.status.to_string(),
            to_status: after.status.to_string(),
            timestamp: Utc::now().timestamp(),
        });
    }
}
