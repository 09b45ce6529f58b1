use bazaar_catalog::ProductStore;
use bazaar_checkout::{Cart, ShippingMethodId};
use bazaar_core::StoreError;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::lifecycle::{self, InvalidTransition};
use crate::models::{Order, OrderItem, OrderStatus, OrderStatusHistory, ShippingInfo};
use crate::repository::{CheckoutCommit, OrderStore};

/// Shipping details collected at checkout.
#[derive(Debug, Clone, Deserialize)]
pub struct ShippingDetails {
    pub address: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub recipient_name: String,
    pub phone_number: String,
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("cart is empty")]
    EmptyCart,

    #[error("order not found: {0}")]
    NotFound(Uuid),

    #[error("product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("product {product_id} is not available")]
    ProductUnavailable { product_id: Uuid },

    #[error("not enough stock available for product {product_id}")]
    InsufficientStock { product_id: Uuid },

    #[error("tracking code is required")]
    MissingTrackingCode,

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for OrderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientStock { product_id, .. } => {
                OrderError::InsufficientStock { product_id }
            }
            other => OrderError::Store(other),
        }
    }
}

/// Owns the order lifecycle: cart-to-order assembly and validated status
/// transitions.
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    products: Arc<dyn ProductStore>,
}

impl OrderService {
    pub fn new(orders: Arc<dyn OrderStore>, products: Arc<dyn ProductStore>) -> Self {
        Self { orders, products }
    }

    /// Convert a cart into a PENDING order.
    ///
    /// Prices are re-read from the catalog here, never taken from cart
    /// rows. The store commit is atomic: stock decrements, order graph,
    /// cart wipe and promo usage either all land or none do.
    pub async fn create_from_cart(
        &self,
        cart: &Cart,
        shipping: ShippingDetails,
        shipping_method: ShippingMethodId,
        shipping_cost: i64,
        user_id: Option<String>,
        notes: &str,
    ) -> Result<Order, OrderError> {
        if cart.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        let order_id = Uuid::new_v4();
        let mut items = Vec::with_capacity(cart.items.len());
        let mut items_total = 0i64;

        for line in &cart.items {
            let product = self
                .products
                .get_product(line.product_id)
                .await?
                .ok_or(OrderError::ProductNotFound(line.product_id))?;

            if !product.is_available {
                return Err(OrderError::ProductUnavailable {
                    product_id: product.id,
                });
            }

            let item = OrderItem::new(order_id, product.id, line.quantity, product.price);
            items_total += item.total_price();
            items.push(item);
        }

        // A fixed promo may grant more than the items are worth; the
        // discount recorded on the order is clamped so the total stays
        // non-negative.
        let discount_amount = cart
            .applied_promo
            .as_ref()
            .map(|promo| promo.discount_amount.min(items_total))
            .unwrap_or(0);

        let now = Utc::now();
        let order = Order {
            id: order_id,
            user_id,
            status: OrderStatus::Pending,
            currency: Default::default(),
            total_amount: items_total - discount_amount + shipping_cost,
            phone_number: shipping.phone_number.clone(),
            notes: notes.to_string(),
            tracking_code: None,
            shipping_method,
            shipping_cost,
            discount_amount,
            created_at: now,
            updated_at: now,
        };

        let shipping_info = ShippingInfo {
            order_id,
            address: shipping.address,
            city: shipping.city,
            province: shipping.province,
            postal_code: shipping.postal_code,
            recipient_name: shipping.recipient_name,
            phone_number: shipping.phone_number,
        };

        let items_count = items.len();
        self.orders
            .commit_checkout(CheckoutCommit {
                order: order.clone(),
                items,
                shipping: shipping_info,
                cart_id: cart.id,
                promo_id: cart.applied_promo.as_ref().map(|promo| promo.promo_id),
            })
            .await?;

        tracing::info!(
            order_id = %order.id,
            cart_id = %cart.id,
            total = order.total_amount,
            items = items_count,
            "order created from cart"
        );

        Ok(order)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or(OrderError::NotFound(order_id))
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Order>, OrderError> {
        Ok(self.orders.list_orders_for_user(user_id).await?)
    }

    pub async fn items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, OrderError> {
        Ok(self.orders.order_items(order_id).await?)
    }

    pub async fn shipping_info(
        &self,
        order_id: Uuid,
    ) -> Result<Option<ShippingInfo>, OrderError> {
        Ok(self.orders.shipping_info(order_id).await?)
    }

    pub async fn history(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<OrderStatusHistory>, OrderError> {
        Ok(self.orders.status_history(order_id).await?)
    }

    /// Move an order to a new status. Illegal moves are rejected without
    /// touching the order; a move to the current status is an idempotent
    /// no-op so replayed calls succeed. The status write and its history
    /// row land in one atomic store operation.
    pub async fn transition(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        note: Option<String>,
    ) -> Result<Order, OrderError> {
        let order = self.get_order(order_id).await?;

        lifecycle::validate_transition(order.status, new_status)?;
        if order.status == new_status {
            return Ok(order);
        }

        self.orders
            .update_status(order_id, order.status, new_status, note)
            .await?;

        tracing::info!(
            order_id = %order_id,
            from = %order.status,
            to = %new_status,
            user = order.user_id.as_deref().unwrap_or("-"),
            "order status changed"
        );

        self.get_order(order_id).await
    }

    /// Record the carrier tracking code and move CONFIRMED -> SHIPPED.
    pub async fn confirm_shipping(
        &self,
        order_id: Uuid,
        tracking_code: &str,
    ) -> Result<Order, OrderError> {
        if tracking_code.trim().is_empty() {
            return Err(OrderError::MissingTrackingCode);
        }

        let order = self.get_order(order_id).await?;
        lifecycle::validate_transition(order.status, OrderStatus::Shipped)?;

        self.orders.set_tracking_code(order_id, tracking_code).await?;
        self.transition(order_id, OrderStatus::Shipped, None).await
    }

    pub async fn cancel(&self, order_id: Uuid, note: Option<String>) -> Result<Order, OrderError> {
        self.transition(order_id, OrderStatus::Cancelled, note).await
    }

    pub async fn mark_delivered(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.transition(order_id, OrderStatus::Delivered, None).await
    }

    pub async fn process_return(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.transition(order_id, OrderStatus::Returned, None).await
    }

    pub async fn process_refund(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.transition(order_id, OrderStatus::Refunded, None).await
    }
}
