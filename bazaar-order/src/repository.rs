use async_trait::async_trait;
use bazaar_core::StoreError;
use bazaar_shared::Currency;
use uuid::Uuid;

use crate::models::{
    Invoice, InvoiceItem, Order, OrderItem, OrderStatus, OrderStatusHistory, Payment,
    PaymentTransaction, ShippingInfo,
};

/// Everything the checkout commit persists in one atomic unit: the order
/// graph, the conditional stock decrements, the cart wipe and the promo
/// usage bump. Either all of it lands or none of it does.
#[derive(Debug, Clone)]
pub struct CheckoutCommit {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub shipping: ShippingInfo,
    pub cart_id: Uuid,
    pub promo_id: Option<Uuid>,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Atomic checkout. Stock consumption is a conditional
    /// decrement-with-floor per item; a losing decrement fails the whole
    /// commit with `StoreError::InsufficientStock`.
    async fn commit_checkout(&self, commit: CheckoutCommit) -> Result<(), StoreError>;

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn list_orders_for_user(&self, user_id: &str) -> Result<Vec<Order>, StoreError>;

    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError>;

    async fn shipping_info(&self, order_id: Uuid)
        -> Result<Option<ShippingInfo>, StoreError>;

    /// Compare-and-set on the from-status; the history row is appended in
    /// the same atomic unit so history never drifts from the status field.
    /// A lost race surfaces as `StoreError::Conflict`.
    async fn update_status(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        note: Option<String>,
    ) -> Result<(), StoreError>;

    async fn set_tracking_code(
        &self,
        order_id: Uuid,
        tracking_code: &str,
    ) -> Result<(), StoreError>;

    async fn status_history(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<OrderStatusHistory>, StoreError>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert_payment(&self, payment: Payment) -> Result<(), StoreError>;

    async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>, StoreError>;

    /// Newest first.
    async fn payments_for_order(&self, order_id: Uuid) -> Result<Vec<Payment>, StoreError>;

    async fn update_payment(&self, payment: &Payment) -> Result<(), StoreError>;

    async fn insert_transaction(
        &self,
        transaction: PaymentTransaction,
    ) -> Result<(), StoreError>;

    /// Attach the provider's answer to a previously recorded request row.
    async fn attach_transaction_result(
        &self,
        transaction_id: Uuid,
        raw_response: serde_json::Value,
        provider_status: Option<String>,
        provider_transaction_id: Option<String>,
    ) -> Result<(), StoreError>;

    async fn transactions_for_payment(
        &self,
        payment_id: Uuid,
    ) -> Result<Vec<PaymentTransaction>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct NewInvoiceItem {
    pub product_title: String,
    pub product_sku: String,
    pub quantity: u32,
    pub price: i64,
}

#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub order_id: Uuid,
    pub total_amount: i64,
    pub currency: Currency,
    pub shipping_address: String,
    pub phone_number: String,
    pub items: Vec<NewInvoiceItem>,
}

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Idempotent per order: a second call returns the existing invoice.
    /// Number allocation happens inside the store's serialized critical
    /// section so concurrent completions never produce duplicates.
    async fn create_invoice(&self, invoice: NewInvoice) -> Result<Invoice, StoreError>;

    async fn invoice_for_order(&self, order_id: Uuid)
        -> Result<Option<Invoice>, StoreError>;

    async fn invoice_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, StoreError>;
}
