use bazaar_checkout::ShippingMethodId;
use bazaar_shared::Currency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::lifecycle;

/// Order status in the lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Initial state while the order is still a cart.
    Cart,
    /// Order placed, payment not initiated.
    Pending,
    /// Manual payment submitted, waiting for administrative approval.
    AwaitingVerification,
    /// Payment in progress at a gateway.
    Processing,
    /// Payment completed, order confirmed.
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
    Returned,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Cart => "CART",
            OrderStatus::Pending => "PENDING",
            OrderStatus::AwaitingVerification => "AWAITING_VERIFICATION",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
            OrderStatus::Returned => "RETURNED",
        }
    }

    pub const ALL: [OrderStatus; 10] = [
        OrderStatus::Cart,
        OrderStatus::Pending,
        OrderStatus::AwaitingVerification,
        OrderStatus::Processing,
        OrderStatus::Confirmed,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
        OrderStatus::Returned,
    ];
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown order status: {s}"))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Processing => "PROCESSING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "PROCESSING" => Ok(PaymentStatus::Processing),
            "COMPLETED" => Ok(PaymentStatus::Completed),
            "FAILED" => Ok(PaymentStatus::Failed),
            "REFUNDED" => Ok(PaymentStatus::Refunded),
            "CANCELLED" => Ok(PaymentStatus::Cancelled),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

/// A customer's purchase record. Status only ever changes through
/// validated lifecycle transitions; rows are never physically deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Option<String>,
    pub status: OrderStatus,
    pub currency: Currency,
    /// Always `sum(quantity * price) - discount_amount + shipping_cost`.
    pub total_amount: i64,
    pub phone_number: String,
    pub notes: String,
    pub tracking_code: Option<String>,
    pub shipping_method: ShippingMethodId,
    pub shipping_cost: i64,
    pub discount_amount: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn can_cancel(&self) -> bool {
        lifecycle::can_transition(self.status, OrderStatus::Cancelled)
    }

    pub fn can_ship(&self) -> bool {
        lifecycle::can_transition(self.status, OrderStatus::Shipped)
    }

    pub fn can_deliver(&self) -> bool {
        lifecycle::can_transition(self.status, OrderStatus::Delivered)
    }
}

/// Snapshot of one product line at order-creation time. The unit price
/// is frozen here and never follows later catalog edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: u32,
    pub price: i64,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn new(order_id: Uuid, product_id: Uuid, quantity: u32, price: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            product_id,
            quantity,
            price,
            created_at: Utc::now(),
        }
    }

    pub fn total_price(&self) -> i64 {
        i64::from(self.quantity) * self.price
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub order_id: Uuid,
    pub address: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub recipient_name: String,
    pub phone_number: String,
}

impl ShippingInfo {
    /// Single-line address used on invoices.
    pub fn display_address(&self) -> String {
        format!(
            "{}, {}, {} {}",
            self.province, self.city, self.address, self.postal_code
        )
    }
}

/// Append-only record of a status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusHistory {
    pub id: Uuid,
    pub order_id: Uuid,
    pub from_status: OrderStatus,
    pub to_status: OrderStatus,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One attempt to collect money for an order via a specific gateway.
/// Orders may accumulate failed attempts; at most one completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub amount: i64,
    pub status: PaymentStatus,
    pub gateway: String,
    pub currency: Currency,
    /// Gateway-assigned authority/token for this attempt.
    pub reference_id: Option<String>,
    /// Gateway-assigned final reference, set on completion.
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn new(order_id: Uuid, amount: i64, currency: Currency, gateway: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_id,
            amount,
            status: PaymentStatus::Pending,
            gateway: gateway.into(),
            currency,
            reference_id: None,
            transaction_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Audit row for one gateway interaction. Append-only; the response half
/// may be attached once when the round-trip finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub amount: i64,
    pub raw_request: serde_json::Value,
    pub raw_response: Option<serde_json::Value>,
    pub provider_status: Option<String>,
    pub transaction_id: Option<String>,
    /// Reference to an uploaded receipt on the manual-payment path.
    pub receipt_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PaymentTransaction {
    pub fn request(payment_id: Uuid, amount: i64, raw_request: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            payment_id,
            amount,
            raw_request,
            raw_response: None,
            provider_status: None,
            transaction_id: None,
            receipt_reference: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_receipt(mut self, receipt_reference: impl Into<String>) -> Self {
        self.receipt_reference = Some(receipt_reference.into());
        self
    }
}

/// Immutable financial snapshot generated once per order on first
/// successful payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub order_id: Uuid,
    /// Sequential, unique, human-readable.
    pub invoice_number: String,
    pub total_amount: i64,
    pub currency: Currency,
    pub shipping_address: String,
    pub phone_number: String,
    pub pdf_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub product_title: String,
    pub product_sku: String,
    pub quantity: u32,
    pub price: i64,
}

impl InvoiceItem {
    pub fn total_price(&self) -> i64 {
        i64::from(self.quantity) * self.price
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("SHOPPING".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_item_total_price() {
        let item = OrderItem::new(Uuid::new_v4(), Uuid::new_v4(), 3, 250_000);
        assert_eq!(item.total_price(), 750_000);
    }

    #[test]
    fn test_derived_checks_follow_status() {
        let order = Order {
            id: Uuid::new_v4(),
            user_id: None,
            status: OrderStatus::Confirmed,
            currency: Currency::Irr,
            total_amount: 0,
            phone_number: String::new(),
            notes: String::new(),
            tracking_code: None,
            shipping_method: bazaar_checkout::ShippingMethodId::StandardPost,
            shipping_cost: 0,
            discount_amount: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(order.can_cancel());
        assert!(order.can_ship());
        assert!(!order.can_deliver());
    }
}
