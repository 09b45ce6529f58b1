use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderPlacedEvent {
    pub order_id: Uuid,
    pub cart_id: Uuid,
    pub user_id: Option<String>,
    pub total_amount: i64,
    pub items_count: usize,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderStatusChangedEvent {
    pub order_id: Uuid,
    pub from_status: String,
    pub to_status: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct PaymentCompletedEvent {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub gateway: String,
    pub amount: i64,
    pub transaction_id: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct InvoiceIssuedEvent {
    pub invoice_id: Uuid,
    pub order_id: Uuid,
    pub invoice_number: String,
    pub total_amount: i64,
    pub timestamp: i64,
}
