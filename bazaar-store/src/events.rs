use bazaar_shared::models::events::{
    InvoiceIssuedEvent, OrderPlacedEvent, OrderStatusChangedEvent, PaymentCompletedEvent,
};
use tracing::info;

/// Structured telemetry sink. Events go to the tracing pipeline under a
/// dedicated target so they can be filtered or shipped independently of
/// application logs.
#[derive(Clone, Default)]
pub struct EventLog;

const TARGET: &str = "bazaar::events";

impl EventLog {
    pub fn new() -> Self {
        Self
    }

    pub fn order_placed(&self, event: &OrderPlacedEvent) {
        info!(
            target: TARGET,
            order_id = %event.order_id,
            cart_id = %event.cart_id,
            total = event.total_amount,
            items = event.items_count,
            "order_placed"
        );
    }

    pub fn order_status_changed(&self, event: &OrderStatusChangedEvent) {
        info!(
            target: TARGET,
            order_id = %event.order_id,
            from = %event.from_status,
            to = %event.to_status,
            "order_status_changed"
        );
    }

    pub fn payment_completed(&self, event: &PaymentCompletedEvent) {
        info!(
            target: TARGET,
            payment_id = %event.payment_id,
            order_id = %event.order_id,
            gateway = %event.gateway,
            amount = event.amount,
            "payment_completed"
        );
    }

    pub fn invoice_issued(&self, event: &InvoiceIssuedEvent) {
        info!(
            target: TARGET,
            invoice_id = %event.invoice_id,
            order_id = %event.order_id,
            invoice_number = %event.invoice_number,
            "invoice_issued"
        );
    }
}
