use bazaar_catalog::ProductStore;
use bazaar_core::StoreError;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::Invoice;
use crate::repository::{InvoiceStore, NewInvoice, NewInvoiceItem, OrderStore};

pub const INVOICE_NUMBER_PREFIX: &str = "INV";
pub const INVOICE_NUMBER_WIDTH: usize = 6;

/// `INV` + zero-padded sequence, e.g. `INV000042`.
pub fn format_invoice_number(sequence: u64) -> String {
    format!(
        "{INVOICE_NUMBER_PREFIX}{sequence:0width$}",
        width = INVOICE_NUMBER_WIDTH
    )
}

/// Numeric suffix of a well-formed invoice number.
pub fn parse_invoice_number(number: &str) -> Option<u64> {
    number.strip_prefix(INVOICE_NUMBER_PREFIX)?.parse().ok()
}

#[derive(Debug, thiserror::Error)]
pub enum InvoiceError {
    #[error("order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("product not found: {0}")]
    ProductNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Produces the immutable invoice snapshot after a payment completes.
/// Invoked explicitly at the end of successful verification rather than
/// from a save hook, so the happens-after ordering and the idempotency
/// guard live in one auditable place.
pub struct InvoiceGenerator {
    orders: Arc<dyn OrderStore>,
    products: Arc<dyn ProductStore>,
    invoices: Arc<dyn InvoiceStore>,
}

impl InvoiceGenerator {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        products: Arc<dyn ProductStore>,
        invoices: Arc<dyn InvoiceStore>,
    ) -> Self {
        Self {
            orders,
            products,
            invoices,
        }
    }

    pub async fn invoice_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<Invoice>, InvoiceError> {
        Ok(self.invoices.invoice_for_order(order_id).await?)
    }

    pub async fn invoice_items(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<crate::models::InvoiceItem>, InvoiceError> {
        Ok(self.invoices.invoice_items(invoice_id).await?)
    }

    /// Generate the invoice for an order, or return the existing one.
    /// Safe to call more than once for the same order; the store also
    /// re-checks inside its critical section so a racing duplicate signal
    /// cannot double-create.
    pub async fn generate_invoice(&self, order_id: Uuid) -> Result<Invoice, InvoiceError> {
        if let Some(existing) = self.invoices.invoice_for_order(order_id).await? {
            return Ok(existing);
        }

        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or(InvoiceError::OrderNotFound(order_id))?;
        let order_items = self.orders.order_items(order_id).await?;
        let shipping = self.orders.shipping_info(order_id).await?;

        let mut items = Vec::with_capacity(order_items.len());
        for item in &order_items {
            let product = self
                .products
                .get_product(item.product_id)
                .await?
                .ok_or(InvoiceError::ProductNotFound(item.product_id))?;

            items.push(NewInvoiceItem {
                product_title: product.title,
                product_sku: product.sku,
                quantity: item.quantity,
                price: item.price,
            });
        }

        let invoice = self
            .invoices
            .create_invoice(NewInvoice {
                order_id,
                total_amount: order.total_amount,
                currency: order.currency,
                shipping_address: shipping
                    .map(|info| info.display_address())
                    .unwrap_or_default(),
                phone_number: order.phone_number.clone(),
                items,
            })
            .await?;

        tracing::info!(
            order_id = %order_id,
            invoice_number = %invoice.invoice_number,
            total = invoice.total_amount,
            "invoice generated"
        );

        Ok(invoice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_invoice_number(1), "INV000001");
        assert_eq!(format_invoice_number(42), "INV000042");
        assert_eq!(format_invoice_number(1_234_567), "INV1234567");
    }

    #[test]
    fn test_number_parsing() {
        assert_eq!(parse_invoice_number("INV000041"), Some(41));
        assert_eq!(parse_invoice_number("INV1234567"), Some(1234567));
        assert_eq!(parse_invoice_number("X000041"), None);
        assert_eq!(parse_invoice_number("INVabc"), None);
    }
}
