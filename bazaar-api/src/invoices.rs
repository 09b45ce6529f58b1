use axum::{
    extract::{Path, State},
    Json,
};
use bazaar_order::models::{Invoice, PaymentStatus};
use bazaar_shared::models::events::InvoiceIssuedEvent;
use bazaar_shared::Currency;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct InvoiceItemResponse {
    pub product_title: String,
    pub product_sku: String,
    pub quantity: u32,
    pub price: i64,
    pub total_price: i64,
}

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub invoice_number: String,
    pub total_amount: i64,
    pub currency: Currency,
    pub shipping_address: String,
    pub phone_number: String,
    pub items: Vec<InvoiceItemResponse>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

async fn invoice_response(
    state: &AppState,
    invoice: Invoice,
) -> Result<Json<InvoiceResponse>, AppError> {
    let items = state.invoices.invoice_items(invoice.id).await?;

    Ok(Json(InvoiceResponse {
        id: invoice.id,
        order_id: invoice.order_id,
        invoice_number: invoice.invoice_number,
        total_amount: invoice.total_amount,
        currency: invoice.currency,
        shipping_address: invoice.shipping_address,
        phone_number: invoice.phone_number,
        items: items
            .into_iter()
            .map(|item| InvoiceItemResponse {
                total_price: item.total_price(),
                product_title: item.product_title,
                product_sku: item.product_sku,
                quantity: item.quantity,
                price: item.price,
            })
            .collect(),
        created_at: invoice.created_at,
    }))
}

/// GET /v1/orders/{id}/invoice
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let invoice = state
        .invoices
        .invoice_for_order(order_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("no invoice for order {order_id}")))?;
    invoice_response(&state, invoice).await
}

/// POST /v1/orders/{id}/invoice
///
/// Out-of-band retry for an invoice that failed to generate after a
/// completed payment. Idempotent: an existing invoice is returned as-is.
pub async fn regenerate_invoice(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let has_completed_payment = state
        .payments
        .payments_for_order(order_id)
        .await?
        .iter()
        .any(|payment| payment.status == PaymentStatus::Completed);

    if !has_completed_payment {
        return Err(AppError::bad_request(
            "NO_COMPLETED_PAYMENT",
            format!("order {order_id} has no completed payment to invoice"),
        ));
    }

    let existing = state.invoices.invoice_for_order(order_id).await?;
    let invoice = state.invoices.generate_invoice(order_id).await?;

    if existing.is_none() {
        state.events.invoice_issued(&InvoiceIssuedEvent {
            invoice_id: invoice.id,
            order_id,
            invoice_number: invoice.invoice_number.clone(),
            total_amount: invoice.total_amount,
            timestamp: Utc::now().timestamp(),
        });
    }

    invoice_response(&state, invoice).await
}
