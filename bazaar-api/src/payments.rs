use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bazaar_order::models::PaymentStatus;
use bazaar_order::reconciliation::{CallbackData, PaymentError};
use bazaar_shared::models::events::PaymentCompletedEvent;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RequestPaymentRequest {
    #[serde(default)]
    pub gateway: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitReceiptRequest {
    pub receipt_reference: String,
}

#[derive(Debug, Deserialize)]
pub struct ApprovePaymentRequest {
    pub approved: bool,
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub status: PaymentStatus,
    pub amount: i64,
    pub gateway: String,
    pub reference_id: Option<String>,
    pub transaction_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// POST /v1/orders/{id}/payments
pub async fn request_payment(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<RequestPaymentRequest>,
) -> Result<Response, AppError> {
    let result = state
        .payments
        .request_payment(order_id, req.gateway.as_deref())
        .await?;

    if result.success {
        Ok(Json(json!({
            "success": true,
            "payment_id": result.payment_id,
            "gateway": result.gateway,
            "authority": result.authority,
            "payment_url": result.redirect_url,
        }))
        .into_response())
    } else {
        Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "payment_id": result.payment_id,
                "gateway": result.gateway,
                "error": result.error_message,
            })),
        )
            .into_response())
    }
}

/// GET /v1/payments/{id}
pub async fn payment_status(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentStatusResponse>, AppError> {
    let payment = state.payments.get_payment(payment_id).await?;

    Ok(Json(PaymentStatusResponse {
        payment_id: payment.id,
        order_id: payment.order_id,
        status: payment.status,
        amount: payment.amount,
        gateway: payment.gateway,
        reference_id: payment.reference_id,
        transaction_id: payment.transaction_id,
        created_at: payment.created_at,
        updated_at: payment.updated_at,
    }))
}

/// GET /v1/payments/{id}/callback?Authority=..&Status=..
///
/// Inbound from the provider; must tolerate replays for the same
/// transaction.
pub async fn payment_callback(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    Query(callback): Query<CallbackData>,
) -> Result<Response, AppError> {
    match state.payments.verify_payment(payment_id, callback, None).await {
        Ok(result) if result.success => {
            let payment = state.payments.get_payment(payment_id).await?;
            state.events.payment_completed(&PaymentCompletedEvent {
                payment_id: payment.id,
                order_id: payment.order_id,
                gateway: payment.gateway.clone(),
                amount: payment.amount,
                transaction_id: payment.transaction_id.clone(),
                timestamp: Utc::now().timestamp(),
            });

            Ok(Json(json!({
                "status": "success",
                "payment_id": result.payment_id,
                "order_id": payment.order_id,
                "ref_id": result.reference_id,
            }))
            .into_response())
        }
        Ok(result) => Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "status": "failed",
                "payment_id": result.payment_id,
                "message": result.message,
            })),
        )
            .into_response()),
        // Replayed callback for a settled payment: benign success.
        Err(PaymentError::AlreadyVerified) => {
            let payment = state.payments.get_payment(payment_id).await?;
            Ok(Json(json!({
                "status": "success",
                "payment_id": payment.id,
                "order_id": payment.order_id,
                "ref_id": payment.transaction_id,
                "message": "Payment was already verified",
            }))
            .into_response())
        }
        Err(err) => Err(err.into()),
    }
}

/// POST /v1/orders/{id}/receipt
pub async fn submit_receipt(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(req): Json<SubmitReceiptRequest>,
) -> Result<Json<PaymentStatusResponse>, AppError> {
    let payment = state
        .payments
        .submit_receipt(order_id, &req.receipt_reference)
        .await?;

    Ok(Json(PaymentStatusResponse {
        payment_id: payment.id,
        order_id: payment.order_id,
        status: payment.status,
        amount: payment.amount,
        gateway: payment.gateway,
        reference_id: payment.reference_id,
        transaction_id: payment.transaction_id,
        created_at: payment.created_at,
        updated_at: payment.updated_at,
    }))
}

/// POST /v1/payments/{id}/approve
///
/// Administrative decision on a manual payment. Approval drives the
/// AWAITING_VERIFICATION -> CONFIRMED transition through the usual
/// verification path.
pub async fn approve_payment(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
    Json(req): Json<ApprovePaymentRequest>,
) -> Result<Response, AppError> {
    let callback = CallbackData {
        authority: None,
        status: Some(if req.approved { "OK" } else { "REJECTED" }.to_string()),
    };

    payment_callback(State(state), Path(payment_id), Query(callback)).await
}
