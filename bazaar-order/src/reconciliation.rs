use bazaar_core::{
    ChargeRequest, GatewayError, GatewayRegistry, RegistryError, StoreError,
    VerificationRequest,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::invoice::InvoiceGenerator;
use crate::lifecycle::InvalidTransition;
use crate::models::{Order, OrderStatus, Payment, PaymentStatus, PaymentTransaction};
use crate::repository::PaymentStore;
use crate::service::{OrderError, OrderService};

/// Inbound callback payload from a gateway redirect. Field names follow
/// the provider convention (`Authority`/`Status`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackData {
    #[serde(rename = "Authority")]
    pub authority: Option<String>,
    #[serde(rename = "Status")]
    pub status: Option<String>,
}

impl CallbackData {
    pub fn ok(authority: impl Into<String>) -> Self {
        Self {
            authority: Some(authority.into()),
            status: Some("OK".to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status.as_deref() == Some("OK")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentRequestResult {
    pub success: bool,
    pub payment_id: Uuid,
    pub gateway: String,
    pub authority: Option<String>,
    pub redirect_url: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub success: bool,
    pub payment_id: Uuid,
    pub status: PaymentStatus,
    pub reference_id: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("payment not found: {0}")]
    NotFound(Uuid),

    #[error("payment can only be requested for payable orders, order is {status}")]
    InvalidOrderState { status: OrderStatus },

    #[error("payment has already been verified")]
    AlreadyVerified,

    #[error(transparent)]
    UnknownGateway(#[from] RegistryError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<OrderError> for PaymentError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NotFound(id) => PaymentError::OrderNotFound(id),
            OrderError::Transition(t) => PaymentError::Transition(t),
            OrderError::Store(e) => PaymentError::Store(e),
            other => PaymentError::Store(StoreError::Backend(other.to_string())),
        }
    }
}

/// Orchestrates gateway calls and keeps Payment and Order state
/// reconciled. Every gateway round-trip is bracketed by audit rows, and
/// the network call itself always happens between store operations,
/// never inside one.
pub struct PaymentService {
    orders: Arc<OrderService>,
    payments: Arc<dyn PaymentStore>,
    invoices: Arc<InvoiceGenerator>,
    gateways: Arc<GatewayRegistry>,
    callback_base_url: String,
}

impl PaymentService {
    pub fn new(
        orders: Arc<OrderService>,
        payments: Arc<dyn PaymentStore>,
        invoices: Arc<InvoiceGenerator>,
        gateways: Arc<GatewayRegistry>,
        callback_base_url: impl Into<String>,
    ) -> Self {
        Self {
            orders,
            payments,
            invoices,
            gateways,
            callback_base_url: callback_base_url.into(),
        }
    }

    /// Orders a payment attempt may be opened against. PROCESSING is
    /// included so a customer whose previous attempt failed can retry.
    fn is_payable(status: OrderStatus) -> bool {
        matches!(status, OrderStatus::Pending | OrderStatus::Processing)
    }

    /// Open (or re-open) a payment attempt for an order and return the
    /// gateway redirect. A well-formed gateway decline comes back as an
    /// unsuccessful result, not an error; only infrastructure failures
    /// propagate, and those still leave a FAILED audit trail behind.
    pub async fn request_payment(
        &self,
        order_id: Uuid,
        gateway_name: Option<&str>,
    ) -> Result<PaymentRequestResult, PaymentError> {
        let order = self.orders.get_order(order_id).await?;

        if !Self::is_payable(order.status) {
            return Err(PaymentError::InvalidOrderState {
                status: order.status,
            });
        }

        let gateway = self.gateways.resolve(gateway_name)?;
        let mut payment = self.reuse_or_create_payment(&order, gateway.name()).await?;

        let charge = ChargeRequest {
            payment_id: payment.id,
            order_id: order.id,
            amount: payment.amount,
            currency: payment.currency,
            description: format!("Payment for order {}", order.id),
            callback_url: format!(
                "{}/v1/payments/{}/callback",
                self.callback_base_url, payment.id
            ),
            mobile: Some(order.phone_number.clone()),
            email: None,
        };

        let audit = PaymentTransaction::request(
            payment.id,
            payment.amount,
            serde_json::to_value(&charge).unwrap_or_default(),
        );
        let audit_id = audit.id;
        self.payments.insert_transaction(audit).await?;

        // Network round-trip; no store locks are held here.
        let outcome = match gateway.request_payment(&charge).await {
            Ok(outcome) => outcome,
            Err(GatewayError::Communication(message)) => {
                self.record_communication_failure(&mut payment, audit_id, &message)
                    .await?;
                tracing::error!(
                    order_id = %order.id,
                    payment_id = %payment.id,
                    gateway = gateway.name(),
                    error = %message,
                    "payment request failed to reach gateway"
                );
                return Err(GatewayError::Communication(message).into());
            }
        };

        self.payments
            .attach_transaction_result(
                audit_id,
                outcome.raw_response.clone(),
                Some(outcome.provider_status.clone()),
                None,
            )
            .await?;

        if !outcome.approved || outcome.authority.is_none() {
            payment.status = PaymentStatus::Failed;
            self.payments.update_payment(&payment).await?;

            tracing::warn!(
                order_id = %order.id,
                payment_id = %payment.id,
                gateway = gateway.name(),
                provider_status = %outcome.provider_status,
                "payment request declined by gateway"
            );

            return Ok(PaymentRequestResult {
                success: false,
                payment_id: payment.id,
                gateway: gateway.name().to_string(),
                authority: None,
                redirect_url: None,
                error_message: outcome
                    .message
                    .or_else(|| Some("Payment request failed".to_string())),
            });
        }

        let authority = outcome.authority.unwrap_or_default();
        payment.reference_id = Some(authority.clone());
        payment.status = PaymentStatus::Processing;
        self.payments.update_payment(&payment).await?;

        // Idempotent when a retry finds the order already in PROCESSING.
        self.orders
            .transition(order.id, OrderStatus::Processing, None)
            .await?;

        let url = gateway.payment_url(&authority);
        tracing::info!(
            order_id = %order.id,
            payment_id = %payment.id,
            gateway = gateway.name(),
            "payment requested"
        );

        Ok(PaymentRequestResult {
            success: true,
            payment_id: payment.id,
            gateway: gateway.name().to_string(),
            authority: Some(authority),
            redirect_url: (!url.is_empty()).then_some(url),
            error_message: None,
        })
    }

    /// Confirm a payment after the provider callback. Replayed callbacks
    /// for an already-completed payment fail with `AlreadyVerified`,
    /// which callers treat as a benign no-op.
    pub async fn verify_payment(
        &self,
        payment_id: Uuid,
        callback: CallbackData,
        gateway_name: Option<&str>,
    ) -> Result<VerificationResult, PaymentError> {
        let mut payment = self
            .payments
            .get_payment(payment_id)
            .await?
            .ok_or(PaymentError::NotFound(payment_id))?;

        if payment.status == PaymentStatus::Completed {
            return Err(PaymentError::AlreadyVerified);
        }

        // A non-OK callback is the customer abandoning the gateway page,
        // not a workflow failure. The order keeps its state so a fresh
        // attempt can be requested.
        if !callback.is_ok() {
            payment.status = PaymentStatus::Failed;
            self.payments.update_payment(&payment).await?;

            return Ok(VerificationResult {
                success: false,
                payment_id: payment.id,
                status: payment.status,
                reference_id: None,
                message: Some("Payment was canceled by user".to_string()),
            });
        }

        // The gateway that opened the attempt does the verification,
        // unless explicitly overridden.
        let resolved_name = gateway_name.unwrap_or(&payment.gateway);
        let gateway = self.gateways.resolve(Some(resolved_name))?;

        let authority = callback
            .authority
            .clone()
            .or_else(|| payment.reference_id.clone());
        let Some(authority) = authority else {
            return Ok(VerificationResult {
                success: false,
                payment_id: payment.id,
                status: payment.status,
                reference_id: None,
                message: Some("Missing payment authority".to_string()),
            });
        };

        let verification = VerificationRequest {
            payment_id: payment.id,
            authority,
            amount: payment.amount,
        };

        let audit = PaymentTransaction::request(
            payment.id,
            payment.amount,
            serde_json::to_value(&verification).unwrap_or_default(),
        );
        let audit_id = audit.id;
        self.payments.insert_transaction(audit).await?;

        let outcome = match gateway.verify_payment(&verification).await {
            Ok(outcome) => outcome,
            Err(GatewayError::Communication(message)) => {
                self.record_communication_failure(&mut payment, audit_id, &message)
                    .await?;
                tracing::error!(
                    order_id = %payment.order_id,
                    payment_id = %payment.id,
                    gateway = gateway.name(),
                    error = %message,
                    "payment verification failed to reach gateway"
                );
                return Err(GatewayError::Communication(message).into());
            }
        };

        self.payments
            .attach_transaction_result(
                audit_id,
                outcome.raw_response.clone(),
                Some(outcome.provider_status.clone()),
                outcome.transaction_id.clone(),
            )
            .await?;

        if !outcome.verified {
            payment.status = PaymentStatus::Failed;
            self.payments.update_payment(&payment).await?;

            return Ok(VerificationResult {
                success: false,
                payment_id: payment.id,
                status: payment.status,
                reference_id: None,
                message: outcome
                    .message
                    .or_else(|| Some("Payment verification failed".to_string())),
            });
        }

        payment.status = PaymentStatus::Completed;
        payment.transaction_id = outcome.transaction_id.clone();
        self.payments.update_payment(&payment).await?;

        // Through the state machine, never a direct status write. Covers
        // both the gateway path (PROCESSING -> CONFIRMED) and the manual
        // path (AWAITING_VERIFICATION -> CONFIRMED).
        self.orders
            .transition(
                payment.order_id,
                OrderStatus::Confirmed,
                Some("payment completed".to_string()),
            )
            .await?;

        tracing::info!(
            order_id = %payment.order_id,
            payment_id = %payment.id,
            gateway = gateway.name(),
            transaction_id = outcome.transaction_id.as_deref().unwrap_or("-"),
            "payment completed"
        );

        // Invoice generation happens-after the completed payment is
        // durable. A failure here must not fail the payment; the invoice
        // is retried out-of-band.
        if let Err(err) = self.invoices.generate_invoice(payment.order_id).await {
            tracing::error!(
                order_id = %payment.order_id,
                payment_id = %payment.id,
                error = %err,
                "invoice generation failed after payment completion"
            );
        }

        Ok(VerificationResult {
            success: true,
            payment_id: payment.id,
            status: PaymentStatus::Completed,
            reference_id: outcome.transaction_id,
            message: None,
        })
    }

    /// Manual-payment path: bind an uploaded receipt to a fresh payment
    /// attempt and park the order in AWAITING_VERIFICATION until an
    /// administrator approves or rejects it.
    pub async fn submit_receipt(
        &self,
        order_id: Uuid,
        receipt_reference: &str,
    ) -> Result<Payment, PaymentError> {
        let order = self.orders.get_order(order_id).await?;

        if order.status != OrderStatus::Pending {
            return Err(PaymentError::InvalidOrderState {
                status: order.status,
            });
        }

        let mut payment = self
            .reuse_or_create_payment(&order, crate::gateways::offline::GATEWAY_NAME)
            .await?;
        payment.reference_id = Some(format!("RCPT-{}", payment.id.simple()));

        let audit = PaymentTransaction::request(
            payment.id,
            payment.amount,
            serde_json::json!({ "receipt": receipt_reference }),
        )
        .with_receipt(receipt_reference);
        self.payments.insert_transaction(audit).await?;

        payment.status = PaymentStatus::Processing;
        self.payments.update_payment(&payment).await?;

        self.orders
            .transition(
                order.id,
                OrderStatus::AwaitingVerification,
                Some("manual payment receipt submitted".to_string()),
            )
            .await?;

        tracing::info!(
            order_id = %order.id,
            payment_id = %payment.id,
            "manual payment receipt submitted"
        );

        Ok(payment)
    }

    pub async fn get_payment(&self, payment_id: Uuid) -> Result<Payment, PaymentError> {
        self.payments
            .get_payment(payment_id)
            .await?
            .ok_or(PaymentError::NotFound(payment_id))
    }

    pub async fn payments_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<Payment>, PaymentError> {
        Ok(self.payments.payments_for_order(order_id).await?)
    }

    /// Reuse the order's open PENDING attempt if one exists, otherwise
    /// create a fresh one for the full order amount.
    async fn reuse_or_create_payment(
        &self,
        order: &Order,
        gateway: &str,
    ) -> Result<Payment, PaymentError> {
        let existing = self
            .payments
            .payments_for_order(order.id)
            .await?
            .into_iter()
            .find(|payment| payment.status == PaymentStatus::Pending);

        if let Some(mut payment) = existing {
            if payment.gateway != gateway {
                payment.gateway = gateway.to_string();
                self.payments.update_payment(&payment).await?;
            }
            return Ok(payment);
        }

        let payment = Payment::new(order.id, order.total_amount, order.currency, gateway);
        self.payments.insert_payment(payment.clone()).await?;
        Ok(payment)
    }

    async fn record_communication_failure(
        &self,
        payment: &mut Payment,
        audit_id: Uuid,
        message: &str,
    ) -> Result<(), PaymentError> {
        self.payments
            .attach_transaction_result(
                audit_id,
                serde_json::json!({ "error": message }),
                Some("COMMUNICATION_ERROR".to_string()),
                None,
            )
            .await?;

        payment.status = PaymentStatus::Failed;
        self.payments.update_payment(payment).await?;
        Ok(())
    }
}
