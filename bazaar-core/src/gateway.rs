use async_trait::async_trait;
use bazaar_shared::Currency;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outbound charge request handed to a gateway. Owned by this crate so
/// gateway implementations never depend on order storage types.
#[derive(Debug, Clone, Serialize)]
pub struct ChargeRequest {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    pub amount: i64,
    pub currency: Currency,
    pub description: String,
    pub callback_url: String,
    pub mobile: Option<String>,
    pub email: Option<String>,
}

/// Provider answer to a charge request. A well-formed decline is an
/// `approved: false` outcome, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeOutcome {
    pub approved: bool,
    /// Provider token identifying this attempt; used to correlate the
    /// later verification call.
    pub authority: Option<String>,
    pub provider_status: String,
    pub message: Option<String>,
    pub raw_response: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationRequest {
    pub payment_id: Uuid,
    pub authority: String,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyOutcome {
    pub verified: bool,
    /// Final provider reference, present only when verified.
    pub transaction_id: Option<String>,
    pub provider_status: String,
    pub message: Option<String>,
    pub raw_response: serde_json::Value,
}

/// Infrastructure-class failures only. Business declines travel inside
/// the outcome types.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway communication failed: {0}")]
    Communication(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Registry key for this gateway.
    fn name(&self) -> &'static str;

    /// Ask the provider to open a payment attempt.
    async fn request_payment(
        &self,
        charge: &ChargeRequest,
    ) -> Result<ChargeOutcome, GatewayError>;

    /// Confirm a payment attempt after the provider callback.
    async fn verify_payment(
        &self,
        verification: &VerificationRequest,
    ) -> Result<VerifyOutcome, GatewayError>;

    /// Redirect URL the customer is sent to for this authority.
    fn payment_url(&self, authority: &str) -> String;
}

impl std::fmt::Debug for dyn PaymentGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGateway")
            .field("name", &self.name())
            .finish()
    }
}
