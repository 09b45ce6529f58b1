use async_trait::async_trait;
use bazaar_core::{
    ChargeOutcome, ChargeRequest, GatewayError, PaymentGateway, VerificationRequest,
    VerifyOutcome,
};
use serde_json::json;

pub const GATEWAY_NAME: &str = "offline";

/// Manual-payment gateway: no provider round-trip. The attempt is
/// accepted locally and verification reflects the administrative
/// decision carried in the callback.
pub struct OfflineGateway;

#[async_trait]
impl PaymentGateway for OfflineGateway {
    fn name(&self) -> &'static str {
        GATEWAY_NAME
    }

    async fn request_payment(
        &self,
        charge: &ChargeRequest,
    ) -> Result<ChargeOutcome, GatewayError> {
        Ok(ChargeOutcome {
            approved: true,
            authority: Some(format!("OFFLINE-{}", charge.payment_id.simple())),
            provider_status: "ACCEPTED".to_string(),
            message: None,
            raw_response: json!({ "gateway": GATEWAY_NAME }),
        })
    }

    async fn verify_payment(
        &self,
        verification: &VerificationRequest,
    ) -> Result<VerifyOutcome, GatewayError> {
        // Reconciliation only reaches this point for an approved
        // callback; the approval itself is the verification.
        Ok(VerifyOutcome {
            verified: true,
            transaction_id: Some(verification.authority.clone()),
            provider_status: "APPROVED".to_string(),
            message: None,
            raw_response: json!({ "gateway": GATEWAY_NAME }),
        })
    }

    fn payment_url(&self, _authority: &str) -> String {
        // There is nowhere to redirect to; the customer uploads a receipt
        // instead.
        String::new()
    }
}
