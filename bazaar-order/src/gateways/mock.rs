use async_trait::async_trait;
use bazaar_core::{
    ChargeOutcome, ChargeRequest, GatewayError, PaymentGateway, VerificationRequest,
    VerifyOutcome,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const GATEWAY_NAME: &str = "mock";

/// Scripted gateway for tests: flip the flags to exercise declines and
/// outages without a provider.
#[derive(Default)]
pub struct MockGateway {
    pub decline_requests: bool,
    pub decline_verifications: bool,
    pub fail_communication: bool,
    request_calls: AtomicUsize,
    verify_calls: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declining() -> Self {
        Self {
            decline_requests: true,
            decline_verifications: true,
            ..Self::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            fail_communication: true,
            ..Self::default()
        }
    }

    pub fn request_calls(&self) -> usize {
        self.request_calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &'static str {
        GATEWAY_NAME
    }

    async fn request_payment(
        &self,
        charge: &ChargeRequest,
    ) -> Result<ChargeOutcome, GatewayError> {
        self.request_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_communication {
            return Err(GatewayError::Communication(
                "simulated gateway outage".to_string(),
            ));
        }

        if self.decline_requests {
            return Ok(ChargeOutcome {
                approved: false,
                authority: None,
                provider_status: "-1".to_string(),
                message: Some("simulated decline".to_string()),
                raw_response: json!({ "code": -1 }),
            });
        }

        Ok(ChargeOutcome {
            approved: true,
            authority: Some(format!("MOCK-{}", charge.payment_id.simple())),
            provider_status: "100".to_string(),
            message: None,
            raw_response: json!({ "code": 100 }),
        })
    }

    async fn verify_payment(
        &self,
        _verification: &VerificationRequest,
    ) -> Result<VerifyOutcome, GatewayError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_communication {
            return Err(GatewayError::Communication(
                "simulated gateway outage".to_string(),
            ));
        }

        if self.decline_verifications {
            return Ok(VerifyOutcome {
                verified: false,
                transaction_id: None,
                provider_status: "-53".to_string(),
                message: Some("simulated verification failure".to_string()),
                raw_response: json!({ "code": -53 }),
            });
        }

        Ok(VerifyOutcome {
            verified: true,
            transaction_id: Some("12345".to_string()),
            provider_status: "100".to_string(),
            message: None,
            raw_response: json!({ "code": 100, "ref_id": 12345 }),
        })
    }

    fn payment_url(&self, authority: &str) -> String {
        format!("https://gateway.example/pay/{authority}")
    }
}
