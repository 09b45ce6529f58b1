use std::collections::HashMap;
use std::sync::Arc;

use crate::gateway::PaymentGateway;

/// Gateway lookup built once at startup and passed by reference.
/// Registration keys on `PaymentGateway::name`, so new providers plug in
/// by conformance without touching this type.
pub struct GatewayRegistry {
    gateways: HashMap<String, Arc<dyn PaymentGateway>>,
    default: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("payment gateway '{0}' not found")]
    UnknownGateway(String),
}

impl GatewayRegistry {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            gateways: HashMap::new(),
            default: default.into(),
        }
    }

    pub fn register(&mut self, gateway: Arc<dyn PaymentGateway>) {
        self.gateways.insert(gateway.name().to_string(), gateway);
    }

    /// Resolve a gateway by name, falling back to the configured default.
    pub fn resolve(
        &self,
        name: Option<&str>,
    ) -> Result<Arc<dyn PaymentGateway>, RegistryError> {
        let name = name.unwrap_or(&self.default);
        self.gateways
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownGateway(name.to_string()))
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    pub fn names(&self) -> Vec<&str> {
        self.gateways.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{
        ChargeOutcome, ChargeRequest, GatewayError, VerificationRequest, VerifyOutcome,
    };
    use async_trait::async_trait;

    struct NullGateway;

    #[async_trait]
    impl PaymentGateway for NullGateway {
        fn name(&self) -> &'static str {
            "null"
        }

        async fn request_payment(
            &self,
            _charge: &ChargeRequest,
        ) -> Result<ChargeOutcome, GatewayError> {
            Ok(ChargeOutcome {
                approved: true,
                authority: Some("A0".to_string()),
                provider_status: "100".to_string(),
                message: None,
                raw_response: serde_json::json!({}),
            })
        }

        async fn verify_payment(
            &self,
            _verification: &VerificationRequest,
        ) -> Result<VerifyOutcome, GatewayError> {
            Ok(VerifyOutcome {
                verified: true,
                transaction_id: Some("1".to_string()),
                provider_status: "100".to_string(),
                message: None,
                raw_response: serde_json::json!({}),
            })
        }

        fn payment_url(&self, authority: &str) -> String {
            format!("https://example.invalid/pay/{authority}")
        }
    }

    #[test]
    fn resolves_default_when_no_name_given() {
        let mut registry = GatewayRegistry::new("null");
        registry.register(Arc::new(NullGateway));

        let gateway = registry.resolve(None).unwrap();
        assert_eq!(gateway.name(), "null");
    }

    #[test]
    fn unknown_name_is_an_error() {
        let mut registry = GatewayRegistry::new("null");
        registry.register(Arc::new(NullGateway));

        let err = registry.resolve(Some("missing")).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownGateway(name) if name == "missing"));
    }
}
