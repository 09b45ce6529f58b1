use async_trait::async_trait;
use bazaar_core::{
    ChargeOutcome, ChargeRequest, GatewayError, PaymentGateway, VerificationRequest,
    VerifyOutcome,
};
use serde_json::{json, Value};
use std::time::Duration;

pub const GATEWAY_NAME: &str = "zarinpal";

const SANDBOX_API_BASE: &str = "https://sandbox.zarinpal.com/pg/v4/payment";
const SANDBOX_START_PAY: &str = "https://sandbox.zarinpal.com/pg/StartPay";
const LIVE_API_BASE: &str = "https://payment.zarinpal.com/pg/v4/payment";
const LIVE_START_PAY: &str = "https://www.zarinpal.com/pg/StartPay";

/// `code == 100` marks a successful request or first verification;
/// `code == 101` is a verification replay the provider already settled.
const CODE_OK: i64 = 100;
const CODE_ALREADY_VERIFIED: i64 = 101;

#[derive(Debug, Clone)]
pub struct ZarinpalConfig {
    pub merchant_id: String,
    pub sandbox: bool,
    /// Finite timeout for every provider round-trip; an elapsed timeout
    /// is reported as a communication failure.
    pub timeout: Duration,
}

/// Zarinpal IPG integration over the v4 REST API.
pub struct ZarinpalGateway {
    client: reqwest::Client,
    merchant_id: String,
    api_base: &'static str,
    start_pay_base: &'static str,
}

impl ZarinpalGateway {
    pub fn new(config: ZarinpalConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| GatewayError::Communication(err.to_string()))?;

        let (api_base, start_pay_base) = if config.sandbox {
            (SANDBOX_API_BASE, SANDBOX_START_PAY)
        } else {
            (LIVE_API_BASE, LIVE_START_PAY)
        };

        Ok(Self {
            client,
            merchant_id: config.merchant_id,
            api_base,
            start_pay_base,
        })
    }

    async fn post(&self, url: &str, body: &Value) -> Result<Value, GatewayError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|err| GatewayError::Communication(err.to_string()))?;

        response
            .json::<Value>()
            .await
            .map_err(|err| GatewayError::Communication(err.to_string()))
    }

    fn response_code(body: &Value) -> i64 {
        body["data"]["code"].as_i64().unwrap_or_default()
    }

    fn error_message(body: &Value) -> Option<String> {
        body["errors"]["message"]
            .as_str()
            .or_else(|| body["data"]["message"].as_str())
            .map(str::to_string)
    }
}

#[async_trait]
impl PaymentGateway for ZarinpalGateway {
    fn name(&self) -> &'static str {
        GATEWAY_NAME
    }

    async fn request_payment(
        &self,
        charge: &ChargeRequest,
    ) -> Result<ChargeOutcome, GatewayError> {
        let body = json!({
            "merchant_id": self.merchant_id,
            "amount": charge.amount,
            "currency": charge.currency.to_string(),
            "description": charge.description,
            "callback_url": charge.callback_url,
            "metadata": {
                "mobile": charge.mobile,
                "email": charge.email,
                "order_id": charge.order_id.to_string(),
            },
        });

        let response = self.post(&format!("{}/request.json", self.api_base), &body).await?;
        let code = Self::response_code(&response);

        if code == CODE_OK {
            let authority = response["data"]["authority"]
                .as_str()
                .map(str::to_string);
            Ok(ChargeOutcome {
                approved: authority.is_some(),
                authority,
                provider_status: code.to_string(),
                message: None,
                raw_response: response,
            })
        } else {
            Ok(ChargeOutcome {
                approved: false,
                authority: None,
                provider_status: code.to_string(),
                message: Self::error_message(&response),
                raw_response: response,
            })
        }
    }

    async fn verify_payment(
        &self,
        verification: &VerificationRequest,
    ) -> Result<VerifyOutcome, GatewayError> {
        let body = json!({
            "merchant_id": self.merchant_id,
            "amount": verification.amount,
            "authority": verification.authority,
        });

        let response = self.post(&format!("{}/verify.json", self.api_base), &body).await?;
        let code = Self::response_code(&response);

        if code == CODE_OK || code == CODE_ALREADY_VERIFIED {
            let ref_id = match &response["data"]["ref_id"] {
                Value::Number(n) => Some(n.to_string()),
                Value::String(s) => Some(s.clone()),
                _ => None,
            };
            Ok(VerifyOutcome {
                verified: true,
                transaction_id: ref_id,
                provider_status: code.to_string(),
                message: None,
                raw_response: response,
            })
        } else {
            Ok(VerifyOutcome {
                verified: false,
                transaction_id: None,
                provider_status: code.to_string(),
                message: Self::error_message(&response),
                raw_response: response,
            })
        }
    }

    fn payment_url(&self, authority: &str) -> String {
        format!("{}/{}", self.start_pay_base, authority)
    }
}
