use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bazaar_checkout::cart::CartError;
use bazaar_checkout::promo::PromoError;
use bazaar_checkout::shipping::ShippingError;
use bazaar_core::RegistryError;
use bazaar_order::reconciliation::PaymentError;
use bazaar_order::service::OrderError;
use serde_json::json;

/// API-level error. Validation-class failures come back as structured
/// 4xx responses; infrastructure failures are logged with context and
/// surfaced generically.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            message,
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, "{}", self.message);
        }

        let message = if self.status == StatusCode::INTERNAL_SERVER_ERROR {
            "Internal server error".to_string()
        } else {
            self.message
        };

        let body = Json(json!({
            "error": {
                "code": self.code,
                "message": message,
            }
        }));

        (self.status, body).into_response()
    }
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        match &err {
            CartError::ProductNotFound(_) => AppError::not_found(err.to_string()),
            CartError::ProductUnavailable { .. } => {
                AppError::bad_request("PRODUCT_UNAVAILABLE", err.to_string())
            }
            CartError::InsufficientStock { .. } => {
                AppError::bad_request("INSUFFICIENT_STOCK", err.to_string())
            }
            CartError::Promo(promo) => promo_error(promo),
            CartError::Store(_) => AppError::internal(err.to_string()),
        }
    }
}

fn promo_error(err: &PromoError) -> AppError {
    match err {
        PromoError::Invalid => AppError::bad_request("INVALID_PROMO", err.to_string()),
        PromoError::UsageLimitExceeded => {
            AppError::bad_request("USAGE_LIMIT_EXCEEDED", err.to_string())
        }
        PromoError::MinimumPurchase { .. } => {
            AppError::bad_request("MINIMUM_PURCHASE", err.to_string())
        }
        PromoError::Store(_) => AppError::internal(err.to_string()),
    }
}

impl From<PromoError> for AppError {
    fn from(err: PromoError) -> Self {
        promo_error(&err)
    }
}

impl From<ShippingError> for AppError {
    fn from(err: ShippingError) -> Self {
        match err {
            ShippingError::UnknownMethod(_) => {
                AppError::bad_request("INVALID_SHIPPING_METHOD", err.to_string())
            }
            ShippingError::MethodUnavailable => {
                AppError::bad_request("SHIPPING_METHOD_UNAVAILABLE", err.to_string())
            }
        }
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        match &err {
            OrderError::EmptyCart => AppError::bad_request("EMPTY_CART", err.to_string()),
            OrderError::NotFound(_) | OrderError::ProductNotFound(_) => {
                AppError::not_found(err.to_string())
            }
            OrderError::ProductUnavailable { .. } => {
                AppError::bad_request("PRODUCT_UNAVAILABLE", err.to_string())
            }
            OrderError::InsufficientStock { .. } => {
                AppError::bad_request("INSUFFICIENT_STOCK", err.to_string())
            }
            OrderError::MissingTrackingCode => {
                AppError::bad_request("TRACKING_CODE_REQUIRED", err.to_string())
            }
            OrderError::Transition(_) => {
                AppError::bad_request("INVALID_TRANSITION", err.to_string())
            }
            OrderError::Store(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match &err {
            PaymentError::OrderNotFound(_) | PaymentError::NotFound(_) => {
                AppError::not_found(err.to_string())
            }
            PaymentError::InvalidOrderState { .. } => {
                AppError::bad_request("INVALID_ORDER_STATE", err.to_string())
            }
            // Callers that want the benign-success behaviour handle this
            // variant before converting.
            PaymentError::AlreadyVerified => {
                AppError::bad_request("ALREADY_VERIFIED", err.to_string())
            }
            // A bad gateway name is a configuration error, not user input.
            PaymentError::UnknownGateway(RegistryError::UnknownGateway(_)) => {
                AppError::internal(err.to_string())
            }
            PaymentError::Gateway(_) => AppError::new(
                StatusCode::BAD_GATEWAY,
                "GATEWAY_UNAVAILABLE",
                "Payment gateway is unreachable, please try again",
            ),
            PaymentError::Transition(_) => {
                AppError::bad_request("INVALID_TRANSITION", err.to_string())
            }
            PaymentError::Store(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<bazaar_core::StoreError> for AppError {
    fn from(err: bazaar_core::StoreError) -> Self {
        use bazaar_core::StoreError;
        match &err {
            StoreError::NotFound { .. } => AppError::not_found(err.to_string()),
            StoreError::InsufficientStock { .. } => {
                AppError::bad_request("INSUFFICIENT_STOCK", err.to_string())
            }
            StoreError::Conflict(_) => {
                AppError::new(StatusCode::CONFLICT, "CONFLICT", err.to_string())
            }
            StoreError::Backend(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<bazaar_order::invoice::InvoiceError> for AppError {
    fn from(err: bazaar_order::invoice::InvoiceError) -> Self {
        use bazaar_order::invoice::InvoiceError;
        match err {
            InvoiceError::OrderNotFound(_) | InvoiceError::ProductNotFound(_) => {
                AppError::not_found(err.to_string())
            }
            InvoiceError::Store(store) => store.into(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}
