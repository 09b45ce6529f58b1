pub mod error;
pub mod gateway;
pub mod registry;

pub use error::StoreError;
pub use gateway::{
    ChargeOutcome, ChargeRequest, GatewayError, PaymentGateway, VerificationRequest,
    VerifyOutcome,
};
pub use registry::{GatewayRegistry, RegistryError};
