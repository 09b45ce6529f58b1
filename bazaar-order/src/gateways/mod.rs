pub mod mock;
pub mod offline;
pub mod zarinpal;

pub use mock::MockGateway;
pub use offline::OfflineGateway;
pub use zarinpal::{ZarinpalConfig, ZarinpalGateway};
