pub mod gateways;
pub mod invoice;
pub mod lifecycle;
pub mod models;
pub mod reconciliation;
pub mod repository;
pub mod service;

pub use invoice::{InvoiceError, InvoiceGenerator};
pub use lifecycle::InvalidTransition;
pub use models::{
    Invoice, InvoiceItem, Order, OrderItem, OrderStatus, OrderStatusHistory, Payment,
    PaymentStatus, PaymentTransaction, ShippingInfo,
};
pub use reconciliation::{
    CallbackData, PaymentError, PaymentRequestResult, PaymentService, VerificationResult,
};
pub use repository::{
    CheckoutCommit, InvoiceStore, NewInvoice, NewInvoiceItem, OrderStore, PaymentStore,
};
pub use service::{OrderError, OrderService, ShippingDetails};
