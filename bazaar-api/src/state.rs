use std::sync::Arc;

use bazaar_catalog::ProductStore;
use bazaar_checkout::cart::CartService;
use bazaar_order::{InvoiceGenerator, OrderService, PaymentService};
use bazaar_store::EventLog;

#[derive(Clone)]
pub struct AppState {
    pub carts: Arc<CartService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub invoices: Arc<InvoiceGenerator>,
    pub products: Arc<dyn ProductStore>,
    pub events: EventLog,
}
