use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bazaar_api::{app, AppState};
use bazaar_catalog::ProductStore;
use bazaar_checkout::cart::{CartService, CartStore};
use bazaar_checkout::promo::{PromoEngine, PromoStore};
use bazaar_core::GatewayRegistry;
use bazaar_order::gateways::{OfflineGateway, ZarinpalConfig, ZarinpalGateway};
use bazaar_order::repository::{InvoiceStore, OrderStore, PaymentStore};
use bazaar_order::{InvoiceGenerator, OrderService, PaymentService};
use bazaar_store::app_config::Config;
use bazaar_store::{DbClient, EventLog, MemoryStore, PgStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bazaar_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().expect("Failed to load config");
    tracing::info!("Starting Bazaar API on port {}", config.server.port);

    let state = match &config.database {
        Some(database) => {
            let client = DbClient::new(&database.url)
                .await
                .expect("Failed to connect to Postgres");
            client.migrate().await.expect("Failed to run migrations");
            build_state(Arc::new(PgStore::new(client.pool.clone())), &config)
        }
        None => {
            tracing::warn!("No database configured, orders will not survive a restart");
            build_state(Arc::new(MemoryStore::new()), &config)
        }
    };

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app).await.expect("Server error");
}

fn build_state<S>(store: Arc<S>, config: &Config) -> AppState
where
    S: OrderStore
        + PaymentStore
        + InvoiceStore
        + ProductStore
        + CartStore
        + PromoStore
        + 'static,
{
    let orders = Arc::new(OrderService::new(store.clone(), store.clone()));
    let invoices = Arc::new(InvoiceGenerator::new(
        store.clone(),
        store.clone(),
        store.clone(),
    ));

    let mut registry = GatewayRegistry::new(config.gateway.default_gateway.clone());
    let zarinpal = ZarinpalGateway::new(ZarinpalConfig {
        merchant_id: config.gateway.merchant_id.clone(),
        sandbox: config.gateway.sandbox,
        timeout: Duration::from_secs(config.gateway.timeout_seconds),
    })
    .expect("Failed to build Zarinpal client");
    registry.register(Arc::new(zarinpal));
    registry.register(Arc::new(OfflineGateway));

    let payments = Arc::new(PaymentService::new(
        orders.clone(),
        store.clone(),
        invoices.clone(),
        Arc::new(registry),
        config.gateway.callback_base_url.clone(),
    ));

    let carts = Arc::new(CartService::new(
        store.clone(),
        store.clone(),
        PromoEngine::new(store.clone()),
    ));

    AppState {
        carts,
        orders,
        payments,
        invoices,
        products: store,
        events: EventLog::new(),
    }
}
