use async_trait::async_trait;
use bazaar_catalog::{Product, ProductStore};
use bazaar_checkout::cart::{AppliedPromo, Cart, CartItem, CartOwner, CartStore};
use bazaar_checkout::promo::{PromoCode, PromoStore};
use bazaar_core::StoreError;
use bazaar_order::invoice::{format_invoice_number, parse_invoice_number};
use bazaar_order::models::{
    Invoice, InvoiceItem, Order, OrderItem, OrderStatus, OrderStatusHistory, Payment,
    PaymentTransaction, ShippingInfo,
};
use bazaar_order::repository::{
    CheckoutCommit, InvoiceStore, NewInvoice, OrderStore, PaymentStore,
};
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    products: HashMap<Uuid, Product>,
    carts: HashMap<Uuid, Cart>,
    promos: HashMap<Uuid, PromoCode>,
    orders: HashMap<Uuid, Order>,
    order_items: HashMap<Uuid, Vec<OrderItem>>,
    shipping: HashMap<Uuid, ShippingInfo>,
    history: HashMap<Uuid, Vec<OrderStatusHistory>>,
    payments: HashMap<Uuid, Payment>,
    transactions: HashMap<Uuid, Vec<PaymentTransaction>>,
    invoices: HashMap<Uuid, Invoice>,
    invoice_items: HashMap<Uuid, Vec<InvoiceItem>>,
}

/// In-memory backend. One mutex guards all tables, so every store
/// operation is a single critical section; this is what makes the
/// checkout commit, the status compare-and-set and invoice numbering
/// atomic without a database.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn insert_product(&self, product: Product) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.products.insert(product.id, product);
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.products.get(&id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.products.values().cloned().collect())
    }

    async fn set_stock(&self, id: Uuid, stock: u32) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let product = inner
            .products
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("product", id))?;
        product.stock = stock;
        product.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl PromoStore for MemoryStore {
    async fn insert_promo(&self, promo: PromoCode) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.promos.insert(promo.id, promo);
        Ok(())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<PromoCode>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.promos.values().find(|promo| promo.code == code).cloned())
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn get_or_create_cart(&self, owner: &CartOwner) -> Result<Cart, StoreError> {
        let mut inner = self.inner.lock().await;
        if let Some(cart) = inner.carts.values().find(|cart| &cart.owner == owner) {
            return Ok(cart.clone());
        }

        let cart = Cart::new(owner.clone());
        inner.carts.insert(cart.id, cart.clone());
        Ok(cart)
    }

    async fn get_cart(&self, id: Uuid) -> Result<Option<Cart>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.carts.get(&id).cloned())
    }

    async fn put_item(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: u32,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let cart = inner
            .carts
            .get_mut(&cart_id)
            .ok_or_else(|| StoreError::not_found("cart", cart_id))?;

        match cart.items.iter_mut().find(|item| item.product_id == product_id) {
            Some(item) => item.quantity = quantity,
            None => cart.items.push(CartItem {
                product_id,
                quantity,
            }),
        }
        cart.updated_at = Utc::now();
        Ok(())
    }

    async fn remove_item(&self, cart_id: Uuid, product_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let cart = inner
            .carts
            .get_mut(&cart_id)
            .ok_or_else(|| StoreError::not_found("cart", cart_id))?;
        cart.items.retain(|item| item.product_id != product_id);
        cart.updated_at = Utc::now();
        Ok(())
    }

    async fn set_promo(
        &self,
        cart_id: Uuid,
        promo: Option<AppliedPromo>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let cart = inner
            .carts
            .get_mut(&cart_id)
            .ok_or_else(|| StoreError::not_found("cart", cart_id))?;
        cart.applied_promo = promo;
        cart.updated_at = Utc::now();
        Ok(())
    }

    async fn clear_cart(&self, cart_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let cart = inner
            .carts
            .get_mut(&cart_id)
            .ok_or_else(|| StoreError::not_found("cart", cart_id))?;
        cart.items.clear();
        cart.applied_promo = None;
        cart.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn commit_checkout(&self, commit: CheckoutCommit) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;

        // Validate everything before the first mutation, so a losing
        // commit leaves no trace.
        {
            let cart = inner
                .carts
                .get(&commit.cart_id)
                .ok_or_else(|| StoreError::not_found("cart", commit.cart_id))?;
            if cart.items.is_empty() {
                return Err(StoreError::Conflict(format!(
                    "cart {} has already been checked out",
                    commit.cart_id
                )));
            }
        }

        for item in &commit.items {
            let product = inner
                .products
                .get(&item.product_id)
                .ok_or_else(|| StoreError::not_found("product", item.product_id))?;
            if product.stock < item.quantity {
                return Err(StoreError::InsufficientStock {
                    product_id: item.product_id,
                    requested: item.quantity,
                    available: product.stock,
                });
            }
        }

        for item in &commit.items {
            if let Some(product) = inner.products.get_mut(&item.product_id) {
                product.stock -= item.quantity;
                product.updated_at = Utc::now();
            }
        }

        let order_id = commit.order.id;
        inner.orders.insert(order_id, commit.order);
        inner.order_items.insert(order_id, commit.items);
        inner.shipping.insert(order_id, commit.shipping);

        if let Some(cart) = inner.carts.get_mut(&commit.cart_id) {
            cart.items.clear();
            cart.applied_promo = None;
            cart.updated_at = Utc::now();
        }

        if let Some(promo_id) = commit.promo_id {
            if let Some(promo) = inner.promos.get_mut(&promo_id) {
                promo.used_count += 1;
            }
        }

        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.orders.get(&id).cloned())
    }

    async fn list_orders_for_user(&self, user_id: &str) -> Result<Vec<Order>, StoreError> {
        let inner = self.inner.lock().await;
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|order| order.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.order_items.get(&order_id).cloned().unwrap_or_default())
    }

    async fn shipping_info(
        &self,
        order_id: Uuid,
    ) -> Result<Option<ShippingInfo>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.shipping.get(&order_id).cloned())
    }

    async fn update_status(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        note: Option<String>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let order = inner
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::not_found("order", order_id))?;

        if order.status != from {
            return Err(StoreError::Conflict(format!(
                "order {} is {}, expected {}",
                order_id, order.status, from
            )));
        }

        order.status = to;
        order.updated_at = Utc::now();

        inner.history.entry(order_id).or_default().push(OrderStatusHistory {
            id: Uuid::new_v4(),
            order_id,
            from_status: from,
            to_status: to,
            note,
            created_at: Utc::now(),
        });

        Ok(())
    }

    async fn set_tracking_code(
        &self,
        order_id: Uuid,
        tracking_code: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let order = inner
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::not_found("order", order_id))?;
        order.tracking_code = Some(tracking_code.to_string());
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn status_history(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<OrderStatusHistory>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.history.get(&order_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn insert_payment(&self, payment: Payment) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.payments.insert(payment.id, payment);
        Ok(())
    }

    async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.payments.get(&id).cloned())
    }

    async fn payments_for_order(&self, order_id: Uuid) -> Result<Vec<Payment>, StoreError> {
        let inner = self.inner.lock().await;
        let mut payments: Vec<Payment> = inner
            .payments
            .values()
            .filter(|payment| payment.order_id == order_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }

    async fn update_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let stored = inner
            .payments
            .get_mut(&payment.id)
            .ok_or_else(|| StoreError::not_found("payment", payment.id))?;
        *stored = payment.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_transaction(
        &self,
        transaction: PaymentTransaction,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner
            .transactions
            .entry(transaction.payment_id)
            .or_default()
            .push(transaction);
        Ok(())
    }

    async fn attach_transaction_result(
        &self,
        transaction_id: Uuid,
        raw_response: serde_json::Value,
        provider_status: Option<String>,
        provider_transaction_id: Option<String>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let transaction = inner
            .transactions
            .values_mut()
            .flatten()
            .find(|transaction| transaction.id == transaction_id)
            .ok_or_else(|| StoreError::not_found("payment transaction", transaction_id))?;

        transaction.raw_response = Some(raw_response);
        transaction.provider_status = provider_status;
        transaction.transaction_id = provider_transaction_id;
        Ok(())
    }

    async fn transactions_for_payment(
        &self,
        payment_id: Uuid,
    ) -> Result<Vec<PaymentTransaction>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.transactions.get(&payment_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl InvoiceStore for MemoryStore {
    async fn create_invoice(&self, invoice: NewInvoice) -> Result<Invoice, StoreError> {
        let mut inner = self.inner.lock().await;

        // Idempotency re-check inside the critical section: a racing
        // duplicate completion signal lands here after the winner.
        if let Some(existing) = inner
            .invoices
            .values()
            .find(|row| row.order_id == invoice.order_id)
        {
            return Ok(existing.clone());
        }

        let next_sequence = inner
            .invoices
            .values()
            .filter_map(|row| parse_invoice_number(&row.invoice_number))
            .max()
            .unwrap_or(0)
            + 1;

        let row = Invoice {
            id: Uuid::new_v4(),
            order_id: invoice.order_id,
            invoice_number: format_invoice_number(next_sequence),
            total_amount: invoice.total_amount,
            currency: invoice.currency,
            shipping_address: invoice.shipping_address,
            phone_number: invoice.phone_number,
            pdf_path: None,
            created_at: Utc::now(),
        };

        let items = invoice
            .items
            .into_iter()
            .map(|item| InvoiceItem {
                id: Uuid::new_v4(),
                invoice_id: row.id,
                product_title: item.product_title,
                product_sku: item.product_sku,
                quantity: item.quantity,
                price: item.price,
            })
            .collect();

        inner.invoice_items.insert(row.id, items);
        inner.invoices.insert(row.id, row.clone());
        Ok(row)
    }

    async fn invoice_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<Invoice>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .invoices
            .values()
            .find(|invoice| invoice.order_id == order_id)
            .cloned())
    }

    async fn invoice_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.invoice_items.get(&invoice_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_checkout::ShippingMethodId;
    use bazaar_order::repository::NewInvoiceItem;
    use bazaar_shared::Currency;
    use std::sync::Arc;

    fn order(status: OrderStatus) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            user_id: Some("user-1".to_string()),
            status,
            currency: Currency::Irr,
            total_amount: 550_000,
            phone_number: "09120000000".to_string(),
            notes: String::new(),
            tracking_code: None,
            shipping_method: ShippingMethodId::StandardPost,
            shipping_cost: 50_000,
            discount_amount: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn shipping(order_id: Uuid) -> ShippingInfo {
        ShippingInfo {
            order_id,
            address: "خیابان انقلاب".to_string(),
            city: "تهران".to_string(),
            province: "تهران".to_string(),
            postal_code: "1111111111".to_string(),
            recipient_name: "آرش".to_string(),
            phone_number: "09120000000".to_string(),
        }
    }

    async fn seeded_cart(store: &MemoryStore, product: &Product, quantity: u32) -> Cart {
        let cart = store
            .get_or_create_cart(&CartOwner::Anonymous(Uuid::new_v4()))
            .await
            .unwrap();
        store.put_item(cart.id, product.id, quantity).await.unwrap();
        store.get_cart(cart.id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_commit_checkout_decrements_stock_and_clears_cart() {
        let store = MemoryStore::new();
        let product = Product::new("کتاب", "BK-1", 250_000, 5);
        store.insert_product(product.clone()).await.unwrap();
        let cart = seeded_cart(&store, &product, 2).await;

        let order = order(OrderStatus::Pending);
        let items = vec![OrderItem::new(order.id, product.id, 2, product.price)];
        store
            .commit_checkout(CheckoutCommit {
                order: order.clone(),
                items,
                shipping: shipping(order.id),
                cart_id: cart.id,
                promo_id: None,
            })
            .await
            .unwrap();

        assert_eq!(store.get_product(product.id).await.unwrap().unwrap().stock, 3);
        assert!(store.get_cart(cart.id).await.unwrap().unwrap().items.is_empty());
        assert_eq!(store.order_items(order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_checkout_fails_whole_when_stock_short() {
        let store = MemoryStore::new();
        let plenty = Product::new("کتاب", "BK-1", 250_000, 10);
        let scarce = Product::new("عروسک", "TY-1", 400_000, 1);
        store.insert_product(plenty.clone()).await.unwrap();
        store.insert_product(scarce.clone()).await.unwrap();

        let cart = seeded_cart(&store, &plenty, 2).await;
        store.put_item(cart.id, scarce.id, 2).await.unwrap();

        let order = order(OrderStatus::Pending);
        let err = store
            .commit_checkout(CheckoutCommit {
                order: order.clone(),
                items: vec![
                    OrderItem::new(order.id, plenty.id, 2, plenty.price),
                    OrderItem::new(order.id, scarce.id, 2, scarce.price),
                ],
                shipping: shipping(order.id),
                cart_id: cart.id,
                promo_id: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::InsufficientStock { .. }));
        // Nothing moved: no order row, stock untouched, cart intact.
        assert!(store.get_order(order.id).await.unwrap().is_none());
        assert_eq!(store.get_product(plenty.id).await.unwrap().unwrap().stock, 10);
        assert_eq!(store.get_cart(cart.id).await.unwrap().unwrap().items.len(), 2);
    }

    #[tokio::test]
    async fn test_update_status_appends_history_atomically() {
        let store = MemoryStore::new();
        let order = order(OrderStatus::Pending);
        store.orders_seed(order.clone()).await;

        store
            .update_status(
                order.id,
                OrderStatus::Pending,
                OrderStatus::Processing,
                Some("payment requested".to_string()),
            )
            .await
            .unwrap();

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Processing);

        let history = store.status_history(order.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from_status, OrderStatus::Pending);
        assert_eq!(history[0].to_status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn test_update_status_cas_rejects_stale_writer() {
        let store = MemoryStore::new();
        let order = order(OrderStatus::Pending);
        store.orders_seed(order.clone()).await;

        store
            .update_status(order.id, OrderStatus::Pending, OrderStatus::Cancelled, None)
            .await
            .unwrap();

        let err = store
            .update_status(order.id, OrderStatus::Pending, OrderStatus::Processing, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.status_history(order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invoice_numbers_unique_under_concurrency() {
        let store = Arc::new(MemoryStore::new());

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .create_invoice(NewInvoice {
                        order_id: Uuid::new_v4(),
                        total_amount: 100_000,
                        currency: Currency::Irr,
                        shipping_address: String::new(),
                        phone_number: String::new(),
                        items: vec![],
                    })
                    .await
                    .unwrap()
                    .invoice_number
            }));
        }

        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap());
        }

        numbers.sort();
        numbers.dedup();
        assert_eq!(numbers.len(), 10, "invoice numbers must be unique");
        assert_eq!(numbers[0], "INV000001");
        assert_eq!(numbers[9], "INV000010");
    }

    #[tokio::test]
    async fn test_create_invoice_idempotent_per_order() {
        let store = MemoryStore::new();
        let order_id = Uuid::new_v4();
        let new_invoice = NewInvoice {
            order_id,
            total_amount: 100_000,
            currency: Currency::Irr,
            shipping_address: "تهران".to_string(),
            phone_number: "0912".to_string(),
            items: vec![NewInvoiceItem {
                product_title: "کتاب".to_string(),
                product_sku: "BK-1".to_string(),
                quantity: 1,
                price: 100_000,
            }],
        };

        let first = store.create_invoice(new_invoice.clone()).await.unwrap();
        let second = store.create_invoice(new_invoice).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.invoice_number, second.invoice_number);
        assert_eq!(store.invoice_items(first.id).await.unwrap().len(), 1);
    }

    impl MemoryStore {
        /// Test seeding helper; orders normally only enter through
        /// `commit_checkout`.
        async fn orders_seed(&self, order: Order) {
            let mut inner = self.inner.lock().await;
            inner.orders.insert(order.id, order);
        }
    }
}
