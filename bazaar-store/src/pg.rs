use async_trait::async_trait;
use bazaar_catalog::{Product, ProductStore};
use bazaar_checkout::cart::{AppliedPromo, Cart, CartItem, CartOwner, CartStore};
use bazaar_checkout::promo::{DiscountType, PromoCode, PromoStore};
use bazaar_checkout::ShippingMethodId;
use bazaar_core::StoreError;
use bazaar_order::invoice::{format_invoice_number, parse_invoice_number};
use bazaar_order::models::{
    Invoice, InvoiceItem, Order, OrderItem, OrderStatus, OrderStatusHistory, Payment,
    PaymentStatus, PaymentTransaction, ShippingInfo,
};
use bazaar_order::repository::{
    CheckoutCommit, InvoiceStore, NewInvoice, OrderStore, PaymentStore,
};
use bazaar_shared::Currency;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Serializes invoice-number allocation across connections.
const INVOICE_NUMBER_LOCK: i64 = 815_001;

/// PostgreSQL backend. Multi-row writes run inside a transaction; a
/// dropped transaction rolls back, so every failed commit leaves no
/// partial state behind.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_err(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn parse_err(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    title: String,
    sku: String,
    price: i64,
    stock: i32,
    is_available: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            title: row.title,
            sku: row.sku,
            price: row.price,
            stock: row.stock.max(0) as u32,
            is_available: row.is_available,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PromoRow {
    id: Uuid,
    code: String,
    discount_type: String,
    discount_value: i64,
    min_purchase: i64,
    max_discount: Option<i64>,
    valid_from: DateTime<Utc>,
    valid_to: DateTime<Utc>,
    is_active: bool,
    max_uses: Option<i32>,
    used_count: i32,
}

impl TryFrom<PromoRow> for PromoCode {
    type Error = StoreError;

    fn try_from(row: PromoRow) -> Result<Self, StoreError> {
        let discount_type = match row.discount_type.as_str() {
            "fixed" => DiscountType::Fixed,
            "percentage" => DiscountType::Percentage,
            other => return Err(parse_err(format!("unknown discount type: {other}"))),
        };

        Ok(PromoCode {
            id: row.id,
            code: row.code,
            discount_type,
            discount_value: row.discount_value,
            min_purchase: row.min_purchase,
            max_discount: row.max_discount,
            valid_from: row.valid_from,
            valid_to: row.valid_to,
            is_active: row.is_active,
            max_uses: row.max_uses.map(|n| n.max(0) as u32),
            used_count: row.used_count.max(0) as u32,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CartRow {
    id: Uuid,
    user_id: Option<String>,
    anonymous_id: Option<Uuid>,
    promo_id: Option<Uuid>,
    promo_code: Option<String>,
    promo_discount: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    product_id: Uuid,
    quantity: i32,
}

impl PgStore {
    async fn assemble_cart(&self, row: CartRow) -> Result<Cart, StoreError> {
        let owner = match (row.user_id, row.anonymous_id) {
            (Some(user_id), _) => CartOwner::User(user_id),
            (None, Some(anonymous_id)) => CartOwner::Anonymous(anonymous_id),
            (None, None) => return Err(parse_err(format!("cart {} has no owner", row.id))),
        };

        let items: Vec<CartItemRow> = sqlx::query_as(
            "SELECT product_id, quantity FROM cart_items WHERE cart_id = $1",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let applied_promo = match (row.promo_id, row.promo_code, row.promo_discount) {
            (Some(promo_id), Some(code), Some(discount_amount)) => Some(AppliedPromo {
                promo_id,
                code,
                discount_amount,
            }),
            _ => None,
        };

        Ok(Cart {
            id: row.id,
            owner,
            items: items
                .into_iter()
                .map(|item| CartItem {
                    product_id: item.product_id,
                    quantity: item.quantity.max(0) as u32,
                })
                .collect(),
            applied_promo,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn insert_product(&self, product: Product) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO products (id, title, sku, price, stock, is_available, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(product.id)
        .bind(&product.title)
        .bind(&product.sku)
        .bind(product.price)
        .bind(product.stock as i32)
        .bind(product.is_available)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        let row: Option<ProductRow> = sqlx::query_as(
            "SELECT id, title, sku, price, stock, is_available, created_at, updated_at
             FROM products WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(Product::from))
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            "SELECT id, title, sku, price, stock, is_available, created_at, updated_at
             FROM products ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn set_stock(&self, id: Uuid, stock: u32) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE products SET stock = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(stock as i32)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("product", id));
        }
        Ok(())
    }
}

#[async_trait]
impl PromoStore for PgStore {
    async fn insert_promo(&self, promo: PromoCode) -> Result<(), StoreError> {
        let discount_type = match promo.discount_type {
            DiscountType::Fixed => "fixed",
            DiscountType::Percentage => "percentage",
        };

        sqlx::query(
            "INSERT INTO promo_codes
                 (id, code, discount_type, discount_value, min_purchase, max_discount,
                  valid_from, valid_to, is_active, max_uses, used_count)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(promo.id)
        .bind(&promo.code)
        .bind(discount_type)
        .bind(promo.discount_value)
        .bind(promo.min_purchase)
        .bind(promo.max_discount)
        .bind(promo.valid_from)
        .bind(promo.valid_to)
        .bind(promo.is_active)
        .bind(promo.max_uses.map(|n| n as i32))
        .bind(promo.used_count as i32)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<PromoCode>, StoreError> {
        let row: Option<PromoRow> = sqlx::query_as(
            "SELECT id, code, discount_type, discount_value, min_purchase, max_discount,
                    valid_from, valid_to, is_active, max_uses, used_count
             FROM promo_codes WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(PromoCode::try_from).transpose()
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn get_or_create_cart(&self, owner: &CartOwner) -> Result<Cart, StoreError> {
        let existing: Option<CartRow> = match owner {
            CartOwner::User(user_id) => sqlx::query_as(
                "SELECT id, user_id, anonymous_id, promo_id, promo_code, promo_discount,
                        created_at, updated_at
                 FROM carts WHERE user_id = $1",
            )
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?,
            CartOwner::Anonymous(anonymous_id) => sqlx::query_as(
                "SELECT id, user_id, anonymous_id, promo_id, promo_code, promo_discount,
                        created_at, updated_at
                 FROM carts WHERE anonymous_id = $1",
            )
            .bind(anonymous_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?,
        };

        if let Some(row) = existing {
            return self.assemble_cart(row).await;
        }

        let cart = Cart::new(owner.clone());
        let (user_id, anonymous_id) = match &cart.owner {
            CartOwner::User(user_id) => (Some(user_id.clone()), None),
            CartOwner::Anonymous(anonymous_id) => (None, Some(*anonymous_id)),
        };

        sqlx::query(
            "INSERT INTO carts (id, user_id, anonymous_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(cart.id)
        .bind(user_id)
        .bind(anonymous_id)
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(cart)
    }

    async fn get_cart(&self, id: Uuid) -> Result<Option<Cart>, StoreError> {
        let row: Option<CartRow> = sqlx::query_as(
            "SELECT id, user_id, anonymous_id, promo_id, promo_code, promo_discount,
                    created_at, updated_at
             FROM carts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => Ok(Some(self.assemble_cart(row).await?)),
            None => Ok(None),
        }
    }

    async fn put_item(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: u32,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO cart_items (cart_id, product_id, quantity)
             VALUES ($1, $2, $3)
             ON CONFLICT (cart_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity",
        )
        .bind(cart_id)
        .bind(product_id)
        .bind(quantity as i32)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn remove_item(&self, cart_id: Uuid, product_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
            .bind(cart_id)
            .bind(product_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn set_promo(
        &self,
        cart_id: Uuid,
        promo: Option<AppliedPromo>,
    ) -> Result<(), StoreError> {
        let (promo_id, code, discount) = match promo {
            Some(promo) => (
                Some(promo.promo_id),
                Some(promo.code),
                Some(promo.discount_amount),
            ),
            None => (None, None, None),
        };

        let result = sqlx::query(
            "UPDATE carts SET promo_id = $2, promo_code = $3, promo_discount = $4,
                              updated_at = now()
             WHERE id = $1",
        )
        .bind(cart_id)
        .bind(promo_id)
        .bind(code)
        .bind(discount)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("cart", cart_id));
        }
        Ok(())
    }

    async fn clear_cart(&self, cart_id: Uuid) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        clear_cart_tx(&mut tx, cart_id).await?;
        tx.commit().await.map_err(db_err)
    }
}

async fn clear_cart_tx(
    tx: &mut Transaction<'_, Postgres>,
    cart_id: Uuid,
) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
        .bind(cart_id)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;

    sqlx::query(
        "UPDATE carts SET promo_id = NULL, promo_code = NULL, promo_discount = NULL,
                          updated_at = now()
         WHERE id = $1",
    )
    .bind(cart_id)
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Option<String>,
    status: String,
    currency: String,
    total_amount: i64,
    phone_number: String,
    notes: String,
    tracking_code: Option<String>,
    shipping_method: String,
    shipping_cost: i64,
    discount_amount: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, StoreError> {
        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            status: row.status.parse::<OrderStatus>().map_err(parse_err)?,
            currency: row.currency.parse::<Currency>().map_err(parse_err)?,
            total_amount: row.total_amount,
            phone_number: row.phone_number,
            notes: row.notes,
            tracking_code: row.tracking_code,
            shipping_method: row
                .shipping_method
                .parse::<ShippingMethodId>()
                .map_err(parse_err)?,
            shipping_cost: row.shipping_cost,
            discount_amount: row.discount_amount,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    price: i64,
    created_at: DateTime<Utc>,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            quantity: row.quantity.max(0) as u32,
            price: row.price,
            created_at: row.created_at,
        }
    }
}

const ORDER_COLUMNS: &str = "id, user_id, status, currency, total_amount, phone_number, \
                             notes, tracking_code, shipping_method, shipping_cost, \
                             discount_amount, created_at, updated_at";

#[async_trait]
impl OrderStore for PgStore {
    async fn commit_checkout(&self, commit: CheckoutCommit) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Emptying the cart first doubles as the double-checkout guard: a
        // second commit from the same cart finds nothing to delete.
        let cleared = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(commit.cart_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        if cleared.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "cart {} has already been checked out",
                commit.cart_id
            )));
        }

        for item in &commit.items {
            // Conditional decrement with floor check; zero affected rows
            // means the stock moved underneath us.
            let updated = sqlx::query(
                "UPDATE products SET stock = stock - $2, updated_at = now()
                 WHERE id = $1 AND stock >= $2",
            )
            .bind(item.product_id)
            .bind(item.quantity as i32)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            if updated.rows_affected() == 0 {
                let available: Option<i32> =
                    sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
                        .bind(item.product_id)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(db_err)?;

                return Err(StoreError::InsufficientStock {
                    product_id: item.product_id,
                    requested: item.quantity,
                    available: available.unwrap_or(0).max(0) as u32,
                });
            }
        }

        let order = &commit.order;
        sqlx::query(
            "INSERT INTO orders
                 (id, user_id, status, currency, total_amount, phone_number, notes,
                  tracking_code, shipping_method, shipping_cost, discount_amount,
                  created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(order.id)
        .bind(&order.user_id)
        .bind(order.status.as_str())
        .bind(order.currency.to_string())
        .bind(order.total_amount)
        .bind(&order.phone_number)
        .bind(&order.notes)
        .bind(&order.tracking_code)
        .bind(order.shipping_method.as_str())
        .bind(order.shipping_cost)
        .bind(order.discount_amount)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        for item in &commit.items {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, product_id, quantity, price, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(item.id)
            .bind(item.order_id)
            .bind(item.product_id)
            .bind(item.quantity as i32)
            .bind(item.price)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        let shipping = &commit.shipping;
        sqlx::query(
            "INSERT INTO shipping_info
                 (order_id, address, city, province, postal_code, recipient_name, phone_number)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(shipping.order_id)
        .bind(&shipping.address)
        .bind(&shipping.city)
        .bind(&shipping.province)
        .bind(&shipping.postal_code)
        .bind(&shipping.recipient_name)
        .bind(&shipping.phone_number)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if let Some(promo_id) = commit.promo_id {
            sqlx::query("UPDATE promo_codes SET used_count = used_count + 1 WHERE id = $1")
                .bind(promo_id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        clear_cart_tx(&mut tx, commit.cart_id).await?;

        tx.commit().await.map_err(db_err)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(Order::try_from).transpose()
    }

    async fn list_orders_for_user(&self, user_id: &str) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, StoreError> {
        let rows: Vec<OrderItemRow> = sqlx::query_as(
            "SELECT id, order_id, product_id, quantity, price, created_at
             FROM order_items WHERE order_id = $1 ORDER BY created_at",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(OrderItem::from).collect())
    }

    async fn shipping_info(
        &self,
        order_id: Uuid,
    ) -> Result<Option<ShippingInfo>, StoreError> {
        #[derive(sqlx::FromRow)]
        struct ShippingRow {
            order_id: Uuid,
            address: String,
            city: String,
            province: String,
            postal_code: String,
            recipient_name: String,
            phone_number: String,
        }

        let row: Option<ShippingRow> = sqlx::query_as(
            "SELECT order_id, address, city, province, postal_code, recipient_name, phone_number
             FROM shipping_info WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|row| ShippingInfo {
            order_id: row.order_id,
            address: row.address,
            city: row.city,
            province: row.province,
            postal_code: row.postal_code,
            recipient_name: row.recipient_name,
            phone_number: row.phone_number,
        }))
    }

    async fn update_status(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        note: Option<String>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let updated = sqlx::query(
            "UPDATE orders SET status = $3, updated_at = now()
             WHERE id = $1 AND status = $2",
        )
        .bind(order_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if updated.rows_affected() == 0 {
            let exists: Option<String> =
                sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
                    .bind(order_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(db_err)?;

            return match exists {
                None => Err(StoreError::not_found("order", order_id)),
                Some(current) => Err(StoreError::Conflict(format!(
                    "order {order_id} is {current}, expected {from}"
                ))),
            };
        }

        sqlx::query(
            "INSERT INTO order_status_history (id, order_id, from_status, to_status, note)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(order_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(note)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)
    }

    async fn set_tracking_code(
        &self,
        order_id: Uuid,
        tracking_code: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE orders SET tracking_code = $2, updated_at = now() WHERE id = $1",
        )
        .bind(order_id)
        .bind(tracking_code)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("order", order_id));
        }
        Ok(())
    }

    async fn status_history(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<OrderStatusHistory>, StoreError> {
        #[derive(sqlx::FromRow)]
        struct HistoryRow {
            id: Uuid,
            order_id: Uuid,
            from_status: String,
            to_status: String,
            note: Option<String>,
            created_at: DateTime<Utc>,
        }

        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT id, order_id, from_status, to_status, note, created_at
             FROM order_status_history WHERE order_id = $1 ORDER BY created_at",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                Ok(OrderStatusHistory {
                    id: row.id,
                    order_id: row.order_id,
                    from_status: row.from_status.parse().map_err(parse_err)?,
                    to_status: row.to_status.parse().map_err(parse_err)?,
                    note: row.note,
                    created_at: row.created_at,
                })
            })
            .collect()
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    order_id: Uuid,
    amount: i64,
    status: String,
    gateway: String,
    currency: String,
    reference_id: Option<String>,
    transaction_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = StoreError;

    fn try_from(row: PaymentRow) -> Result<Self, StoreError> {
        Ok(Payment {
            id: row.id,
            order_id: row.order_id,
            amount: row.amount,
            status: row.status.parse::<PaymentStatus>().map_err(parse_err)?,
            gateway: row.gateway,
            currency: row.currency.parse::<Currency>().map_err(parse_err)?,
            reference_id: row.reference_id,
            transaction_id: row.transaction_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const PAYMENT_COLUMNS: &str = "id, order_id, amount, status, gateway, currency, \
                               reference_id, transaction_id, created_at, updated_at";

#[async_trait]
impl PaymentStore for PgStore {
    async fn insert_payment(&self, payment: Payment) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO payments
                 (id, order_id, amount, status, gateway, currency, reference_id,
                  transaction_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(payment.id)
        .bind(payment.order_id)
        .bind(payment.amount)
        .bind(payment.status.as_str())
        .bind(&payment.gateway)
        .bind(payment.currency.to_string())
        .bind(&payment.reference_id)
        .bind(&payment.transaction_id)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_payment(&self, id: Uuid) -> Result<Option<Payment>, StoreError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(Payment::try_from).transpose()
    }

    async fn payments_for_order(&self, order_id: Uuid) -> Result<Vec<Payment>, StoreError> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 ORDER BY created_at DESC"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(Payment::try_from).collect()
    }

    async fn update_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE payments SET status = $2, gateway = $3, reference_id = $4,
                                 transaction_id = $5, updated_at = now()
             WHERE id = $1",
        )
        .bind(payment.id)
        .bind(payment.status.as_str())
        .bind(&payment.gateway)
        .bind(&payment.reference_id)
        .bind(&payment.transaction_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("payment", payment.id));
        }
        Ok(())
    }

    async fn insert_transaction(
        &self,
        transaction: PaymentTransaction,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO payment_transactions
                 (id, payment_id, amount, raw_request, raw_response, provider_status,
                  transaction_id, receipt_reference, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(transaction.id)
        .bind(transaction.payment_id)
        .bind(transaction.amount)
        .bind(transaction.raw_request.to_string())
        .bind(transaction.raw_response.as_ref().map(|value| value.to_string()))
        .bind(&transaction.provider_status)
        .bind(&transaction.transaction_id)
        .bind(&transaction.receipt_reference)
        .bind(transaction.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn attach_transaction_result(
        &self,
        transaction_id: Uuid,
        raw_response: serde_json::Value,
        provider_status: Option<String>,
        provider_transaction_id: Option<String>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE payment_transactions
             SET raw_response = $2, provider_status = $3, transaction_id = $4
             WHERE id = $1",
        )
        .bind(transaction_id)
        .bind(raw_response.to_string())
        .bind(provider_status)
        .bind(provider_transaction_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("payment transaction", transaction_id));
        }
        Ok(())
    }

    async fn transactions_for_payment(
        &self,
        payment_id: Uuid,
    ) -> Result<Vec<PaymentTransaction>, StoreError> {
        #[derive(sqlx::FromRow)]
        struct TransactionRow {
            id: Uuid,
            payment_id: Uuid,
            amount: i64,
            raw_request: String,
            raw_response: Option<String>,
            provider_status: Option<String>,
            transaction_id: Option<String>,
            receipt_reference: Option<String>,
            created_at: DateTime<Utc>,
        }

        let rows: Vec<TransactionRow> = sqlx::query_as(
            "SELECT id, payment_id, amount, raw_request, raw_response, provider_status,
                    transaction_id, receipt_reference, created_at
             FROM payment_transactions WHERE payment_id = $1 ORDER BY created_at",
        )
        .bind(payment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                Ok(PaymentTransaction {
                    id: row.id,
                    payment_id: row.payment_id,
                    amount: row.amount,
                    raw_request: serde_json::from_str(&row.raw_request)
                        .map_err(parse_err)?,
                    raw_response: row
                        .raw_response
                        .as_deref()
                        .map(serde_json::from_str)
                        .transpose()
                        .map_err(parse_err)?,
                    provider_status: row.provider_status,
                    transaction_id: row.transaction_id,
                    receipt_reference: row.receipt_reference,
                    created_at: row.created_at,
                })
            })
            .collect()
    }
}

#[derive(sqlx::FromRow)]
struct InvoiceRow {
    id: Uuid,
    order_id: Uuid,
    invoice_number: String,
    total_amount: i64,
    currency: String,
    shipping_address: String,
    phone_number: String,
    pdf_path: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = StoreError;

    fn try_from(row: InvoiceRow) -> Result<Self, StoreError> {
        Ok(Invoice {
            id: row.id,
            order_id: row.order_id,
            invoice_number: row.invoice_number,
            total_amount: row.total_amount,
            currency: row.currency.parse::<Currency>().map_err(parse_err)?,
            shipping_address: row.shipping_address,
            phone_number: row.phone_number,
            pdf_path: row.pdf_path,
            created_at: row.created_at,
        })
    }
}

const INVOICE_COLUMNS: &str = "id, order_id, invoice_number, total_amount, currency, \
                               shipping_address, phone_number, pdf_path, created_at";

#[async_trait]
impl InvoiceStore for PgStore {
    async fn create_invoice(&self, invoice: NewInvoice) -> Result<Invoice, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // Advisory lock serializes number allocation; a plain max-scan
        // would race under concurrent completions.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(INVOICE_NUMBER_LOCK)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let existing: Option<InvoiceRow> = sqlx::query_as(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE order_id = $1"
        ))
        .bind(invoice.order_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        if let Some(row) = existing {
            return Invoice::try_from(row);
        }

        let numbers: Vec<String> =
            sqlx::query_scalar("SELECT invoice_number FROM invoices")
                .fetch_all(&mut *tx)
                .await
                .map_err(db_err)?;
        let next_sequence = numbers
            .iter()
            .filter_map(|number| parse_invoice_number(number))
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

        sqlx::query(
            "INSERT INTO invoices
                 (id, order_id, invoice_number, total_amount, currency, shipping_address,
                  phone_number, pdf_path, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(row.id)
        .bind(row.order_id)
        .bind(&row.invoice_number)
        .bind(row.total_amount)
        .bind(row.currency.to_string())
        .bind(&row.shipping_address)
        .bind(&row.phone_number)
        .bind(&row.pdf_path)
        .bind(row.created_at)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        for item in &invoice.items {
            sqlx::query(
                "INSERT INTO invoice_items
                     (id, invoice_id, product_title, product_sku, quantity, price)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(Uuid::new_v4())
            .bind(row.id)
            .bind(&item.product_title)
            .bind(&item.product_sku)
            .bind(item.quantity as i32)
            .bind(item.price)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(row)
    }

    async fn invoice_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Option<Invoice>, StoreError> {
        let row: Option<InvoiceRow> = sqlx::query_as(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(Invoice::try_from).transpose()
    }

    async fn invoice_items(&self, invoice_id: Uuid) -> Result<Vec<InvoiceItem>, StoreError> {
        #[derive(sqlx::FromRow)]
        struct ItemRow {
            id: Uuid,
            invoice_id: Uuid,
            product_title: String,
            product_sku: String,
            quantity: i32,
            price: i64,
        }

        let rows: Vec<ItemRow> = sqlx::query_as(
            "SELECT id, invoice_id, product_title, product_sku, quantity, price
             FROM invoice_items WHERE invoice_id = $1",
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|row| InvoiceItem {
                id: row.id,
                invoice_id: row.invoice_id,
                product_title: row.product_title,
                product_sku: row.product_sku,
                quantity: row.quantity.max(0) as u32,
                price: row.price,
            })
            .collect())
    }
}
