use async_trait::async_trait;
use bazaar_catalog::ProductStore;
use bazaar_core::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::promo::{PromoEngine, PromoError};

/// A cart belongs to exactly one of: an authenticated user, or an
/// anonymous session id handed out on first contact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CartOwner {
    User(String),
    Anonymous(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: Uuid,
    pub quantity: u32,
}

/// Promo parked on the cart until checkout commits it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedPromo {
    pub promo_id: Uuid,
    pub code: String,
    pub discount_amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub id: Uuid,
    pub owner: CartOwner,
    pub items: Vec<CartItem>,
    pub applied_promo: Option<AppliedPromo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(owner: CartOwner) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner,
            items: Vec::new(),
            applied_promo: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn quantity_of(&self, product_id: Uuid) -> u32 {
        self.items
            .iter()
            .find(|item| item.product_id == product_id)
            .map(|item| item.quantity)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn get_or_create_cart(&self, owner: &CartOwner) -> Result<Cart, StoreError>;

    async fn get_cart(&self, id: Uuid) -> Result<Option<Cart>, StoreError>;

    /// Insert the line or replace its quantity; `(cart, product)` stays unique.
    async fn put_item(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: u32,
    ) -> Result<(), StoreError>;

    async fn remove_item(&self, cart_id: Uuid, product_id: Uuid) -> Result<(), StoreError>;

    async fn set_promo(
        &self,
        cart_id: Uuid,
        promo: Option<AppliedPromo>,
    ) -> Result<(), StoreError>;

    async fn clear_cart(&self, cart_id: Uuid) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CartError {
    #[error("product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("product {product_id} is not available")]
    ProductUnavailable { product_id: Uuid },

    #[error("not enough stock available for product {product_id}")]
    InsufficientStock { product_id: Uuid },

    #[error(transparent)]
    Promo(#[from] PromoError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One priced line of a cart, with the price read from the catalog at
/// display time. Cart rows never carry prices of their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub title: String,
    pub quantity: u32,
    pub unit_price: i64,
    pub total_price: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartDetails {
    pub cart_id: Uuid,
    pub items: Vec<CartLine>,
    pub items_count: u32,
    pub subtotal: i64,
    pub discount_amount: i64,
    pub total_amount: i64,
    pub applied_promo: Option<AppliedPromo>,
}

pub struct CartService {
    carts: Arc<dyn CartStore>,
    products: Arc<dyn ProductStore>,
    promo: PromoEngine,
}

impl CartService {
    pub fn new(
        carts: Arc<dyn CartStore>,
        products: Arc<dyn ProductStore>,
        promo: PromoEngine,
    ) -> Self {
        Self {
            carts,
            products,
            promo,
        }
    }

    /// Add `quantity` of a product, merging with any existing line.
    /// Stock checks here are advisory; the authoritative check happens in
    /// the checkout commit.
    pub async fn add_item(
        &self,
        owner: &CartOwner,
        product_id: Uuid,
        quantity: u32,
    ) -> Result<Cart, CartError> {
        let cart = self.carts.get_or_create_cart(owner).await?;
        let product = self
            .products
            .get_product(product_id)
            .await?
            .ok_or(CartError::ProductNotFound(product_id))?;

        if !product.is_available {
            return Err(CartError::ProductUnavailable { product_id });
        }

        let new_quantity = cart.quantity_of(product_id) + quantity;
        if !product.has_stock(new_quantity) {
            return Err(CartError::InsufficientStock { product_id });
        }

        self.carts.put_item(cart.id, product_id, new_quantity).await?;
        Ok(self
            .carts
            .get_cart(cart.id)
            .await?
            .ok_or_else(|| StoreError::not_found("cart", cart.id))?)
    }

    /// Set a line to an absolute quantity; zero removes the line.
    pub async fn update_quantity(
        &self,
        owner: &CartOwner,
        product_id: Uuid,
        quantity: u32,
    ) -> Result<Cart, CartError> {
        let cart = self.carts.get_or_create_cart(owner).await?;

        if quantity == 0 {
            self.carts.remove_item(cart.id, product_id).await?;
        } else {
            let product = self
                .products
                .get_product(product_id)
                .await?
                .ok_or(CartError::ProductNotFound(product_id))?;

            if !product.is_available {
                return Err(CartError::ProductUnavailable { product_id });
            }
            if !product.has_stock(quantity) {
                return Err(CartError::InsufficientStock { product_id });
            }

            self.carts.put_item(cart.id, product_id, quantity).await?;
        }

        Ok(self
            .carts
            .get_cart(cart.id)
            .await?
            .ok_or_else(|| StoreError::not_found("cart", cart.id))?)
    }

    pub async fn remove_item(
        &self,
        owner: &CartOwner,
        product_id: Uuid,
    ) -> Result<(), CartError> {
        let cart = self.carts.get_or_create_cart(owner).await?;
        self.carts.remove_item(cart.id, product_id).await?;
        Ok(())
    }

    pub async fn clear(&self, owner: &CartOwner) -> Result<(), CartError> {
        let cart = self.carts.get_or_create_cart(owner).await?;
        self.carts.clear_cart(cart.id).await?;
        Ok(())
    }

    /// The owner's cart row as stored.
    pub async fn cart(&self, owner: &CartOwner) -> Result<Cart, CartError> {
        Ok(self.carts.get_or_create_cart(owner).await?)
    }

    /// Current cart contents priced against the catalog.
    pub async fn details(&self, owner: &CartOwner) -> Result<CartDetails, CartError> {
        let cart = self.carts.get_or_create_cart(owner).await?;
        self.details_for(&cart).await
    }

    /// Validate a promo code against the current subtotal and park it on
    /// the cart. The usage counter is untouched until checkout.
    pub async fn apply_promo(
        &self,
        owner: &CartOwner,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<CartDetails, CartError> {
        let cart = self.carts.get_or_create_cart(owner).await?;
        let details = self.details_for(&cart).await?;

        let (promo, discount_amount) = self
            .promo
            .apply_promo_code(details.subtotal, code, now)
            .await?;

        self.carts
            .set_promo(
                cart.id,
                Some(AppliedPromo {
                    promo_id: promo.id,
                    code: promo.code,
                    discount_amount,
                }),
            )
            .await?;

        let cart = self
            .carts
            .get_cart(cart.id)
            .await?
            .ok_or_else(|| StoreError::not_found("cart", cart.id))?;
        self.details_for(&cart).await
    }

    async fn details_for(&self, cart: &Cart) -> Result<CartDetails, CartError> {
        let mut lines = Vec::with_capacity(cart.items.len());
        let mut subtotal = 0i64;
        let mut items_count = 0u32;

        for item in &cart.items {
            let product = self
                .products
                .get_product(item.product_id)
                .await?
                .ok_or(CartError::ProductNotFound(item.product_id))?;

            let total_price = product.price * i64::from(item.quantity);
            subtotal += total_price;
            items_count += item.quantity;
            lines.push(CartLine {
                product_id: item.product_id,
                title: product.title,
                quantity: item.quantity,
                unit_price: product.price,
                total_price,
            });
        }

        let discount_amount = cart
            .applied_promo
            .as_ref()
            .map(|promo| promo.discount_amount)
            .unwrap_or(0);

        Ok(CartDetails {
            cart_id: cart.id,
            items: lines,
            items_count,
            subtotal,
            discount_amount,
            // A fixed discount may exceed the subtotal; the total never
            // goes below zero.
            total_amount: (subtotal - discount_amount).max(0),
            applied_promo: cart.applied_promo.clone(),
        })
    }
}
