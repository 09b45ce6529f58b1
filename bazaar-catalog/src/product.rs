use async_trait::async_trait;
use bazaar_core::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sellable product. Stock is the shared resource consumed by checkout;
/// it is only ever decremented through the store's conditional decrement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub title: String,
    pub sku: String,
    /// Unit price in the smallest currency unit.
    pub price: i64,
    pub stock: u32,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(title: impl Into<String>, sku: impl Into<String>, price: i64, stock: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            sku: sku.into(),
            price,
            stock,
            is_available: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the requested quantity can currently be satisfied.
    pub fn has_stock(&self, quantity: u32) -> bool {
        self.stock >= quantity
    }
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn insert_product(&self, product: Product) -> Result<(), StoreError>;

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, StoreError>;

    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;

    /// Replace the stock level (administrative restock).
    async fn set_stock(&self, id: Uuid, stock: u32) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_product_defaults() {
        let product = Product::new("کتاب قصه", "BK-001", 250_000, 5);

        assert!(product.is_available);
        assert_eq!(product.stock, 5);
        assert!(product.has_stock(5));
        assert!(!product.has_stock(6));
    }
}
