use async_trait::async_trait;
use bazaar_core::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Fixed,
    Percentage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoCode {
    pub id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub min_purchase: i64,
    /// Cap for percentage discounts; fixed discounts are never capped here.
    pub max_discount: Option<i64>,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub is_active: bool,
    pub max_uses: Option<u32>,
    pub used_count: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum PromoError {
    #[error("invalid or expired promo code")]
    Invalid,

    #[error("this promo code has reached its usage limit")]
    UsageLimitExceeded,

    #[error("minimum purchase of {required} is required to use this promo code")]
    MinimumPurchase { required: i64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait PromoStore: Send + Sync {
    async fn insert_promo(&self, promo: PromoCode) -> Result<(), StoreError>;

    async fn find_by_code(&self, code: &str) -> Result<Option<PromoCode>, StoreError>;
}

/// Validates promo codes and computes discounts. Stateless given its
/// inputs; usage counters are only ever advanced by the checkout commit.
pub struct PromoEngine {
    promos: Arc<dyn PromoStore>,
}

impl PromoEngine {
    pub fn new(promos: Arc<dyn PromoStore>) -> Self {
        Self { promos }
    }

    /// Look up and validate a promo code against a purchase total,
    /// returning the code row and the discount it grants.
    pub async fn apply_promo_code(
        &self,
        total: i64,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<(PromoCode, i64), PromoError> {
        let promo = self
            .promos
            .find_by_code(code)
            .await?
            .ok_or(PromoError::Invalid)?;

        let discount = Self::evaluate(&promo, total, now)?;
        Ok((promo, discount))
    }

    /// Validation and discount computation for an already-loaded code.
    pub fn evaluate(
        promo: &PromoCode,
        total: i64,
        now: DateTime<Utc>,
    ) -> Result<i64, PromoError> {
        if !promo.is_active || now < promo.valid_from || now > promo.valid_to {
            return Err(PromoError::Invalid);
        }

        if let Some(max_uses) = promo.max_uses {
            if promo.used_count >= max_uses {
                return Err(PromoError::UsageLimitExceeded);
            }
        }

        if total < promo.min_purchase {
            return Err(PromoError::MinimumPurchase {
                required: promo.min_purchase,
            });
        }

        let discount = match promo.discount_type {
            DiscountType::Fixed => promo.discount_value,
            DiscountType::Percentage => {
                let mut discount = total * promo.discount_value / 100;
                if let Some(cap) = promo.max_discount {
                    if discount > cap {
                        discount = cap;
                    }
                }
                discount
            }
        };

        Ok(discount)
    }
}
