use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Shipping availability and cost rules. One rule table drives
/// `get_shipping_methods`, `calculate_shipping_cost` and
/// `validate_shipping_method` so the three can never disagree.
pub struct ShippingCalculator;

pub const FREE_SHIPPING_THRESHOLD: i64 = 1_000_000;
pub const STANDARD_COST_TEHRAN: i64 = 50_000;
pub const STANDARD_COST_OTHER: i64 = 70_000;
pub const EXPRESS_COST: i64 = 80_000;
pub const TEHRAN_PROVINCE: &str = "تهران";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShippingMethodId {
    StandardPost,
    Express,
}

impl ShippingMethodId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShippingMethodId::StandardPost => "standard_post",
            ShippingMethodId::Express => "express",
        }
    }
}

impl FromStr for ShippingMethodId {
    type Err = ShippingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard_post" => Ok(ShippingMethodId::StandardPost),
            "express" => Ok(ShippingMethodId::Express),
            other => Err(ShippingError::UnknownMethod(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "unit", rename_all = "snake_case")]
pub enum DeliveryEstimate {
    Days { min: u32, max: u32 },
    Hours { min: u32, max: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingMethod {
    pub id: ShippingMethodId,
    pub name: String,
    pub description: String,
    pub cost: i64,
    /// Cost before the free-shipping threshold was applied, kept for display.
    pub original_cost: i64,
    pub is_free: bool,
    pub estimated_delivery: DeliveryEstimate,
}

#[derive(Debug, thiserror::Error)]
pub enum ShippingError {
    #[error("invalid shipping method: {0}")]
    UnknownMethod(String),

    #[error("express shipping is only available in Tehran province")]
    MethodUnavailable,
}

impl ShippingCalculator {
    /// Available methods with costs for a location and cart total.
    pub fn get_shipping_methods(
        province: &str,
        _city: &str,
        cart_total: i64,
    ) -> Vec<ShippingMethod> {
        let is_tehran = province == TEHRAN_PROVINCE;
        let is_free_shipping = cart_total >= FREE_SHIPPING_THRESHOLD;

        let standard_cost = if is_tehran {
            STANDARD_COST_TEHRAN
        } else {
            STANDARD_COST_OTHER
        };

        let mut methods = vec![ShippingMethod {
            id: ShippingMethodId::StandardPost,
            name: "پست معمولی".to_string(),
            description: "ارسال از طریق پست".to_string(),
            cost: if is_free_shipping { 0 } else { standard_cost },
            original_cost: standard_cost,
            is_free: is_free_shipping,
            estimated_delivery: DeliveryEstimate::Days { min: 3, max: 7 },
        }];

        // Courier delivery never crosses the province line.
        if is_tehran {
            methods.push(ShippingMethod {
                id: ShippingMethodId::Express,
                name: "پیک موتوری".to_string(),
                description: "ارسال سریع با پیک".to_string(),
                cost: EXPRESS_COST,
                original_cost: EXPRESS_COST,
                is_free: false,
                estimated_delivery: DeliveryEstimate::Hours { min: 2, max: 4 },
            });
        }

        methods
    }

    /// Cost of one specific method for a location and cart total.
    pub fn calculate_shipping_cost(
        method: ShippingMethodId,
        province: &str,
        cart_total: i64,
    ) -> Result<i64, ShippingError> {
        let is_tehran = province == TEHRAN_PROVINCE;

        match method {
            ShippingMethodId::StandardPost => {
                if cart_total >= FREE_SHIPPING_THRESHOLD {
                    return Ok(0);
                }
                Ok(if is_tehran {
                    STANDARD_COST_TEHRAN
                } else {
                    STANDARD_COST_OTHER
                })
            }
            ShippingMethodId::Express => {
                if !is_tehran {
                    return Err(ShippingError::MethodUnavailable);
                }
                Ok(EXPRESS_COST)
            }
        }
    }

    pub fn validate_shipping_method(
        method: ShippingMethodId,
        province: &str,
    ) -> Result<(), ShippingError> {
        match method {
            ShippingMethodId::StandardPost => Ok(()),
            ShippingMethodId::Express => {
                if province == TEHRAN_PROVINCE {
                    Ok(())
                } else {
                    Err(ShippingError::MethodUnavailable)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tehran_below_threshold() {
        let methods =
            ShippingCalculator::get_shipping_methods(TEHRAN_PROVINCE, "تهران", 400_000);

        assert_eq!(methods.len(), 2);
        let standard = &methods[0];
        assert_eq!(standard.id, ShippingMethodId::StandardPost);
        assert_eq!(standard.cost, STANDARD_COST_TEHRAN);
        assert!(!standard.is_free);
    }

    #[test]
    fn test_free_shipping_over_threshold() {
        let methods =
            ShippingCalculator::get_shipping_methods(TEHRAN_PROVINCE, "تهران", 1_200_000);

        let standard = &methods[0];
        assert_eq!(standard.cost, 0);
        assert_eq!(standard.original_cost, STANDARD_COST_TEHRAN);
        assert!(standard.is_free);

        // Courier cost is unaffected by the threshold.
        let express = &methods[1];
        assert_eq!(express.cost, EXPRESS_COST);
    }

    #[test]
    fn test_express_absent_outside_tehran() {
        let methods = ShippingCalculator::get_shipping_methods("اصفهان", "اصفهان", 400_000);

        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].id, ShippingMethodId::StandardPost);
        assert_eq!(methods[0].cost, STANDARD_COST_OTHER);
    }

    #[test]
    fn test_cost_matches_method_list() {
        for (province, total) in [
            (TEHRAN_PROVINCE, 400_000),
            (TEHRAN_PROVINCE, 1_000_000),
            ("شیراز", 999_999),
        ] {
            for method in ShippingCalculator::get_shipping_methods(province, "", total) {
                let cost =
                    ShippingCalculator::calculate_shipping_cost(method.id, province, total)
                        .unwrap();
                assert_eq!(cost, method.cost);
            }
        }
    }

    #[test]
    fn test_express_rejected_outside_tehran() {
        let err = ShippingCalculator::calculate_shipping_cost(
            ShippingMethodId::Express,
            "خوزستان",
            400_000,
        )
        .unwrap_err();
        assert!(matches!(err, ShippingError::MethodUnavailable));

        assert!(ShippingCalculator::validate_shipping_method(
            ShippingMethodId::Express,
            "خوزستان"
        )
        .is_err());
    }

    #[test]
    fn test_method_id_round_trip() {
        assert_eq!(
            "standard_post".parse::<ShippingMethodId>().unwrap(),
            ShippingMethodId::StandardPost
        );
        assert!("pigeon".parse::<ShippingMethodId>().is_err());
    }
}
