pub mod cart;
pub mod promo;
pub mod shipping;

pub use cart::{AppliedPromo, Cart, CartItem, CartOwner, CartService, CartStore};
pub use promo::{DiscountType, PromoCode, PromoEngine, PromoError, PromoStore};
pub use shipping::{ShippingCalculator, ShippingError, ShippingMethod, ShippingMethodId};
