use axum::http::HeaderMap;
use bazaar_checkout::cart::CartOwner;
use uuid::Uuid;

use crate::error::AppError;

/// Authenticated user id is an opaque header; token mechanics live
/// upstream of this service.
pub const USER_HEADER: &str = "x-user-id";
/// Anonymous carts are keyed by a client-held id.
pub const CART_HEADER: &str = "x-cart-id";

pub fn user_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .filter(|value| !value.is_empty())
}

/// Resolve the cart owner for a request. When neither header is present
/// a fresh anonymous id is minted and returned so the client can keep it.
pub fn cart_owner(headers: &HeaderMap) -> Result<(CartOwner, Option<Uuid>), AppError> {
    if let Some(user) = user_id(headers) {
        return Ok((CartOwner::User(user), None));
    }

    match headers.get(CART_HEADER) {
        Some(value) => {
            let raw = value
                .to_str()
                .map_err(|_| AppError::bad_request("INVALID_CART_ID", "Invalid cart id format"))?;
            let id = Uuid::parse_str(raw)
                .map_err(|_| AppError::bad_request("INVALID_CART_ID", "Invalid cart id format"))?;
            Ok((CartOwner::Anonymous(id), None))
        }
        None => {
            let id = Uuid::new_v4();
            Ok((CartOwner::Anonymous(id), Some(id)))
        }
    }
}
