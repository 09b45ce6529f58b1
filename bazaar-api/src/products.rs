use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use bazaar_catalog::Product;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub title: String,
    pub sku: String,
    pub price: i64,
    #[serde(default)]
    pub stock: u32,
}

#[derive(Debug, Deserialize)]
pub struct SetStockRequest {
    pub stock: u32,
}

/// GET /v1/products
pub async fn list_products(
    State(state): State<AppState>,
) -> Result<Json<Vec<Product>>, AppError> {
    Ok(Json(state.products.list_products().await?))
}

/// GET /v1/products/{id}
pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<Product>, AppError> {
    let product = state
        .products
        .get_product(product_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("product not found: {product_id}")))?;
    Ok(Json(product))
}

/// POST /v1/products (administrative)
pub async fn create_product(
    State(state): State<AppState>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let product = Product::new(req.title, req.sku, req.price, req.stock);
    state.products.insert_product(product.clone()).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// PUT /v1/products/{id}/stock (administrative restock)
pub async fn set_stock(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(req): Json<SetStockRequest>,
) -> Result<Json<Product>, AppError> {
    state.products.set_stock(product_id, req.stock).await?;

    let product = state
        .products
        .get_product(product_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("product not found: {product_id}")))?;
    Ok(Json(product))
}
