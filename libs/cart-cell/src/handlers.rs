// libs/cart-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{AddCartItemRequest, CartError, SelectSlotRequest};
use crate::services::cart::CartService;

fn map_cart_error(e: CartError) -> AppError {
    match e {
        CartError::ValidationError(msg) => AppError::BadRequest(msg),
        CartError::NotFound(entity) => AppError::NotFound(format!("{} not found", entity)),
        CartError::Conflict(msg) => AppError::Conflict(msg),
        CartError::SlotFull => AppError::SlotFull("Slot has no remaining capacity".to_string()),
        CartError::DatabaseError(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn add_item(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<AddCartItemRequest>,
) -> Result<Json<Value>, AppError> {
    let service = CartService::new(&state);

    let item = service.add_item(&user, request, auth.token()).await
        .map_err(map_cart_error)?;

    Ok(Json(json!({
        "success": true,
        "item": item
    })))
}

#[axum::debug_handler]
pub async fn get_cart(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = CartService::new(&state);

    let cart = service.get_cart(&user, auth.token()).await
        .map_err(map_cart_error)?;

    Ok(Json(json!({
        "success": true,
        "cart": cart
    })))
}

#[axum::debug_handler]
pub async fn remove_item(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Path(item_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = CartService::new(&state);

    service.remove_item(&user, item_id, auth.token()).await
        .map_err(map_cart_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Item removed from cart"
    })))
}

#[axum::debug_handler]
pub async fn clear_cart(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = CartService::new(&state);

    let removed = service.clear_cart(&user, auth.token()).await
        .map_err(map_cart_error)?;

    Ok(Json(json!({
        "success": true,
        "removed": removed
    })))
}

/// Stage a slot choice on a lab-type cart item ahead of checkout.
#[axum::debug_handler]
pub async fn select_slot(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Path(item_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<SelectSlotRequest>,
) -> Result<Json<Value>, AppError> {
    let service = CartService::new(&state);

    let item = service.select_slot(&user, item_id, request, auth.token()).await
        .map_err(map_cart_error)?;

    Ok(Json(json!({
        "success": true,
        "item": item
    })))
}
