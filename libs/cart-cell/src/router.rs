// libs/cart-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, patch, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn cart_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/", get(handlers::get_cart))
        .route("/", delete(handlers::clear_cart))
        .route("/items", post(handlers::add_item))
        .route("/items/{item_id}", delete(handlers::remove_item))
        .route("/items/{item_id}/slot", patch(handlers::select_slot))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
