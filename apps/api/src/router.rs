use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use availability_cell::router::availability_routes;
use booking_cell::router::{appointment_routes, checkout_routes};
use cart_cell::router::cart_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "CareBook API is running!" }))
        .nest("/cart", cart_routes(state.clone()))
        .nest("/checkout", checkout_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/availability", availability_routes(state.clone()))
}
