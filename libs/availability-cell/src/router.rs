// libs/availability-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn availability_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/centers/{center_id}/slots", get(handlers::get_center_slots))
        .route("/doctors/{doctor_id}/slots", get(handlers::get_doctor_slots))
        .route("/doctors/{doctor_id}/slots", post(handlers::create_doctor_slots))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
