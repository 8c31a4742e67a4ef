// libs/booking-cell/src/handlers.rs
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

use crate::models::{BookingError, CancelRequest, ConfirmCheckoutRequest, RescheduleRequest};
use crate::services::checkout::BookingService;

fn map_booking_error(e: BookingError) -> AppError {
    match e {
        BookingError::EmptyCart => AppError::BadRequest("Cart is empty".to_string()),
        BookingError::ValidationError(msg) => AppError::BadRequest(msg),
        BookingError::NotFound(entity) => AppError::NotFound(format!("{} not found", entity)),
        BookingError::SlotFull => AppError::SlotFull("Slot has no remaining capacity".to_string()),
        BookingError::Conflict(msg) => AppError::Conflict(msg),
        BookingError::DatabaseError(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn checkout_preview(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&state);

    let summary = service.preview(&user, auth.token()).await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "summary": summary
    })))
}

#[axum::debug_handler]
pub async fn checkout_confirm(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<ConfirmCheckoutRequest>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&state);

    let result = service.confirm(&user, request, auth.token()).await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointments": result.appointments,
        "total_paid": result.total_paid
    })))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&state);

    let appointments = service.list_appointments(&user, auth.token()).await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointments": appointments
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&state);

    let (appointment, items) = service.get_appointment(&user, appointment_id, auth.token()).await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "items": items
    })))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<RescheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&state);

    let appointment = service.reschedule(&user, appointment_id, request, auth.token()).await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&state);

    let appointment = service.cancel(&user, appointment_id, request, auth.token()).await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}
