// libs/availability-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde::Deserialize;
use serde_json::{json, Value};
use chrono::NaiveDate;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::{AvailabilityError, ConsultationMode, CreateDoctorSlotsRequest};
use crate::services::availability::AvailabilityService;

#[derive(Debug, Deserialize)]
pub struct CenterSlotsQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct DoctorSlotsQuery {
    pub date: NaiveDate,
    pub mode: ConsultationMode,
}

fn map_availability_error(e: AvailabilityError) -> AppError {
    match e {
        AvailabilityError::ValidationError(msg) => AppError::BadRequest(msg),
        AvailabilityError::NotFound(entity) => AppError::NotFound(format!("{} not found", entity)),
        AvailabilityError::SlotFull => AppError::SlotFull("Slot has no remaining capacity".to_string()),
        AvailabilityError::DatabaseError(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn get_center_slots(
    State(state): State<Arc<AppConfig>>,
    Path(center_id): Path<Uuid>,
    Query(query): Query<CenterSlotsQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);

    let slots = service.get_center_slots(center_id, query.date, auth.token()).await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "center_id": center_id,
        "date": query.date,
        "slots": slots
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_slots(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<DoctorSlotsQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);

    let slots = service.get_doctor_slots(doctor_id, query.mode, query.date, auth.token()).await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "date": query.date,
        "mode": query.mode,
        "slots": slots
    })))
}

/// Bulk slot creation with partial-success semantics: the response always
/// carries both the created rows and the per-row failures.
#[axum::debug_handler]
pub async fn create_doctor_slots(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<CreateDoctorSlotsRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);

    let report = service.create_doctor_slots(doctor_id, request, auth.token()).await
        .map_err(map_availability_error)?;

    Ok(Json(json!({
        "success": report.errors.is_empty(),
        "created": report.created,
        "errors": report.errors
    })))
}
