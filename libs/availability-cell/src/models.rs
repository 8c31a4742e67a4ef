// libs/availability-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc, NaiveDate, NaiveTime};
use std::fmt;

// ==============================================================================
// SLOT MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationMode {
    InClinic,
    Tele,
}

impl fmt::Display for ConsultationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsultationMode::InClinic => write!(f, "in_clinic"),
            ConsultationMode::Tele => write!(f, "tele"),
        }
    }
}

/// The bookable resource a slot belongs to. The `(resource, date, start)`
/// triple is the capacity key everything in this cell revolves around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotResource {
    Center(Uuid),
    Doctor { id: Uuid, mode: ConsultationMode },
}

impl SlotResource {
    pub fn kind(&self) -> &'static str {
        match self {
            SlotResource::Center(_) => "center",
            SlotResource::Doctor { .. } => "doctor",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            SlotResource::Center(id) => *id,
            SlotResource::Doctor { id, .. } => *id,
        }
    }

    pub fn mode(&self) -> Option<ConsultationMode> {
        match self {
            SlotResource::Center(_) => None,
            SlotResource::Doctor { mode, .. } => Some(*mode),
        }
    }
}

/// A bookable time window. Center windows are derived on demand from the
/// center's operating hours; doctor windows are persisted `DoctorSlot` rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotWindow {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub capacity: i32,
}

/// A slot window annotated with live occupancy, as served to client UIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotAvailability {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub capacity: i32,
    pub booked: i32,
    pub available_capacity: i32,
    /// Past slots are shown for context but are never bookable.
    pub is_past: bool,
}

/// Persisted doctor availability window, unique on
/// `(doctor_id, mode, date, start_time, end_time)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorSlot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub mode: ConsultationMode,
    pub date: NaiveDate,
    pub day_of_week: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub capacity: i32,
    pub created_at: DateTime<Utc>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotSpec {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotRangeSpec {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_duration_minutes: i32,
}

/// Bulk creation request: either explicit windows or a range to auto-split,
/// applied to every date in `dates`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDoctorSlotsRequest {
    pub mode: ConsultationMode,
    pub dates: Vec<NaiveDate>,
    pub slots: Option<Vec<SlotSpec>>,
    pub range: Option<SlotRangeSpec>,
    pub capacity: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotCreateFailure {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub reason: String,
}

/// Per-row outcome of a bulk slot creation. The one place in the system where
/// "some succeed, some fail" is an accepted result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkCreateReport {
    pub created: Vec<DoctorSlot>,
    pub errors: Vec<SlotCreateFailure>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AvailabilityError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Slot has no remaining capacity")]
    SlotFull,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<catalog_cell::models::CatalogError> for AvailabilityError {
    fn from(e: catalog_cell::models::CatalogError) -> Self {
        match e {
            catalog_cell::models::CatalogError::NotFound(entity) => {
                AvailabilityError::NotFound(entity)
            }
            catalog_cell::models::CatalogError::DatabaseError(msg) => {
                AvailabilityError::DatabaseError(msg)
            }
        }
    }
}
