// libs/cart-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc, NaiveDate, NaiveTime};
use std::fmt;

use availability_cell::models::{ConsultationMode, SlotResource};

// ==============================================================================
// CORE CART MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForWhom {
    #[serde(rename = "self")]
    SelfBooking,
    #[serde(rename = "dependant")]
    Dependant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitType {
    Center,
    Home,
}

impl fmt::Display for VisitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisitType::Center => write!(f, "center"),
            VisitType::Home => write!(f, "home"),
        }
    }
}

/// Type-specific half of a cart item. The tag doubles as the `item_type`
/// column, so exactly one variant's fields exist per row by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "item_type", rename_all = "snake_case")]
pub enum CartItemPayload {
    Test {
        center_id: Uuid,
        visit_type: VisitType,
        test_ids: Vec<Uuid>,
        address: Option<String>,
    },
    HealthPackage {
        package_id: Uuid,
        center_id: Uuid,
    },
    SponsoredPackage {
        package_id: Uuid,
        center_id: Uuid,
    },
    DoctorAppointment {
        doctor_id: Uuid,
        specialization: String,
        appointment_date: NaiveDate,
        appointment_time: NaiveTime,
        mode: ConsultationMode,
    },
}

impl CartItemPayload {
    pub fn item_type(&self) -> &'static str {
        match self {
            CartItemPayload::Test { .. } => "test",
            CartItemPayload::HealthPackage { .. } => "health_package",
            CartItemPayload::SponsoredPackage { .. } => "sponsored_package",
            CartItemPayload::DoctorAppointment { .. } => "doctor_appointment",
        }
    }

    /// The diagnostic center the item is booked against, when it has one.
    pub fn center_id(&self) -> Option<Uuid> {
        match self {
            CartItemPayload::Test { center_id, .. }
            | CartItemPayload::HealthPackage { center_id, .. }
            | CartItemPayload::SponsoredPackage { center_id, .. } => Some(*center_id),
            CartItemPayload::DoctorAppointment { .. } => None,
        }
    }
}

/// One line of a user's in-progress booking: common envelope plus the
/// type-specific payload. Pricing fields are derived, never user-supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub user_id: Uuid,
    pub for_whom: ForWhom,
    pub dependant_id: Option<Uuid>,
    pub patient_name: String,
    #[serde(flatten)]
    pub payload: CartItemPayload,
    pub price: f64,
    pub discount_amount: f64,
    pub final_price: f64,
    /// Lab-type bookings stage their slot choice here before checkout.
    pub selected_date: Option<NaiveDate>,
    pub selected_time: Option<NaiveTime>,
    pub slot_confirmed: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartItem {
    /// The slot capacity key this item will claim at checkout, if any.
    /// Doctor items carry the slot in the payload; lab-type items use the
    /// staged selection. Items without a selection are not slot-bound.
    pub fn slot_binding(&self) -> Option<(SlotResource, NaiveDate, NaiveTime)> {
        match &self.payload {
            CartItemPayload::DoctorAppointment { doctor_id, appointment_date, appointment_time, mode, .. } => {
                Some((
                    SlotResource::Doctor { id: *doctor_id, mode: *mode },
                    *appointment_date,
                    *appointment_time,
                ))
            }
            payload => {
                let center_id = payload.center_id()?;
                let date = self.selected_date?;
                let time = self.selected_time?;
                Some((SlotResource::Center(center_id), date, time))
            }
        }
    }

    /// Date and time the checkout orchestrator schedules this item at.
    pub fn scheduled_for(&self) -> Option<(NaiveDate, NaiveTime)> {
        match &self.payload {
            CartItemPayload::DoctorAppointment { appointment_date, appointment_time, .. } => {
                Some((*appointment_date, *appointment_time))
            }
            _ => match (self.selected_date, self.selected_time) {
                (Some(date), Some(time)) => Some((date, time)),
                _ => None,
            },
        }
    }
}

/// A user's cart. Created lazily on first add, only ever emptied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

// ==============================================================================
// PRICING MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub price: f64,
    pub discount_amount: f64,
    pub final_price: f64,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddCartItemRequest {
    pub for_whom: ForWhom,
    pub dependant_id: Option<Uuid>,
    #[serde(flatten)]
    pub item: CartItemPayload,
    pub notes: Option<String>,
    /// Explicit confirmation to replace a conflicting item already in the
    /// cart instead of failing with a conflict.
    pub override_conflict: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectSlotRequest {
    pub date: NaiveDate,
    pub time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartView {
    /// None until the first item creates the cart.
    pub cart_id: Option<Uuid>,
    pub items: Vec<CartItem>,
    pub total_amount: f64,
    pub total_discount: f64,
    pub final_payable: f64,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum CartError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Slot has no remaining capacity")]
    SlotFull,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<catalog_cell::models::CatalogError> for CartError {
    fn from(e: catalog_cell::models::CatalogError) -> Self {
        match e {
            catalog_cell::models::CatalogError::NotFound(entity) => CartError::NotFound(entity),
            catalog_cell::models::CatalogError::DatabaseError(msg) => CartError::DatabaseError(msg),
        }
    }
}

impl From<availability_cell::models::AvailabilityError> for CartError {
    fn from(e: availability_cell::models::AvailabilityError) -> Self {
        use availability_cell::models::AvailabilityError;
        match e {
            AvailabilityError::ValidationError(msg) => CartError::ValidationError(msg),
            AvailabilityError::NotFound(entity) => CartError::NotFound(entity),
            AvailabilityError::SlotFull => CartError::SlotFull,
            AvailabilityError::DatabaseError(msg) => CartError::DatabaseError(msg),
        }
    }
}
