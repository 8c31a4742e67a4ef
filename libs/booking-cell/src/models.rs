// libs/booking-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc, NaiveDate, NaiveTime};
use std::fmt;

use availability_cell::models::ConsultationMode;
use cart_cell::models::{CartItem, ForWhom, VisitType};

// ==============================================================================
// APPOINTMENT MODELS
// ==============================================================================

/// Appointment lifecycle. Completed and cancelled are terminal; only
/// pending and confirmed appointments occupy slot capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }

    pub fn occupies_slot(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A booked appointment. One row per checked-out cart item; lab bookings
/// additionally carry their tests or package as `AppointmentItem` lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub appointment_type: String,
    pub for_whom: ForWhom,
    pub dependant_id: Option<Uuid>,
    pub patient_name: String,
    pub center_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub mode: Option<ConsultationMode>,
    pub specialization: Option<String>,
    pub visit_type: Option<VisitType>,
    pub address: Option<String>,
    /// Date and time split out of `scheduled_at` for exact-key occupancy
    /// queries against the slot grid.
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub scheduled_at: DateTime<Utc>,
    pub price: f64,
    pub discount_amount: f64,
    pub final_price: f64,
    /// How the booking was paid for, as captured at checkout.
    pub payment_mode: Option<String>,
    pub transaction_id: Option<String>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One catalog line under a lab appointment: a test or a package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentItem {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub test_id: Option<Uuid>,
    pub package_id: Option<Uuid>,
    pub name: String,
    pub price: f64,
}

// ==============================================================================
// CHECKOUT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeBreakdown {
    pub item_type: String,
    pub count: usize,
    pub subtotal: f64,
}

/// What the user is about to pay, computed from the repriced cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSummary {
    pub items: Vec<CartItem>,
    pub breakdown: Vec<TypeBreakdown>,
    pub total_amount: f64,
    pub total_discount: f64,
    pub final_payable: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutResult {
    pub appointments: Vec<Appointment>,
    pub total_paid: f64,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

/// Payment details captured at checkout. A present transaction id means the
/// payment already went through and the bookings start out confirmed;
/// without one they stay pending until payment is collected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmCheckoutRequest {
    pub payment_mode: String,
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleRequest {
    pub date: NaiveDate,
    pub time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum BookingError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Slot has no remaining capacity")]
    SlotFull,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<cart_cell::models::CartError> for BookingError {
    fn from(e: cart_cell::models::CartError) -> Self {
        use cart_cell::models::CartError;
        match e {
            CartError::ValidationError(msg) => BookingError::ValidationError(msg),
            CartError::NotFound(entity) => BookingError::NotFound(entity),
            CartError::Conflict(msg) => BookingError::Conflict(msg),
            CartError::SlotFull => BookingError::SlotFull,
            CartError::DatabaseError(msg) => BookingError::DatabaseError(msg),
        }
    }
}

impl From<availability_cell::models::AvailabilityError> for BookingError {
    fn from(e: availability_cell::models::AvailabilityError) -> Self {
        use availability_cell::models::AvailabilityError;
        match e {
            AvailabilityError::ValidationError(msg) => BookingError::ValidationError(msg),
            AvailabilityError::NotFound(entity) => BookingError::NotFound(entity),
            AvailabilityError::SlotFull => BookingError::SlotFull,
            AvailabilityError::DatabaseError(msg) => BookingError::DatabaseError(msg),
        }
    }
}
