// libs/catalog-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::NaiveTime;

// ==============================================================================
// CATALOG REFERENCE MODELS (read-only, owned by the catalog back office)
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabTest {
    pub id: Uuid,
    pub name: String,
    pub code: Option<String>,
    pub price: f64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticCenter {
    pub id: Uuid,
    pub name: String,
    pub city: Option<String>,
    pub timezone: String,
    pub work_start: NaiveTime,
    pub work_end: NaiveTime,
    pub slot_interval_minutes: i32,
    /// Concurrent bookings the center can absorb per generated slot.
    pub slot_capacity: i32,
    /// Percentage discount the center applies on top of any package discount.
    pub discount_percent: f64,
    pub home_collection_available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthPackage {
    pub id: Uuid,
    pub name: String,
    pub price: f64,
    /// Flat discount declared on the package itself.
    pub discount_amount: f64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SponsoredPackage {
    pub id: Uuid,
    pub name: String,
    pub sponsor_name: String,
    pub price: f64,
    pub discount_amount: f64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub name: String,
    pub specialization: String,
    pub consultation_fee: f64,
    pub supports_in_clinic: bool,
    pub supports_tele: bool,
    pub timezone: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependant {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub relation: Option<String>,
}

/// Catalog data a single cart item's pricing depends on, fetched once per
/// recompute so the Pricing Engine itself stays pure.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub tests: Vec<LabTest>,
    pub package: Option<HealthPackage>,
    pub sponsored_package: Option<SponsoredPackage>,
    pub center: Option<DiagnosticCenter>,
    pub doctor: Option<Doctor>,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
