// libs/availability-cell/src/services/reservation.rs
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use serde_json::json;
use tracing::{debug, warn};

use shared_database::supabase::SupabaseClient;

use crate::models::{AvailabilityError, SlotResource};

/// Serialization point for slot capacity. `reserve` maps to the
/// `reserve_slot` Postgres function, a single conditional increment
/// (`UPDATE ... SET booked = booked + 1 WHERE booked < capacity`), so the
/// check and the claim happen in one statement. App code never does a
/// read-then-write on the counter.
pub struct SlotReservationService {
    supabase: Arc<SupabaseClient>,
}

impl SlotReservationService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Claim one unit of capacity for the slot key. `Err(SlotFull)` when the
    /// conditional update matched no row, i.e. the slot is at capacity.
    pub async fn reserve(
        &self,
        resource: &SlotResource,
        date: NaiveDate,
        start_time: NaiveTime,
        capacity: i32,
        auth_token: &str,
    ) -> Result<(), AvailabilityError> {
        let args = json!({
            "p_resource_kind": resource.kind(),
            "p_resource_id": resource.id(),
            "p_mode": resource.mode().map(|m| m.to_string()),
            "p_slot_date": date.to_string(),
            "p_start_time": start_time.format("%H:%M:%S").to_string(),
            "p_capacity": capacity,
        });

        let reserved: bool = self.supabase
            .rpc("reserve_slot", Some(auth_token), args)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        if reserved {
            debug!("Reserved slot {}/{} {} {}", resource.kind(), resource.id(), date, start_time);
            Ok(())
        } else {
            warn!("Slot at capacity: {}/{} {} {}", resource.kind(), resource.id(), date, start_time);
            Err(AvailabilityError::SlotFull)
        }
    }

    /// Return one previously claimed unit. Used when a checkout rolls back
    /// and when an appointment is cancelled or moved off the slot.
    pub async fn release(
        &self,
        resource: &SlotResource,
        date: NaiveDate,
        start_time: NaiveTime,
        auth_token: &str,
    ) -> Result<(), AvailabilityError> {
        let args = json!({
            "p_resource_kind": resource.kind(),
            "p_resource_id": resource.id(),
            "p_mode": resource.mode().map(|m| m.to_string()),
            "p_slot_date": date.to_string(),
            "p_start_time": start_time.format("%H:%M:%S").to_string(),
        });

        let _: serde_json::Value = self.supabase
            .rpc("release_slot", Some(auth_token), args)
            .await
            .map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        debug!("Released slot {}/{} {} {}", resource.kind(), resource.id(), date, start_time);
        Ok(())
    }
}
