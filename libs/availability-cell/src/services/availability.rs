// libs/availability-cell/src/services/availability.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use catalog_cell::services::catalog::CatalogService;

use crate::models::{
    AvailabilityError, BulkCreateReport, ConsultationMode, CreateDoctorSlotsRequest,
    DoctorSlot, SlotAvailability, SlotCreateFailure, SlotResource,
};
use crate::services::slots::{expand_time_range, generate_center_slots, is_past_slot};

pub struct AvailabilityService {
    supabase: Arc<SupabaseClient>,
    catalog: CatalogService,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_client(Arc::new(SupabaseClient::new(config)))
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        let catalog = CatalogService::with_client(Arc::clone(&supabase));
        Self { supabase, catalog }
    }

    /// Derived slots for a diagnostic center on one date, annotated with live
    /// occupancy and past-ness in the center's time zone.
    pub async fn get_center_slots(
        &self,
        center_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<SlotAvailability>, AvailabilityError> {
        debug!("Listing slots for center {} on {}", center_id, date);

        let center = self.catalog.get_diagnostic_center(center_id, auth_token).await?;

        let windows = generate_center_slots(
            date,
            center.work_start,
            center.work_end,
            center.slot_interval_minutes,
            center.slot_capacity,
        )?;

        let booked = self.booked_counts_for_center(center_id, date, auth_token).await?;
        let now = Utc::now();

        let slots = windows
            .into_iter()
            .map(|w| {
                let booked_count = booked.get(&w.start_time).copied().unwrap_or(0);
                SlotAvailability {
                    date: w.date,
                    start_time: w.start_time,
                    end_time: w.end_time,
                    capacity: w.capacity,
                    booked: booked_count,
                    available_capacity: (w.capacity - booked_count).max(0),
                    is_past: is_past_slot(w.date, w.start_time, &center.timezone, now),
                }
            })
            .collect();

        Ok(slots)
    }

    /// Persisted doctor windows for one date and consultation mode, with
    /// live occupancy.
    pub async fn get_doctor_slots(
        &self,
        doctor_id: Uuid,
        mode: ConsultationMode,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<SlotAvailability>, AvailabilityError> {
        debug!("Listing {} slots for doctor {} on {}", mode, doctor_id, date);

        let doctor = self.catalog.get_doctor(doctor_id, auth_token).await?;

        let path = format!(
            "/rest/v1/doctor_slots?doctor_id=eq.{}&mode=eq.{}&date=eq.{}&order=start_time.asc",
            doctor_id, mode, date
        );
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        let slots: Vec<DoctorSlot> = result.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<DoctorSlot>, _>>()
            .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse doctor slots: {}", e)))?;

        let booked = self.booked_counts_for_doctor(doctor_id, mode, date, auth_token).await?;
        let now = Utc::now();

        Ok(slots
            .into_iter()
            .map(|s| {
                let booked_count = booked.get(&s.start_time).copied().unwrap_or(0);
                SlotAvailability {
                    date: s.date,
                    start_time: s.start_time,
                    end_time: s.end_time,
                    capacity: s.capacity,
                    booked: booked_count,
                    available_capacity: (s.capacity - booked_count).max(0),
                    is_past: is_past_slot(s.date, s.start_time, &doctor.timezone, now),
                }
            })
            .collect())
    }

    /// Look up the declared capacity for a slot key. Used by checkout before
    /// handing the key to the reservation guard.
    pub async fn declared_capacity(
        &self,
        resource: &SlotResource,
        date: NaiveDate,
        start_time: NaiveTime,
        auth_token: &str,
    ) -> Result<i32, AvailabilityError> {
        match resource {
            SlotResource::Center(center_id) => {
                let center = self.catalog.get_diagnostic_center(*center_id, auth_token).await?;
                let windows = generate_center_slots(
                    date,
                    center.work_start,
                    center.work_end,
                    center.slot_interval_minutes,
                    center.slot_capacity,
                )?;
                windows.iter()
                    .find(|w| w.start_time == start_time)
                    .map(|w| w.capacity)
                    .ok_or_else(|| AvailabilityError::ValidationError(
                        format!("{} is not a bookable slot for this center", start_time)
                    ))
            }
            SlotResource::Doctor { id, mode } => {
                let path = format!(
                    "/rest/v1/doctor_slots?doctor_id=eq.{}&mode=eq.{}&date=eq.{}&start_time=eq.{}",
                    id, mode, date, start_time.format("%H:%M:%S")
                );
                let result: Vec<Value> = self.supabase.request(
                    Method::GET,
                    &path,
                    Some(auth_token),
                    None,
                ).await.map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

                let slot = result.into_iter().next()
                    .ok_or_else(|| AvailabilityError::NotFound("Doctor slot".to_string()))?;
                let slot: DoctorSlot = serde_json::from_value(slot)
                    .map_err(|e| AvailabilityError::DatabaseError(format!("Failed to parse doctor slot: {}", e)))?;
                Ok(slot.capacity)
            }
        }
    }

    /// Live booked count for one exact slot key.
    pub async fn count_booked(
        &self,
        resource: &SlotResource,
        date: NaiveDate,
        start_time: NaiveTime,
        auth_token: &str,
    ) -> Result<i32, AvailabilityError> {
        let counts = match resource {
            SlotResource::Center(center_id) => {
                self.booked_counts_for_center(*center_id, date, auth_token).await?
            }
            SlotResource::Doctor { id, mode } => {
                self.booked_counts_for_doctor(*id, *mode, date, auth_token).await?
            }
        };
        Ok(counts.get(&start_time).copied().unwrap_or(0))
    }

    /// Bulk-create persisted doctor windows. Each candidate succeeds or fails
    /// on its own; the batch never aborts because one row was bad.
    pub async fn create_doctor_slots(
        &self,
        doctor_id: Uuid,
        request: CreateDoctorSlotsRequest,
        auth_token: &str,
    ) -> Result<BulkCreateReport, AvailabilityError> {
        if request.dates.is_empty() {
            return Err(AvailabilityError::ValidationError(
                "At least one date is required".to_string(),
            ));
        }

        let capacity = request.capacity.unwrap_or(1);
        if capacity < 1 {
            return Err(AvailabilityError::ValidationError(
                "Slot capacity must be at least 1".to_string(),
            ));
        }

        // Mode support is validated once up front; per-row errors are for
        // per-row problems.
        let doctor = self.catalog.get_doctor(doctor_id, auth_token).await?;
        let mode_supported = match request.mode {
            ConsultationMode::InClinic => doctor.supports_in_clinic,
            ConsultationMode::Tele => doctor.supports_tele,
        };
        if !mode_supported {
            return Err(AvailabilityError::ValidationError(
                format!("Doctor does not offer {} consultations", request.mode),
            ));
        }

        let candidates = self.slot_candidates(&request)?;

        let mut report = BulkCreateReport { created: vec![], errors: vec![] };

        for date in &request.dates {
            for (start_time, end_time) in &candidates {
                if start_time >= end_time {
                    report.errors.push(SlotCreateFailure {
                        date: *date,
                        start_time: *start_time,
                        end_time: *end_time,
                        reason: "End time must be after start time".to_string(),
                    });
                    continue;
                }

                match self.insert_doctor_slot(
                    doctor_id, request.mode, *date, *start_time, *end_time, capacity, auth_token,
                ).await {
                    Ok(slot) => report.created.push(slot),
                    Err(reason) => {
                        warn!("Slot creation failed for doctor {} {} {}: {}",
                              doctor_id, date, start_time, reason);
                        report.errors.push(SlotCreateFailure {
                            date: *date,
                            start_time: *start_time,
                            end_time: *end_time,
                            reason,
                        });
                    }
                }
            }
        }

        info!("Bulk slot creation for doctor {}: {} created, {} failed",
              doctor_id, report.created.len(), report.errors.len());
        Ok(report)
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    fn slot_candidates(
        &self,
        request: &CreateDoctorSlotsRequest,
    ) -> Result<Vec<(NaiveTime, NaiveTime)>, AvailabilityError> {
        if let Some(slots) = &request.slots {
            if slots.is_empty() {
                return Err(AvailabilityError::ValidationError(
                    "Slot list must not be empty".to_string(),
                ));
            }
            // Invalid pairs become per-row failures downstream.
            return Ok(slots.iter().map(|s| (s.start_time, s.end_time)).collect());
        }

        if let Some(range) = &request.range {
            return expand_time_range(range.start_time, range.end_time, range.slot_duration_minutes);
        }

        Err(AvailabilityError::ValidationError(
            "Either explicit slots or a range with slot duration is required".to_string(),
        ))
    }

    async fn insert_doctor_slot(
        &self,
        doctor_id: Uuid,
        mode: ConsultationMode,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        capacity: i32,
        auth_token: &str,
    ) -> Result<DoctorSlot, String> {
        // Unique key: (doctor_id, mode, date, start_time, end_time).
        let existing_path = format!(
            "/rest/v1/doctor_slots?doctor_id=eq.{}&mode=eq.{}&date=eq.{}&start_time=eq.{}&end_time=eq.{}",
            doctor_id, mode, date,
            start_time.format("%H:%M:%S"), end_time.format("%H:%M:%S")
        );
        let existing: Vec<Value> = self.supabase.request(
            Method::GET,
            &existing_path,
            Some(auth_token),
            None,
        ).await.map_err(|e| e.to_string())?;

        if !existing.is_empty() {
            return Err("Slot already exists for this date and time".to_string());
        }

        let slot_data = json!({
            "doctor_id": doctor_id,
            "mode": mode.to_string(),
            "date": date,
            "day_of_week": date.format("%A").to_string(),
            "start_time": start_time.format("%H:%M:%S").to_string(),
            "end_time": end_time.format("%H:%M:%S").to_string(),
            "capacity": capacity,
            "created_at": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/doctor_slots",
            Some(auth_token),
            Some(slot_data),
            Some(headers),
        ).await.map_err(|e| e.to_string())?;

        let row = result.into_iter().next()
            .ok_or_else(|| "Failed to create slot".to_string())?;

        serde_json::from_value(row).map_err(|e| format!("Failed to parse created slot: {}", e))
    }

    /// Occupancy per start time for a center's date: pending/confirmed
    /// appointments plus cart items with a confirmed slot selection.
    async fn booked_counts_for_center(
        &self,
        center_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<HashMap<NaiveTime, i32>, AvailabilityError> {
        let mut counts: HashMap<NaiveTime, i32> = HashMap::new();

        let appointments_path = format!(
            "/rest/v1/appointments?center_id=eq.{}&scheduled_date=eq.{}&status=in.(pending,confirmed)&select=scheduled_time",
            center_id, date
        );
        self.accumulate_times(&appointments_path, "scheduled_time", &mut counts, auth_token).await?;

        let cart_path = format!(
            "/rest/v1/cart_items?center_id=eq.{}&selected_date=eq.{}&slot_confirmed=eq.true&select=selected_time",
            center_id, date
        );
        self.accumulate_times(&cart_path, "selected_time", &mut counts, auth_token).await?;

        Ok(counts)
    }

    async fn booked_counts_for_doctor(
        &self,
        doctor_id: Uuid,
        mode: ConsultationMode,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<HashMap<NaiveTime, i32>, AvailabilityError> {
        let mut counts: HashMap<NaiveTime, i32> = HashMap::new();

        let appointments_path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&mode=eq.{}&scheduled_date=eq.{}&status=in.(pending,confirmed)&select=scheduled_time",
            doctor_id, mode, date
        );
        self.accumulate_times(&appointments_path, "scheduled_time", &mut counts, auth_token).await?;

        Ok(counts)
    }

    async fn accumulate_times(
        &self,
        path: &str,
        field: &str,
        counts: &mut HashMap<NaiveTime, i32>,
        auth_token: &str,
    ) -> Result<(), AvailabilityError> {
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            path,
            Some(auth_token),
            None,
        ).await.map_err(|e| AvailabilityError::DatabaseError(e.to_string()))?;

        for row in rows {
            let Some(raw) = row.get(field).and_then(|v| v.as_str()) else {
                continue;
            };
            match NaiveTime::parse_from_str(raw, "%H:%M:%S") {
                Ok(time) => *counts.entry(time).or_insert(0) += 1,
                Err(_) => warn!("Unparseable {} value in booked-count query: {}", field, raw),
            }
        }

        Ok(())
    }
}
