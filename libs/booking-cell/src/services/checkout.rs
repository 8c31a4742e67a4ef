// libs/booking-cell/src/services/checkout.rs
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;
use availability_cell::models::SlotResource;
use availability_cell::services::availability::AvailabilityService;
use availability_cell::services::reservation::SlotReservationService;
use availability_cell::services::slots::is_past_slot;
use cart_cell::models::{CartItem, CartItemPayload};
use cart_cell::services::cart::CartService;
use catalog_cell::services::catalog::CatalogService;

use crate::models::{
    Appointment, AppointmentItem, AppointmentStatus, BookingError, CancelRequest,
    CheckoutResult, CheckoutSummary, ConfirmCheckoutRequest, RescheduleRequest,
    TypeBreakdown,
};
use crate::services::lifecycle::{check_reschedulable, check_transition};

pub struct BookingService {
    supabase: Arc<SupabaseClient>,
    cart: CartService,
    catalog: CatalogService,
    availability: AvailabilityService,
    reservation: SlotReservationService,
}

impl BookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_client(Arc::new(SupabaseClient::new(config)))
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self {
            cart: CartService::with_client(Arc::clone(&supabase)),
            catalog: CatalogService::with_client(Arc::clone(&supabase)),
            availability: AvailabilityService::with_client(Arc::clone(&supabase)),
            reservation: SlotReservationService::new(Arc::clone(&supabase)),
            supabase,
        }
    }

    /// What confirm would charge, from the repriced cart. Read-only.
    pub async fn preview(&self, user: &User, auth_token: &str) -> Result<CheckoutSummary, BookingError> {
        let cart = self.cart.get_cart(user, auth_token).await?;
        if cart.items.is_empty() {
            return Err(BookingError::EmptyCart);
        }

        let mut by_type: BTreeMap<&'static str, (usize, f64)> = BTreeMap::new();
        for item in &cart.items {
            let entry = by_type.entry(item.payload.item_type()).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += item.final_price;
        }

        Ok(CheckoutSummary {
            breakdown: by_type
                .into_iter()
                .map(|(item_type, (count, subtotal))| TypeBreakdown {
                    item_type: item_type.to_string(),
                    count,
                    subtotal,
                })
                .collect(),
            total_amount: cart.total_amount,
            total_discount: cart.total_discount,
            final_payable: cart.final_payable,
            items: cart.items,
        })
    }

    /// Converts the whole cart into appointments, or nothing. Two phases:
    /// every slot key is claimed through the capacity guard first, then the
    /// appointment rows are written and the cart emptied. Any failure after
    /// the first claim releases what was claimed and deletes what was
    /// written, so a full slot never costs the user a partial booking.
    pub async fn confirm(
        &self,
        user: &User,
        payment: ConfirmCheckoutRequest,
        auth_token: &str,
    ) -> Result<CheckoutResult, BookingError> {
        let user_id = parse_user_id(user)?;

        if payment.payment_mode.trim().is_empty() {
            return Err(BookingError::ValidationError(
                "payment_mode is required".to_string(),
            ));
        }
        let cart = self.cart.get_cart(user, auth_token).await?;
        if cart.items.is_empty() {
            return Err(BookingError::EmptyCart);
        }

        // Every item must be slot-bound before any claim is attempted.
        for item in &cart.items {
            match &item.payload {
                CartItemPayload::DoctorAppointment { .. } => {}
                _ => {
                    if !item.slot_confirmed || item.slot_binding().is_none() {
                        return Err(BookingError::ValidationError(format!(
                            "Cart item {} has no confirmed slot selection",
                            item.id
                        )));
                    }
                }
            }
        }

        // Phase 1: claim capacity for every item.
        let mut claimed: Vec<(SlotResource, NaiveDate, NaiveTime)> = Vec::new();
        for item in &cart.items {
            let (resource, date, time) = item
                .slot_binding()
                .ok_or_else(|| BookingError::ValidationError(format!(
                    "Cart item {} has no slot to book",
                    item.id
                )))?;

            let capacity = self.availability
                .declared_capacity(&resource, date, time, auth_token)
                .await?;

            match self.reservation.reserve(&resource, date, time, capacity, auth_token).await {
                Ok(()) => claimed.push((resource, date, time)),
                Err(e) => {
                    warn!("Checkout reservation failed for item {}: {}", item.id, e);
                    self.release_all(&claimed, auth_token).await;
                    return Err(e.into());
                }
            }
        }

        // Phase 2: write the appointment rows.
        let mut appointments: Vec<Appointment> = Vec::new();
        for item in &cart.items {
            match self.create_appointment(user_id, item, &payment, auth_token).await {
                Ok(appointment) => appointments.push(appointment),
                Err(e) => {
                    error!("Checkout failed writing appointment for item {}: {}", item.id, e);
                    self.delete_appointments(&appointments, auth_token).await;
                    self.release_all(&claimed, auth_token).await;
                    return Err(e);
                }
            }
        }

        let total_paid: f64 = cart.items.iter().map(|i| i.final_price).sum();

        if let Err(e) = self.cart.clear_cart(user, auth_token).await {
            // Appointments exist; a stale cart is recoverable, a lost
            // booking is not.
            warn!("Checkout succeeded but cart clear failed for user {}: {}", user_id, e);
        }

        info!("Checkout complete for user {}: {} appointments", user_id, appointments.len());
        Ok(CheckoutResult { appointments, total_paid })
    }

    pub async fn list_appointments(
        &self,
        user: &User,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, BookingError> {
        let user_id = parse_user_id(user)?;
        let path = format!(
            "/rest/v1/appointments?user_id=eq.{}&order=scheduled_at.desc",
            user_id
        );
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse appointments: {}", e)))
    }

    /// Appointment detail with its catalog lines (tests or package).
    pub async fn get_appointment(
        &self,
        user: &User,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<(Appointment, Vec<AppointmentItem>), BookingError> {
        let user_id = parse_user_id(user)?;
        let appointment = self.fetch_appointment(user_id, appointment_id, auth_token).await?;

        let path = format!("/rest/v1/appointment_items?appointment_id=eq.{}", appointment_id);
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let items = rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<AppointmentItem>, _>>()
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse appointment items: {}", e)))?;

        Ok((appointment, items))
    }

    /// Moves an appointment to a new slot. The new slot is claimed before
    /// the old one is released, so the move cannot lose the appointment its
    /// place. Rescheduling onto the appointment's own slot is a no-op.
    pub async fn reschedule(
        &self,
        user: &User,
        appointment_id: Uuid,
        request: RescheduleRequest,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let user_id = parse_user_id(user)?;
        let appointment = self.fetch_appointment(user_id, appointment_id, auth_token).await?;

        check_reschedulable(appointment.status)?;

        if appointment.scheduled_date == request.date && appointment.scheduled_time == request.time {
            debug!("Reschedule of {} onto its own slot; nothing to do", appointment_id);
            return Ok(appointment);
        }

        let resource = resource_for(&appointment)?;
        let timezone = self.resource_timezone(&appointment, auth_token).await?;

        if is_past_slot(request.date, request.time, &timezone, Utc::now()) {
            return Err(BookingError::ValidationError(
                "Cannot reschedule into the past".to_string(),
            ));
        }

        let capacity = self.availability
            .declared_capacity(&resource, request.date, request.time, auth_token)
            .await?;
        self.reservation
            .reserve(&resource, request.date, request.time, capacity, auth_token)
            .await?;

        let scheduled_at = to_utc(request.date, request.time, &timezone);
        let body = json!({
            "scheduled_date": request.date,
            "scheduled_time": request.time.format("%H:%M:%S").to_string(),
            "scheduled_at": scheduled_at.to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339(),
        });
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&user_id=eq.{}",
            appointment_id, user_id
        );
        let patched: Result<Vec<Value>, _> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(body),
            Some(representation_header()),
        ).await;

        let updated = match patched {
            Ok(rows) => rows.into_iter().next()
                .ok_or_else(|| BookingError::NotFound("Appointment".to_string())),
            Err(e) => Err(BookingError::DatabaseError(e.to_string())),
        };

        let updated = match updated {
            Ok(row) => row,
            Err(e) => {
                // The appointment still holds its old slot; give the new
                // claim back.
                if let Err(release_err) = self.reservation
                    .release(&resource, request.date, request.time, auth_token)
                    .await
                {
                    error!("Failed to release slot after aborted reschedule: {}", release_err);
                }
                return Err(e);
            }
        };

        if let Err(e) = self.reservation
            .release(&resource, appointment.scheduled_date, appointment.scheduled_time, auth_token)
            .await
        {
            warn!("Reschedule of {} left the old slot claimed: {}", appointment_id, e);
        }

        info!("Rescheduled appointment {} to {} {}", appointment_id, request.date, request.time);
        serde_json::from_value(updated)
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }

    /// Cancels an appointment and returns its slot claim. Release runs
    /// unconditionally; cancellation never checks capacity.
    pub async fn cancel(
        &self,
        user: &User,
        appointment_id: Uuid,
        request: CancelRequest,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let user_id = parse_user_id(user)?;
        let appointment = self.fetch_appointment(user_id, appointment_id, auth_token).await?;

        check_transition(appointment.status, AppointmentStatus::Cancelled)?;

        let mut body = Map::new();
        body.insert("status".to_string(), json!("cancelled"));
        body.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
        if let Some(reason) = request.reason {
            body.insert("cancellation_reason".to_string(), json!(reason));
        }

        let path = format!(
            "/rest/v1/appointments?id=eq.{}&user_id=eq.{}",
            appointment_id, user_id
        );
        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(Value::Object(body)),
            Some(representation_header()),
        ).await.map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let row = rows.into_iter().next()
            .ok_or_else(|| BookingError::NotFound("Appointment".to_string()))?;
        let cancelled: Appointment = serde_json::from_value(row)
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse appointment: {}", e)))?;

        let resource = resource_for(&appointment)?;
        if let Err(e) = self.reservation
            .release(&resource, appointment.scheduled_date, appointment.scheduled_time, auth_token)
            .await
        {
            warn!("Cancelled appointment {} but slot release failed: {}", appointment_id, e);
        }

        info!("Cancelled appointment {}", appointment_id);
        Ok(cancelled)
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    async fn fetch_appointment(
        &self,
        user_id: Uuid,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&user_id=eq.{}",
            appointment_id, user_id
        );
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let row = rows.into_iter().next()
            .ok_or_else(|| BookingError::NotFound("Appointment".to_string()))?;
        serde_json::from_value(row)
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }

    async fn resource_timezone(
        &self,
        appointment: &Appointment,
        auth_token: &str,
    ) -> Result<String, BookingError> {
        if let Some(center_id) = appointment.center_id {
            return Ok(self.catalog.get_diagnostic_center(center_id, auth_token)
                .await
                .map_err(|e| BookingError::DatabaseError(e.to_string()))?
                .timezone);
        }
        if let Some(doctor_id) = appointment.doctor_id {
            return Ok(self.catalog.get_doctor(doctor_id, auth_token)
                .await
                .map_err(|e| BookingError::DatabaseError(e.to_string()))?
                .timezone);
        }
        Err(BookingError::ValidationError(
            "Appointment has no bookable resource".to_string(),
        ))
    }

    async fn create_appointment(
        &self,
        user_id: Uuid,
        item: &CartItem,
        payment: &ConfirmCheckoutRequest,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let (date, time) = item.scheduled_for().ok_or_else(|| {
            BookingError::ValidationError(format!("Cart item {} has no schedule", item.id))
        })?;

        // A captured payment confirms the booking right away; pay-at-visit
        // bookings stay pending until payment is collected.
        let status = if payment.transaction_id.is_some() {
            AppointmentStatus::Confirmed
        } else {
            AppointmentStatus::Pending
        };

        let mut body = Map::new();
        body.insert("user_id".to_string(), json!(user_id));
        body.insert("appointment_type".to_string(), json!(item.payload.item_type()));
        body.insert("for_whom".to_string(), serde_json::to_value(item.for_whom)
            .map_err(|e| BookingError::DatabaseError(e.to_string()))?);
        body.insert("dependant_id".to_string(), json!(item.dependant_id));
        body.insert("patient_name".to_string(), json!(item.patient_name));
        body.insert("price".to_string(), json!(item.price));
        body.insert("discount_amount".to_string(), json!(item.discount_amount));
        body.insert("final_price".to_string(), json!(item.final_price));
        body.insert("payment_mode".to_string(), json!(payment.payment_mode));
        body.insert("transaction_id".to_string(), json!(payment.transaction_id));
        body.insert("status".to_string(), json!(status.to_string()));
        body.insert("notes".to_string(), json!(item.notes));
        body.insert("scheduled_date".to_string(), json!(date));
        body.insert("scheduled_time".to_string(), json!(time.format("%H:%M:%S").to_string()));
        body.insert("created_at".to_string(), json!(Utc::now().to_rfc3339()));
        body.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let timezone = match &item.payload {
            CartItemPayload::Test { center_id, visit_type, address, .. } => {
                body.insert("center_id".to_string(), json!(center_id));
                body.insert("visit_type".to_string(), serde_json::to_value(visit_type)
                    .map_err(|e| BookingError::DatabaseError(e.to_string()))?);
                body.insert("address".to_string(), json!(address));
                self.catalog.get_diagnostic_center(*center_id, auth_token).await
                    .map_err(|e| BookingError::DatabaseError(e.to_string()))?
                    .timezone
            }
            CartItemPayload::HealthPackage { center_id, .. }
            | CartItemPayload::SponsoredPackage { center_id, .. } => {
                body.insert("center_id".to_string(), json!(center_id));
                self.catalog.get_diagnostic_center(*center_id, auth_token).await
                    .map_err(|e| BookingError::DatabaseError(e.to_string()))?
                    .timezone
            }
            CartItemPayload::DoctorAppointment { doctor_id, specialization, mode, .. } => {
                body.insert("doctor_id".to_string(), json!(doctor_id));
                body.insert("specialization".to_string(), json!(specialization));
                body.insert("mode".to_string(), json!(mode.to_string()));
                self.catalog.get_doctor(*doctor_id, auth_token).await
                    .map_err(|e| BookingError::DatabaseError(e.to_string()))?
                    .timezone
            }
        };

        body.insert("scheduled_at".to_string(), json!(to_utc(date, time, &timezone).to_rfc3339()));

        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointments",
            Some(auth_token),
            Some(Value::Object(body)),
            Some(representation_header()),
        ).await.map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        let row = rows.into_iter().next()
            .ok_or_else(|| BookingError::DatabaseError("Failed to create appointment".to_string()))?;
        let appointment: Appointment = serde_json::from_value(row)
            .map_err(|e| BookingError::DatabaseError(format!("Failed to parse appointment: {}", e)))?;

        self.create_appointment_items(&appointment, item, auth_token).await?;

        Ok(appointment)
    }

    /// Catalog lines under a lab appointment: one row per test, or one row
    /// for the package. Doctor appointments carry no lines.
    async fn create_appointment_items(
        &self,
        appointment: &Appointment,
        item: &CartItem,
        auth_token: &str,
    ) -> Result<(), BookingError> {
        let snapshot = self.cart.snapshot_for(&item.payload, auth_token).await?;

        let lines: Vec<Value> = match &item.payload {
            CartItemPayload::Test { .. } => snapshot.tests.iter().map(|t| json!({
                "appointment_id": appointment.id,
                "test_id": t.id,
                "name": t.name,
                "price": t.price,
            })).collect(),
            CartItemPayload::HealthPackage { package_id, .. } => snapshot.package.iter().map(|p| json!({
                "appointment_id": appointment.id,
                "package_id": package_id,
                "name": p.name,
                "price": p.price,
            })).collect(),
            CartItemPayload::SponsoredPackage { package_id, .. } => snapshot.sponsored_package.iter().map(|p| json!({
                "appointment_id": appointment.id,
                "package_id": package_id,
                "name": p.name,
                "price": p.price,
            })).collect(),
            CartItemPayload::DoctorAppointment { .. } => vec![],
        };

        if lines.is_empty() {
            return Ok(());
        }

        let _: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/appointment_items",
            Some(auth_token),
            Some(Value::Array(lines)),
            Some(representation_header()),
        ).await.map_err(|e| BookingError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn release_all(
        &self,
        claimed: &[(SlotResource, NaiveDate, NaiveTime)],
        auth_token: &str,
    ) {
        for (resource, date, time) in claimed {
            if let Err(e) = self.reservation.release(resource, *date, *time, auth_token).await {
                error!("Checkout rollback failed to release {}/{} {} {}: {}",
                       resource.kind(), resource.id(), date, time, e);
            }
        }
    }

    async fn delete_appointments(&self, appointments: &[Appointment], auth_token: &str) {
        if appointments.is_empty() {
            return;
        }

        let ids = appointments.iter()
            .map(|a| a.id.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let items_path = format!("/rest/v1/appointment_items?appointment_id=in.({})", ids);
        if let Err(e) = self.supabase
            .request_with_headers::<Vec<Value>>(
                Method::DELETE, &items_path, Some(auth_token), None, Some(representation_header()),
            )
            .await
        {
            error!("Checkout rollback failed to delete appointment items: {}", e);
        }

        let path = format!("/rest/v1/appointments?id=in.({})", ids);
        if let Err(e) = self.supabase
            .request_with_headers::<Vec<Value>>(
                Method::DELETE, &path, Some(auth_token), None, Some(representation_header()),
            )
            .await
        {
            error!("Checkout rollback failed to delete appointments: {}", e);
        }
    }
}

fn resource_for(appointment: &Appointment) -> Result<SlotResource, BookingError> {
    if let Some(center_id) = appointment.center_id {
        return Ok(SlotResource::Center(center_id));
    }
    if let (Some(doctor_id), Some(mode)) = (appointment.doctor_id, appointment.mode) {
        return Ok(SlotResource::Doctor { id: doctor_id, mode });
    }
    Err(BookingError::ValidationError(
        "Appointment has no bookable resource".to_string(),
    ))
}

fn to_utc(date: NaiveDate, time: NaiveTime, timezone: &str) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match timezone.parse::<Tz>() {
        Ok(tz) => match tz.from_local_datetime(&naive).earliest() {
            Some(local) => local.with_timezone(&Utc),
            None => Utc.from_utc_datetime(&naive),
        },
        Err(_) => Utc.from_utc_datetime(&naive),
    }
}

fn parse_user_id(user: &User) -> Result<Uuid, BookingError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| BookingError::ValidationError("Invalid user id".to_string()))
}

fn representation_header() -> reqwest::header::HeaderMap {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        "Prefer",
        reqwest::header::HeaderValue::from_static("return=representation"),
    );
    headers
}
