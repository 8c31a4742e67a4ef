// libs/cart-cell/src/services/cart.rs
use std::sync::Arc;

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;
use availability_cell::models::SlotResource;
use availability_cell::services::availability::AvailabilityService;
use availability_cell::services::slots::is_past_slot;
use catalog_cell::models::{CatalogError, CatalogSnapshot, DiagnosticCenter};
use catalog_cell::services::catalog::CatalogService;

use crate::models::{
    AddCartItemRequest, Cart, CartError, CartItem, CartItemPayload, CartView,
    ForWhom, PriceBreakdown, SelectSlotRequest, VisitType,
};
use crate::services::pricing::compute_price;

pub struct CartService {
    supabase: Arc<SupabaseClient>,
    catalog: CatalogService,
    availability: AvailabilityService,
}

impl CartService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_client(Arc::new(SupabaseClient::new(config)))
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        let catalog = CatalogService::with_client(Arc::clone(&supabase));
        let availability = AvailabilityService::with_client(Arc::clone(&supabase));
        Self { supabase, catalog, availability }
    }

    /// Validates the item against the catalog, prices it, and persists it.
    /// Doctor items go through mode derivation and the duplicate guard first.
    pub async fn add_item(
        &self,
        user: &User,
        request: AddCartItemRequest,
        auth_token: &str,
    ) -> Result<CartItem, CartError> {
        let user_id = parse_user_id(user)?;

        let patient_name = match request.for_whom {
            ForWhom::SelfBooking => user.display_name(),
            ForWhom::Dependant => {
                let dependant_id = request.dependant_id.ok_or_else(|| {
                    CartError::ValidationError(
                        "dependant_id is required when booking for a dependant".to_string(),
                    )
                })?;
                self.catalog.get_dependant(dependant_id, user_id, auth_token).await?.name
            }
        };

        let (payload, snapshot) = self
            .validate_payload(request.item, auth_token)
            .await?;

        if let CartItemPayload::DoctorAppointment {
            doctor_id, appointment_date, appointment_time, ..
        } = &payload
        {
            self.enforce_doctor_duplicate_guard(
                user_id,
                *doctor_id,
                *appointment_date,
                *appointment_time,
                request.override_conflict.unwrap_or(false),
                auth_token,
            ).await?;
        }

        let cart = self.get_or_create_cart(user_id, auth_token).await?;
        let breakdown = compute_price(&payload, &snapshot);

        let item = self.insert_item(
            &cart,
            user_id,
            request.for_whom,
            request.dependant_id,
            &patient_name,
            payload,
            breakdown,
            request.notes,
            auth_token,
        ).await?;

        info!("Added {} item {} to cart {}", item.payload.item_type(), item.id, cart.id);
        Ok(item)
    }

    /// The user's cart with fresh pricing. Each item is repriced against the
    /// current catalog; rows whose stored triple drifted are patched so the
    /// read stays idempotent.
    pub async fn get_cart(&self, user: &User, auth_token: &str) -> Result<CartView, CartError> {
        let user_id = parse_user_id(user)?;

        let Some(cart) = self.find_cart(user_id, auth_token).await? else {
            return Ok(CartView {
                cart_id: None,
                items: vec![],
                total_amount: 0.0,
                total_discount: 0.0,
                final_payable: 0.0,
            });
        };

        let mut items = self.fetch_items(cart.id, auth_token).await?;

        for item in &mut items {
            let snapshot = self.snapshot_for(&item.payload, auth_token).await?;
            let fresh = compute_price(&item.payload, &snapshot);
            if fresh.price != item.price
                || fresh.discount_amount != item.discount_amount
                || fresh.final_price != item.final_price
            {
                debug!("Repricing cart item {}: {} -> {}", item.id, item.final_price, fresh.final_price);
                self.persist_pricing(item.id, fresh, auth_token).await?;
                item.price = fresh.price;
                item.discount_amount = fresh.discount_amount;
                item.final_price = fresh.final_price;
            }
        }

        let total_amount: f64 = items.iter().map(|i| i.price).sum();
        let total_discount: f64 = items.iter().map(|i| i.discount_amount).sum();
        let final_payable: f64 = items.iter().map(|i| i.final_price).sum();

        Ok(CartView {
            cart_id: Some(cart.id),
            items,
            total_amount,
            total_discount,
            final_payable,
        })
    }

    pub async fn remove_item(
        &self,
        user: &User,
        item_id: Uuid,
        auth_token: &str,
    ) -> Result<(), CartError> {
        let user_id = parse_user_id(user)?;

        let path = format!("/rest/v1/cart_items?id=eq.{}&user_id=eq.{}", item_id, user_id);
        let deleted: Vec<Value> = self.supabase.request_with_headers(
            Method::DELETE,
            &path,
            Some(auth_token),
            None,
            Some(representation_header()),
        ).await.map_err(|e| CartError::DatabaseError(e.to_string()))?;

        if deleted.is_empty() {
            return Err(CartError::NotFound("Cart item".to_string()));
        }

        info!("Removed cart item {} for user {}", item_id, user_id);
        Ok(())
    }

    /// Empties the cart. The cart row itself survives; idempotent.
    pub async fn clear_cart(&self, user: &User, auth_token: &str) -> Result<usize, CartError> {
        let user_id = parse_user_id(user)?;

        let path = format!("/rest/v1/cart_items?user_id=eq.{}", user_id);
        let deleted: Vec<Value> = self.supabase.request_with_headers(
            Method::DELETE,
            &path,
            Some(auth_token),
            None,
            Some(representation_header()),
        ).await.map_err(|e| CartError::DatabaseError(e.to_string()))?;

        info!("Cleared {} cart items for user {}", deleted.len(), user_id);
        Ok(deleted.len())
    }

    /// Stages a slot choice on a lab-type item. Doctor items carry their slot
    /// in the payload and are rejected here. The selection counts against the
    /// center's live occupancy; the hard capacity guard still runs at checkout.
    pub async fn select_slot(
        &self,
        user: &User,
        item_id: Uuid,
        request: SelectSlotRequest,
        auth_token: &str,
    ) -> Result<CartItem, CartError> {
        let user_id = parse_user_id(user)?;
        let item = self.fetch_item(user_id, item_id, auth_token).await?;

        let Some(center_id) = item.payload.center_id() else {
            return Err(CartError::ValidationError(
                "Doctor appointments carry their slot in the item itself".to_string(),
            ));
        };

        // Re-selecting the slot the item already holds must always succeed;
        // the item's own confirmed selection is part of the booked count.
        if item.slot_confirmed
            && item.selected_date == Some(request.date)
            && item.selected_time == Some(request.time)
        {
            debug!("Item {} already holds slot {} {}; nothing to do", item_id, request.date, request.time);
            return Ok(item);
        }

        let center = self.catalog.get_diagnostic_center(center_id, auth_token).await?;
        if is_past_slot(request.date, request.time, &center.timezone, Utc::now()) {
            return Err(CartError::ValidationError(
                "Cannot select a slot in the past".to_string(),
            ));
        }

        let resource = SlotResource::Center(center_id);
        let capacity = self.availability
            .declared_capacity(&resource, request.date, request.time, auth_token)
            .await?;
        let booked = self.availability
            .count_booked(&resource, request.date, request.time, auth_token)
            .await?;
        if booked >= capacity {
            return Err(CartError::SlotFull);
        }

        let body = json!({
            "selected_date": request.date,
            "selected_time": request.time.format("%H:%M:%S").to_string(),
            "slot_confirmed": true,
            "updated_at": Utc::now().to_rfc3339(),
        });
        let path = format!("/rest/v1/cart_items?id=eq.{}&user_id=eq.{}", item_id, user_id);
        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(body),
            Some(representation_header()),
        ).await.map_err(|e| CartError::DatabaseError(e.to_string()))?;

        let row = rows.into_iter().next()
            .ok_or_else(|| CartError::NotFound("Cart item".to_string()))?;
        serde_json::from_value(row)
            .map_err(|e| CartError::DatabaseError(format!("Failed to parse cart item: {}", e)))
    }

    /// Items for checkout, in insertion order. No repricing; the preview and
    /// confirm paths call `get_cart` first when they want fresh prices.
    pub async fn items_for_user(
        &self,
        user_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<CartItem>, CartError> {
        let path = format!(
            "/rest/v1/cart_items?user_id=eq.{}&order=created_at.asc",
            user_id
        );
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| CartError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<CartItem>, _>>()
            .map_err(|e| CartError::DatabaseError(format!("Failed to parse cart items: {}", e)))
    }

    /// Fresh catalog snapshot for repricing. Vanished references resolve to
    /// None so the item prices down instead of erroring the whole cart.
    pub async fn snapshot_for(
        &self,
        payload: &CartItemPayload,
        auth_token: &str,
    ) -> Result<CatalogSnapshot, CartError> {
        let mut snapshot = CatalogSnapshot::default();

        match payload {
            CartItemPayload::Test { center_id, test_ids, .. } => {
                snapshot.tests = self.catalog.get_tests(test_ids, auth_token).await?;
                snapshot.center = self.optional_center(*center_id, auth_token).await?;
            }
            CartItemPayload::HealthPackage { package_id, center_id } => {
                snapshot.package = match self.catalog.get_health_package(*package_id, auth_token).await {
                    Ok(p) => Some(p),
                    Err(CatalogError::NotFound(_)) => None,
                    Err(e) => return Err(e.into()),
                };
                snapshot.center = self.optional_center(*center_id, auth_token).await?;
            }
            CartItemPayload::SponsoredPackage { package_id, center_id } => {
                snapshot.sponsored_package = match self.catalog.get_sponsored_package(*package_id, auth_token).await {
                    Ok(p) => Some(p),
                    Err(CatalogError::NotFound(_)) => None,
                    Err(e) => return Err(e.into()),
                };
                snapshot.center = self.optional_center(*center_id, auth_token).await?;
            }
            CartItemPayload::DoctorAppointment { doctor_id, .. } => {
                snapshot.doctor = match self.catalog.get_doctor(*doctor_id, auth_token).await {
                    Ok(d) => Some(d),
                    Err(CatalogError::NotFound(_)) => None,
                    Err(e) => return Err(e.into()),
                };
            }
        }

        Ok(snapshot)
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    /// A center that vanished from the catalog is not an error on the read
    /// path; the item just loses its center discount.
    async fn optional_center(
        &self,
        center_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<DiagnosticCenter>, CartError> {
        match self.catalog.get_diagnostic_center(center_id, auth_token).await {
            Ok(center) => Ok(Some(center)),
            Err(CatalogError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Validation is strict on add: every referenced catalog entity must
    /// exist. Doctor items come back normalized (derived mode and
    /// specialization taken from the doctor record).
    async fn validate_payload(
        &self,
        payload: CartItemPayload,
        auth_token: &str,
    ) -> Result<(CartItemPayload, CatalogSnapshot), CartError> {
        let mut snapshot = CatalogSnapshot::default();

        let payload = match payload {
            CartItemPayload::Test { center_id, visit_type, test_ids, address } => {
                if test_ids.is_empty() {
                    return Err(CartError::ValidationError(
                        "At least one test is required".to_string(),
                    ));
                }

                let center = self.catalog.get_diagnostic_center(center_id, auth_token).await?;

                if visit_type == VisitType::Home {
                    if address.as_deref().map(str::trim).unwrap_or("").is_empty() {
                        return Err(CartError::ValidationError(
                            "Address is required for home collection".to_string(),
                        ));
                    }
                    if !center.home_collection_available {
                        return Err(CartError::ValidationError(
                            "This center does not offer home collection".to_string(),
                        ));
                    }
                }

                let tests = self.catalog.get_tests(&test_ids, auth_token).await?;
                if tests.len() != test_ids.len() {
                    return Err(CartError::NotFound("Lab test".to_string()));
                }

                snapshot.tests = tests;
                snapshot.center = Some(center);
                CartItemPayload::Test { center_id, visit_type, test_ids, address }
            }
            CartItemPayload::HealthPackage { package_id, center_id } => {
                snapshot.package = Some(self.catalog.get_health_package(package_id, auth_token).await?);
                snapshot.center = Some(self.catalog.get_diagnostic_center(center_id, auth_token).await?);
                CartItemPayload::HealthPackage { package_id, center_id }
            }
            CartItemPayload::SponsoredPackage { package_id, center_id } => {
                snapshot.sponsored_package = Some(self.catalog.get_sponsored_package(package_id, auth_token).await?);
                snapshot.center = Some(self.catalog.get_diagnostic_center(center_id, auth_token).await?);
                CartItemPayload::SponsoredPackage { package_id, center_id }
            }
            CartItemPayload::DoctorAppointment {
                doctor_id, appointment_date, appointment_time, mode, ..
            } => {
                let doctor = self.catalog.get_doctor(doctor_id, auth_token).await?;

                // In-clinic wins whenever the doctor offers it; tele is only
                // bookable when it is the doctor's sole mode.
                let derived_mode = if doctor.supports_in_clinic {
                    availability_cell::models::ConsultationMode::InClinic
                } else if doctor.supports_tele {
                    if mode != availability_cell::models::ConsultationMode::Tele {
                        return Err(CartError::ValidationError(
                            "This doctor only offers tele consultations; pass mode=tele".to_string(),
                        ));
                    }
                    availability_cell::models::ConsultationMode::Tele
                } else {
                    return Err(CartError::ValidationError(
                        "Doctor has no bookable consultation mode".to_string(),
                    ));
                };

                if is_past_slot(appointment_date, appointment_time, &doctor.timezone, Utc::now()) {
                    return Err(CartError::ValidationError(
                        "Appointment slot is in the past".to_string(),
                    ));
                }

                let specialization = doctor.specialization.clone();
                snapshot.doctor = Some(doctor);
                CartItemPayload::DoctorAppointment {
                    doctor_id,
                    specialization,
                    appointment_date,
                    appointment_time,
                    mode: derived_mode,
                }
            }
        };

        Ok((payload, snapshot))
    }

    /// A user may hold at most one cart item for the same doctor, date and
    /// time. With the override flag the old item is replaced instead.
    async fn enforce_doctor_duplicate_guard(
        &self,
        user_id: Uuid,
        doctor_id: Uuid,
        date: chrono::NaiveDate,
        time: chrono::NaiveTime,
        override_conflict: bool,
        auth_token: &str,
    ) -> Result<(), CartError> {
        let path = format!(
            "/rest/v1/cart_items?user_id=eq.{}&doctor_id=eq.{}&appointment_date=eq.{}&appointment_time=eq.{}",
            user_id, doctor_id, date, time.format("%H:%M:%S")
        );
        let existing: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| CartError::DatabaseError(e.to_string()))?;

        if existing.is_empty() {
            return Ok(());
        }

        if !override_conflict {
            return Err(CartError::Conflict(
                "An appointment with this doctor at this time is already in your cart; set override_conflict to replace it".to_string(),
            ));
        }

        warn!("Replacing duplicate doctor appointment in cart for user {}", user_id);
        let _: Vec<Value> = self.supabase.request_with_headers(
            Method::DELETE,
            &path,
            Some(auth_token),
            None,
            Some(representation_header()),
        ).await.map_err(|e| CartError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn find_cart(
        &self,
        user_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<Cart>, CartError> {
        let path = format!("/rest/v1/carts?user_id=eq.{}", user_id);
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| CartError::DatabaseError(e.to_string()))?;

        rows.into_iter().next()
            .map(|row| serde_json::from_value(row)
                .map_err(|e| CartError::DatabaseError(format!("Failed to parse cart: {}", e))))
            .transpose()
    }

    async fn get_or_create_cart(
        &self,
        user_id: Uuid,
        auth_token: &str,
    ) -> Result<Cart, CartError> {
        if let Some(cart) = self.find_cart(user_id, auth_token).await? {
            return Ok(cart);
        }

        let body = json!({
            "user_id": user_id,
            "created_at": Utc::now().to_rfc3339(),
        });
        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/carts",
            Some(auth_token),
            Some(body),
            Some(representation_header()),
        ).await.map_err(|e| CartError::DatabaseError(e.to_string()))?;

        let row = rows.into_iter().next()
            .ok_or_else(|| CartError::DatabaseError("Failed to create cart".to_string()))?;
        serde_json::from_value(row)
            .map_err(|e| CartError::DatabaseError(format!("Failed to parse cart: {}", e)))
    }

    async fn fetch_items(
        &self,
        cart_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<CartItem>, CartError> {
        let path = format!(
            "/rest/v1/cart_items?cart_id=eq.{}&order=created_at.asc",
            cart_id
        );
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| CartError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<CartItem>, _>>()
            .map_err(|e| CartError::DatabaseError(format!("Failed to parse cart items: {}", e)))
    }

    async fn fetch_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        auth_token: &str,
    ) -> Result<CartItem, CartError> {
        let path = format!("/rest/v1/cart_items?id=eq.{}&user_id=eq.{}", item_id, user_id);
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await.map_err(|e| CartError::DatabaseError(e.to_string()))?;

        let row = rows.into_iter().next()
            .ok_or_else(|| CartError::NotFound("Cart item".to_string()))?;
        serde_json::from_value(row)
            .map_err(|e| CartError::DatabaseError(format!("Failed to parse cart item: {}", e)))
    }

    async fn persist_pricing(
        &self,
        item_id: Uuid,
        breakdown: PriceBreakdown,
        auth_token: &str,
    ) -> Result<(), CartError> {
        let body = json!({
            "price": breakdown.price,
            "discount_amount": breakdown.discount_amount,
            "final_price": breakdown.final_price,
            "updated_at": Utc::now().to_rfc3339(),
        });
        let path = format!("/rest/v1/cart_items?id=eq.{}", item_id);
        let _: Vec<Value> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(body),
            Some(representation_header()),
        ).await.map_err(|e| CartError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_item(
        &self,
        cart: &Cart,
        user_id: Uuid,
        for_whom: ForWhom,
        dependant_id: Option<Uuid>,
        patient_name: &str,
        payload: CartItemPayload,
        breakdown: PriceBreakdown,
        notes: Option<String>,
        auth_token: &str,
    ) -> Result<CartItem, CartError> {
        // Envelope columns plus the flattened payload fields; the serde tag
        // lands as the item_type column.
        let mut body = Map::new();
        body.insert("cart_id".to_string(), json!(cart.id));
        body.insert("user_id".to_string(), json!(user_id));
        body.insert("for_whom".to_string(), serde_json::to_value(for_whom)
            .map_err(|e| CartError::DatabaseError(e.to_string()))?);
        body.insert("dependant_id".to_string(), json!(dependant_id));
        body.insert("patient_name".to_string(), json!(patient_name));
        body.insert("price".to_string(), json!(breakdown.price));
        body.insert("discount_amount".to_string(), json!(breakdown.discount_amount));
        body.insert("final_price".to_string(), json!(breakdown.final_price));
        body.insert("slot_confirmed".to_string(), json!(false));
        body.insert("notes".to_string(), json!(notes));
        body.insert("created_at".to_string(), json!(Utc::now().to_rfc3339()));
        body.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let payload_value = serde_json::to_value(&payload)
            .map_err(|e| CartError::DatabaseError(e.to_string()))?;
        if let Value::Object(fields) = payload_value {
            body.extend(fields);
        }

        let rows: Vec<Value> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/cart_items",
            Some(auth_token),
            Some(Value::Object(body)),
            Some(representation_header()),
        ).await.map_err(|e| CartError::DatabaseError(e.to_string()))?;

        let row = rows.into_iter().next()
            .ok_or_else(|| CartError::DatabaseError("Failed to create cart item".to_string()))?;
        serde_json::from_value(row)
            .map_err(|e| CartError::DatabaseError(format!("Failed to parse cart item: {}", e)))
    }
}

fn parse_user_id(user: &User) -> Result<Uuid, CartError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| CartError::ValidationError("Invalid user id".to_string()))
}

fn representation_header() -> reqwest::header::HeaderMap {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        "Prefer",
        reqwest::header::HeaderValue::from_static("return=representation"),
    );
    headers
}
