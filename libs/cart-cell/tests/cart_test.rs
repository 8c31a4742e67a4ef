use chrono::{NaiveDate, NaiveTime};
use serde_json::json;
use uuid::Uuid;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{method, path};

use assert_matches::assert_matches;
use shared_utils::test_utils::{TestConfig, TestUser};
use availability_cell::models::ConsultationMode;
use cart_cell::models::{AddCartItemRequest, CartError, CartItemPayload, ForWhom, SelectSlotRequest, VisitType};
use cart_cell::services::cart::CartService;

fn center_json(center_id: Uuid, home_collection: bool) -> serde_json::Value {
    json!({
        "id": center_id,
        "name": "City Diagnostics",
        "city": "Mumbai",
        "timezone": "Asia/Kolkata",
        "work_start": "09:00:00",
        "work_end": "11:00:00",
        "slot_interval_minutes": 30,
        "slot_capacity": 2,
        "discount_percent": 0.0,
        "home_collection_available": home_collection
    })
}

fn lab_test_json(test_id: Uuid, price: f64) -> serde_json::Value {
    json!({
        "id": test_id,
        "name": "CBC",
        "code": "CBC01",
        "price": price,
        "is_active": true
    })
}

fn doctor_json(doctor_id: Uuid, in_clinic: bool, tele: bool) -> serde_json::Value {
    json!({
        "id": doctor_id,
        "name": "Dr. Rao",
        "specialization": "Cardiology",
        "consultation_fee": 800.0,
        "supports_in_clinic": in_clinic,
        "supports_tele": tele,
        "timezone": "Asia/Kolkata",
        "is_active": true
    })
}

fn cart_item_row(
    user_id: &str,
    cart_id: Uuid,
    center_id: Uuid,
    test_id: Uuid,
    price: f64,
) -> serde_json::Value {
    json!({
        "id": Uuid::new_v4(),
        "cart_id": cart_id,
        "user_id": user_id,
        "for_whom": "self",
        "dependant_id": null,
        "patient_name": "Test User",
        "item_type": "test",
        "center_id": center_id,
        "visit_type": "center",
        "test_ids": [test_id],
        "address": null,
        "price": price,
        "discount_amount": 0.0,
        "final_price": price,
        "selected_date": null,
        "selected_time": null,
        "slot_confirmed": false,
        "notes": null,
        "created_at": "2030-01-01T00:00:00Z",
        "updated_at": "2030-01-01T00:00:00Z"
    })
}

#[tokio::test]
async fn add_test_item_prices_and_persists() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let user = TestUser::default();
    let center_id = Uuid::new_v4();
    let test_id = Uuid::new_v4();
    let cart_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/diagnostic_centers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![center_json(center_id, true)]))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/lab_tests"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![lab_test_json(test_id, 500.0)]))
        .mount(&mock_server)
        .await;

    // No cart yet; one is created lazily.
    Mock::given(method("GET"))
        .and(path("/rest/v1/carts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/carts"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![json!({
            "id": cart_id,
            "user_id": user.id,
            "created_at": "2030-01-01T00:00:00Z"
        })]))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/cart_items"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![
            cart_item_row(&user.id, cart_id, center_id, test_id, 500.0),
        ]))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = CartService::new(&config);
    let request = AddCartItemRequest {
        for_whom: ForWhom::SelfBooking,
        dependant_id: None,
        item: CartItemPayload::Test {
            center_id,
            visit_type: VisitType::Center,
            test_ids: vec![test_id],
            address: None,
        },
        notes: None,
        override_conflict: None,
    };

    let item = service.add_item(&user.to_user(), request, "test-token").await.unwrap();

    assert_eq!(item.price, 500.0);
    assert_eq!(item.final_price, 500.0);
    assert!(!item.slot_confirmed);
}

#[tokio::test]
async fn home_collection_requires_an_address() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let user = TestUser::default();
    let center_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/diagnostic_centers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![center_json(center_id, true)]))
        .mount(&mock_server)
        .await;

    let service = CartService::new(&config);
    let request = AddCartItemRequest {
        for_whom: ForWhom::SelfBooking,
        dependant_id: None,
        item: CartItemPayload::Test {
            center_id,
            visit_type: VisitType::Home,
            test_ids: vec![Uuid::new_v4()],
            address: None,
        },
        notes: None,
        override_conflict: None,
    };

    let result = service.add_item(&user.to_user(), request, "test-token").await;

    assert_matches!(result, Err(CartError::ValidationError(_)));
}

#[tokio::test]
async fn home_collection_requires_center_support() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let user = TestUser::default();
    let center_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/diagnostic_centers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![center_json(center_id, false)]))
        .mount(&mock_server)
        .await;

    let service = CartService::new(&config);
    let request = AddCartItemRequest {
        for_whom: ForWhom::SelfBooking,
        dependant_id: None,
        item: CartItemPayload::Test {
            center_id,
            visit_type: VisitType::Home,
            test_ids: vec![Uuid::new_v4()],
            address: Some("12 Hill Road".to_string()),
        },
        notes: None,
        override_conflict: None,
    };

    let result = service.add_item(&user.to_user(), request, "test-token").await;

    assert_matches!(result, Err(CartError::ValidationError(_)));
}

#[tokio::test]
async fn tele_only_doctor_rejects_implicit_in_clinic() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let user = TestUser::default();
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![doctor_json(doctor_id, false, true)]))
        .mount(&mock_server)
        .await;

    let service = CartService::new(&config);
    let request = AddCartItemRequest {
        for_whom: ForWhom::SelfBooking,
        dependant_id: None,
        item: CartItemPayload::DoctorAppointment {
            doctor_id,
            specialization: "Cardiology".to_string(),
            appointment_date: NaiveDate::from_ymd_opt(2030, 1, 15).unwrap(),
            appointment_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            mode: ConsultationMode::InClinic,
        },
        notes: None,
        override_conflict: None,
    };

    let result = service.add_item(&user.to_user(), request, "test-token").await;

    assert_matches!(result, Err(CartError::ValidationError(_)));
}

#[tokio::test]
async fn duplicate_doctor_appointment_conflicts_without_override() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let user = TestUser::default();
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![doctor_json(doctor_id, true, false)]))
        .mount(&mock_server)
        .await;

    // Same doctor, date and time already in the cart.
    Mock::given(method("GET"))
        .and(path("/rest/v1/cart_items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![json!({ "id": Uuid::new_v4() })]))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/cart_items"))
        .respond_with(ResponseTemplate::new(201).set_body_json(Vec::<serde_json::Value>::new()))
        .expect(0)
        .mount(&mock_server)
        .await;

    let service = CartService::new(&config);
    let request = AddCartItemRequest {
        for_whom: ForWhom::SelfBooking,
        dependant_id: None,
        item: CartItemPayload::DoctorAppointment {
            doctor_id,
            specialization: "Cardiology".to_string(),
            appointment_date: NaiveDate::from_ymd_opt(2030, 1, 15).unwrap(),
            appointment_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            mode: ConsultationMode::InClinic,
        },
        notes: None,
        override_conflict: None,
    };

    let result = service.add_item(&user.to_user(), request, "test-token").await;

    assert_matches!(result, Err(CartError::Conflict(_)));
}

#[tokio::test]
async fn booking_for_dependant_requires_dependant_id() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let user = TestUser::default();

    let service = CartService::new(&config);
    let request = AddCartItemRequest {
        for_whom: ForWhom::Dependant,
        dependant_id: None,
        item: CartItemPayload::Test {
            center_id: Uuid::new_v4(),
            visit_type: VisitType::Center,
            test_ids: vec![Uuid::new_v4()],
            address: None,
        },
        notes: None,
        override_conflict: None,
    };

    let result = service.add_item(&user.to_user(), request, "test-token").await;

    assert_matches!(result, Err(CartError::ValidationError(_)));
}

#[tokio::test]
async fn missing_cart_reads_as_empty() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let user = TestUser::default();

    Mock::given(method("GET"))
        .and(path("/rest/v1/carts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&mock_server)
        .await;

    let service = CartService::new(&config);
    let cart = service.get_cart(&user.to_user(), "test-token").await.unwrap();

    assert!(cart.cart_id.is_none());
    assert!(cart.items.is_empty());
    assert_eq!(cart.final_payable, 0.0);
}

#[tokio::test]
async fn get_cart_reprices_stale_items() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let user = TestUser::default();
    let center_id = Uuid::new_v4();
    let test_id = Uuid::new_v4();
    let cart_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/carts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![json!({
            "id": cart_id,
            "user_id": user.id,
            "created_at": "2030-01-01T00:00:00Z"
        })]))
        .mount(&mock_server)
        .await;

    // Stored at the old price of 400; the catalog now says 500.
    Mock::given(method("GET"))
        .and(path("/rest/v1/cart_items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            cart_item_row(&user.id, cart_id, center_id, test_id, 400.0),
        ]))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/lab_tests"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![lab_test_json(test_id, 500.0)]))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/diagnostic_centers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![center_json(center_id, true)]))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/cart_items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            cart_item_row(&user.id, cart_id, center_id, test_id, 500.0),
        ]))
        .expect(1)
        .mount(&mock_server)
        .await;

    let service = CartService::new(&config);
    let cart = service.get_cart(&user.to_user(), "test-token").await.unwrap();

    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].price, 500.0);
    assert_eq!(cart.final_payable, 500.0);
}

#[tokio::test]
async fn get_cart_survives_a_vanished_center() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let user = TestUser::default();
    let center_id = Uuid::new_v4();
    let test_id = Uuid::new_v4();
    let cart_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/carts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![json!({
            "id": cart_id,
            "user_id": user.id,
            "created_at": "2030-01-01T00:00:00Z"
        })]))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/cart_items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            cart_item_row(&user.id, cart_id, center_id, test_id, 500.0),
        ]))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/lab_tests"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![lab_test_json(test_id, 500.0)]))
        .mount(&mock_server)
        .await;

    // The item's center is gone from the catalog; the read still works,
    // the item just carries no center discount.
    Mock::given(method("GET"))
        .and(path("/rest/v1/diagnostic_centers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&mock_server)
        .await;

    let service = CartService::new(&config);
    let cart = service.get_cart(&user.to_user(), "test-token").await.unwrap();

    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].discount_amount, 0.0);
    assert_eq!(cart.final_payable, 500.0);
}

#[tokio::test]
async fn reselecting_the_held_slot_succeeds_without_capacity_checks() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let user = TestUser::default();
    let center_id = Uuid::new_v4();
    let test_id = Uuid::new_v4();
    let cart_id = Uuid::new_v4();

    let mut item = cart_item_row(&user.id, cart_id, center_id, test_id, 500.0);
    item["selected_date"] = json!("2030-01-15");
    item["selected_time"] = json!("09:00:00");
    item["slot_confirmed"] = json!(true);
    let item_id: Uuid = serde_json::from_value(item["id"].clone()).unwrap();

    Mock::given(method("GET"))
        .and(path("/rest/v1/cart_items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![item]))
        .mount(&mock_server)
        .await;

    // The item's own selection is part of the booked count, so re-picking it
    // must work even when the slot is otherwise full. No occupancy lookup and
    // no row update happen.
    Mock::given(method("GET"))
        .and(path("/rest/v1/diagnostic_centers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .expect(0)
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/cart_items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .expect(0)
        .mount(&mock_server)
        .await;

    let service = CartService::new(&config);
    let request = SelectSlotRequest {
        date: NaiveDate::from_ymd_opt(2030, 1, 15).unwrap(),
        time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
    };

    let updated = service
        .select_slot(&user.to_user(), item_id, request, "test-token")
        .await
        .unwrap();

    assert_eq!(updated.id, item_id);
    assert!(updated.slot_confirmed);
}
