use chrono::{NaiveDate, NaiveTime};
use serde_json::json;
use uuid::Uuid;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{method, path};

use assert_matches::assert_matches;
use shared_utils::test_utils::TestConfig;
use availability_cell::models::{
    AvailabilityError, ConsultationMode, CreateDoctorSlotsRequest, SlotRangeSpec, SlotSpec,
};
use availability_cell::services::availability::AvailabilityService;

fn center_json(center_id: Uuid) -> serde_json::Value {
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
        "home_collection_available": true
    })
}

fn doctor_json(doctor_id: Uuid) -> serde_json::Value {
    json!({
        "id": doctor_id,
        "name": "Dr. Rao",
        "specialization": "Cardiology",
        "consultation_fee": 800.0,
        "supports_in_clinic": true,
        "supports_tele": false,
        "timezone": "Asia/Kolkata",
        "is_active": true
    })
}

fn created_slot_json(doctor_id: Uuid) -> serde_json::Value {
    json!({
        "id": Uuid::new_v4(),
        "doctor_id": doctor_id,
        "mode": "in_clinic",
        "date": "2030-01-15",
        "day_of_week": "Tuesday",
        "start_time": "09:00:00",
        "end_time": "09:30:00",
        "capacity": 1,
        "created_at": "2030-01-01T00:00:00Z"
    })
}

#[tokio::test]
async fn center_slots_carry_live_occupancy() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let center_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/diagnostic_centers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![center_json(center_id)]))
        .mount(&mock_server)
        .await;

    // One pending appointment at 09:00, one confirmed cart selection at 09:30.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            json!({ "scheduled_time": "09:00:00" }),
        ]))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/cart_items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![
            json!({ "selected_time": "09:30:00" }),
        ]))
        .mount(&mock_server)
        .await;

    let service = AvailabilityService::new(&config);
    let date = NaiveDate::from_ymd_opt(2030, 1, 15).unwrap();

    let slots = service.get_center_slots(center_id, date, "test-token").await.unwrap();

    // 09:00-11:00 at 30-minute intervals
    assert_eq!(slots.len(), 4);

    assert_eq!(slots[0].start_time, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
    assert_eq!(slots[0].booked, 1);
    assert_eq!(slots[0].available_capacity, 1);

    assert_eq!(slots[1].booked, 1);
    assert_eq!(slots[2].booked, 0);
    assert_eq!(slots[2].available_capacity, 2);

    assert!(slots.iter().all(|s| !s.is_past));
}

#[tokio::test]
async fn center_slots_in_the_past_are_flagged() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let center_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/diagnostic_centers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![center_json(center_id)]))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/cart_items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&mock_server)
        .await;

    let service = AvailabilityService::new(&config);
    let date = NaiveDate::from_ymd_opt(2020, 1, 15).unwrap();

    let slots = service.get_center_slots(center_id, date, "test-token").await.unwrap();

    assert!(slots.iter().all(|s| s.is_past));
}

#[tokio::test]
async fn bulk_create_expands_range_across_dates() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![doctor_json(doctor_id)]))
        .mount(&mock_server)
        .await;

    // Duplicate pre-check finds nothing.
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/doctor_slots"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![created_slot_json(doctor_id)]))
        .expect(4)
        .mount(&mock_server)
        .await;

    let service = AvailabilityService::new(&config);
    let request = CreateDoctorSlotsRequest {
        mode: ConsultationMode::InClinic,
        dates: vec![
            NaiveDate::from_ymd_opt(2030, 1, 15).unwrap(),
            NaiveDate::from_ymd_opt(2030, 1, 16).unwrap(),
        ],
        slots: None,
        range: Some(SlotRangeSpec {
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            slot_duration_minutes: 30,
        }),
        capacity: Some(1),
    };

    let report = service.create_doctor_slots(doctor_id, request, "test-token").await.unwrap();

    // 2 dates x 2 windows
    assert_eq!(report.created.len(), 4);
    assert!(report.errors.is_empty());
}

#[tokio::test]
async fn bulk_create_reports_bad_rows_without_aborting() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![doctor_json(doctor_id)]))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/doctor_slots"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![created_slot_json(doctor_id)]))
        .mount(&mock_server)
        .await;

    let service = AvailabilityService::new(&config);
    let request = CreateDoctorSlotsRequest {
        mode: ConsultationMode::InClinic,
        dates: vec![NaiveDate::from_ymd_opt(2030, 1, 15).unwrap()],
        slots: Some(vec![
            SlotSpec {
                start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            },
            // Inverted window: fails on its own, the batch continues.
            SlotSpec {
                start_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            },
        ]),
        range: None,
        capacity: Some(1),
    };

    let report = service.create_doctor_slots(doctor_id, request, "test-token").await.unwrap();

    assert_eq!(report.created.len(), 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].reason, "End time must be after start time");
}

#[tokio::test]
async fn bulk_create_skips_duplicates_per_row() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![doctor_json(doctor_id)]))
        .mount(&mock_server)
        .await;

    // Every candidate already exists.
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![created_slot_json(doctor_id)]))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/doctor_slots"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![created_slot_json(doctor_id)]))
        .expect(0)
        .mount(&mock_server)
        .await;

    let service = AvailabilityService::new(&config);
    let request = CreateDoctorSlotsRequest {
        mode: ConsultationMode::InClinic,
        dates: vec![NaiveDate::from_ymd_opt(2030, 1, 15).unwrap()],
        slots: Some(vec![SlotSpec {
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
        }]),
        range: None,
        capacity: Some(1),
    };

    let report = service.create_doctor_slots(doctor_id, request, "test-token").await.unwrap();

    assert!(report.created.is_empty());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].reason, "Slot already exists for this date and time");
}

#[tokio::test]
async fn bulk_create_rejects_unsupported_mode() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_supabase_url(&mock_server.uri()).to_app_config();
    let doctor_id = Uuid::new_v4();

    // In-clinic only doctor.
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![doctor_json(doctor_id)]))
        .mount(&mock_server)
        .await;

    let service = AvailabilityService::new(&config);
    let request = CreateDoctorSlotsRequest {
        mode: ConsultationMode::Tele,
        dates: vec![NaiveDate::from_ymd_opt(2030, 1, 15).unwrap()],
        slots: Some(vec![SlotSpec {
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
        }]),
        range: None,
        capacity: Some(1),
    };

    let result = service.create_doctor_slots(doctor_id, request, "test-token").await;

    assert_matches!(result, Err(AvailabilityError::ValidationError(_)));
}
