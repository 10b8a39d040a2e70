use assert_matches::assert_matches;
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_utils::test_utils::TestConfig;
use token_queue_cell::*;

const APPOINTMENTS: &str = "/rest/v1/appointments";

fn row(id: Uuid, status: &str, payment_status: &str, token: &str) -> Value {
    json!({
        "id": id,
        "patient_id": Uuid::new_v4(),
        "doctor_id": Uuid::new_v4(),
        "date": "2025-06-10",
        "slot": "09:30",
        "status": status,
        "payment_status": payment_status,
        "token": token,
        "created_at": "2025-06-09T08:00:00Z",
        "updated_at": "2025-06-09T08:00:00Z"
    })
}

async fn ledger(server: &MockServer) -> SupabaseAppointmentLedger {
    SupabaseAppointmentLedger::new(&TestConfig::with_supabase_url(&server.uri()).to_app_config())
}

#[tokio::test]
async fn get_reads_row_with_service_key() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path(APPOINTMENTS))
        .and(query_param("id", format!("eq.{}", id)))
        .and(header("apikey", "test-service-role-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row(id, "booked", "paid", "OPD-20250610-0004")])))
        .expect(1)
        .mount(&server)
        .await;

    let appointment = ledger(&server).await.get(id).await.unwrap().unwrap();

    assert_eq!(appointment.id, id);
    assert_eq!(appointment.token, "OPD-20250610-0004");
    assert!(appointment.is_booked_and_paid());
}

#[tokio::test]
async fn null_token_reads_as_empty() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();
    let mut pending = row(id, "pending_payment", "pending", "");
    pending.as_object_mut().unwrap().remove("token");

    Mock::given(method("GET"))
        .and(path(APPOINTMENTS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([pending])))
        .mount(&server)
        .await;

    let appointment = ledger(&server).await.get(id).await.unwrap().unwrap();
    assert!(!appointment.has_token());
}

#[tokio::test]
async fn record_payment_patches_pending_row() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path(APPOINTMENTS))
        .and(query_param("status", "eq.pending_payment"))
        .and(header("Prefer", "return=representation"))
        .and(body_partial_json(json!({"status": "booked", "payment_status": "paid"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row(id, "booked", "paid", "")])))
        .expect(1)
        .mount(&server)
        .await;

    let appointment = ledger(&server).await.record_payment(id).await.unwrap();
    assert!(appointment.is_booked_and_paid());
}

#[tokio::test]
async fn record_payment_explains_cancelled_row() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path(APPOINTMENTS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(APPOINTMENTS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row(id, "cancelled", "pending", "")])))
        .mount(&server)
        .await;

    assert_matches!(
        ledger(&server).await.record_payment(id).await,
        Err(TokenQueueError::InvalidStatusTransition { from: AppointmentStatus::Cancelled, .. })
    );
}

#[tokio::test]
async fn record_payment_on_booked_row_is_idempotent() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path(APPOINTMENTS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(APPOINTMENTS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row(id, "booked", "paid", "OPD-20250610-0002")])))
        .mount(&server)
        .await;

    let appointment = ledger(&server).await.record_payment(id).await.unwrap();
    assert_eq!(appointment.token, "OPD-20250610-0002");
}

#[tokio::test]
async fn row_moved_under_conditional_patch_is_a_conflict() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    // the filtered PATCH matched nothing, yet the reload still shows a payable row
    Mock::given(method("PATCH"))
        .and(path(APPOINTMENTS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(APPOINTMENTS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row(id, "pending_payment", "pending", "")])))
        .mount(&server)
        .await;

    assert_matches!(
        ledger(&server).await.record_payment(id).await,
        Err(TokenQueueError::Conflict(_))
    );
}

#[tokio::test]
async fn assign_token_only_fills_empty_slot() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path(APPOINTMENTS))
        .and(query_param("or", "(token.is.null,token.eq.)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(APPOINTMENTS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row(id, "booked", "paid", "OPD-20250610-0001")])))
        .mount(&server)
        .await;

    let wrote = ledger(&server).await.assign_token(id, "OPD-20250610-0002").await.unwrap();
    assert!(!wrote);
}

#[tokio::test]
async fn assign_token_on_missing_row_is_not_found() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path(APPOINTMENTS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(APPOINTMENTS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    assert_matches!(
        ledger(&server).await.assign_token(id, "OPD-20250610-0002").await,
        Err(TokenQueueError::AppointmentNotFound(_))
    );
}

#[tokio::test]
async fn booked_paid_tokens_filters_by_prefix() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(APPOINTMENTS))
        .and(query_param("select", "token"))
        .and(query_param("date", "eq.2025-06-10"))
        .and(query_param("status", "eq.booked"))
        .and(query_param("payment_status", "eq.paid"))
        .and(query_param("token", "like.OPD-20250610-*"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"token": "OPD-20250610-0003"},
            {"token": null},
            {"token": "OPD-20250610-0005"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let date = BusinessDate::from_ymd(2025, 6, 10).unwrap();
    let tokens = ledger(&server).await.booked_paid_tokens(date).await.unwrap();

    assert_eq!(tokens, vec!["OPD-20250610-0003".to_string(), "OPD-20250610-0005".to_string()]);
}

#[tokio::test]
async fn malformed_token_lookup_skips_the_network() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let found = ledger(&server).await.find_by_token("OPD-2025-06-10;drop").await.unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn mark_completed_rejects_unpaid_row() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path(APPOINTMENTS))
        .and(query_param("payment_status", "eq.paid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(APPOINTMENTS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row(id, "booked", "pending", "OPD-20250610-0001")])))
        .mount(&server)
        .await;

    assert_matches!(
        ledger(&server).await.mark_completed(id).await,
        Err(TokenQueueError::PaymentNotCompleted)
    );
}

#[tokio::test]
async fn upstream_failure_surfaces_as_store_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(APPOINTMENTS))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let result = ledger(&server).await.get(Uuid::new_v4()).await;
    assert_matches!(result, Err(TokenQueueError::StoreError(_)));
}
