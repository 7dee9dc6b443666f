//! Checkout session creation tests: correlation persistence, re-issue
//! semantics, and precondition failures.

use axum::{body::Body, http::Request, http::StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;
use common::*;

async fn post_checkout(app: axum::Router, body: &Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/checkout")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn checkout_persists_session_on_registrant() {
    let gateway = TestGateway::manual();
    let state = create_test_app_state(Some(PaymentGateway::Test(gateway)), None);

    let registrant = {
        let conn = state.db.get().unwrap();
        let tournament = create_test_tournament(&conn, "Checkout", 8, 0);
        create_test_registrant(&conn, &tournament.id, "Buyer Bob", AdmissionStatus::Confirmed)
    };
    let app = app(state.clone());

    let (status, body) = post_checkout(app, &json!({ "registrant_id": registrant.id })).await;
    assert_eq!(status, StatusCode::OK);
    let session_id = body["session_id"].as_str().unwrap();

    let conn = state.db.get().unwrap();
    let stored = queries::get_registrant_by_id(&conn, &registrant.id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.checkout_session_id.as_deref(), Some(session_id));
}

#[tokio::test]
async fn reissue_overwrites_previous_session() {
    let gateway = TestGateway::manual();
    let state = create_test_app_state(Some(PaymentGateway::Test(gateway)), None);

    let registrant = {
        let conn = state.db.get().unwrap();
        let tournament = create_test_tournament(&conn, "Reissue", 8, 0);
        create_test_registrant(&conn, &tournament.id, "Retry Rita", AdmissionStatus::Confirmed)
    };
    let app = app(state.clone());

    let (_, first) = post_checkout(app.clone(), &json!({ "registrant_id": registrant.id })).await;
    let (_, second) = post_checkout(app, &json!({ "registrant_id": registrant.id })).await;

    let first_id = first["session_id"].as_str().unwrap();
    let second_id = second["session_id"].as_str().unwrap();
    assert_ne!(first_id, second_id);

    // Only the latest session correlates; the first is orphaned.
    let conn = state.db.get().unwrap();
    let stored = queries::get_registrant_by_id(&conn, &registrant.id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.checkout_session_id.as_deref(), Some(second_id));
    assert!(queries::get_registrant_by_session(&conn, first_id)
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn paid_registrant_cannot_checkout_again() {
    let state = create_test_app_state(Some(PaymentGateway::Test(TestGateway::new())), None);

    let registrant = {
        let conn = state.db.get().unwrap();
        let tournament = create_test_tournament(&conn, "Paid Up", 8, 0);
        let registrant =
            create_test_registrant(&conn, &tournament.id, "Done Dora", AdmissionStatus::Confirmed);
        let update = PaidUpdate {
            payment_intent_id: "pi_test_alreadypaid".to_string(),
            payment_amount_cents: Some(7500),
            card_brand: None,
            card_last4: None,
            payment_note: "Paid".to_string(),
        };
        assert!(queries::mark_paid(&conn, &registrant.id, &update).unwrap());
        registrant
    };
    let app = app(state);

    let (status, body) = post_checkout(app, &json!({ "registrant_id": registrant.id })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "Registrant is already paid");
}

#[tokio::test]
async fn manual_registrant_cannot_checkout() {
    let state = create_test_app_state(Some(PaymentGateway::Test(TestGateway::new())), None);

    let registrant = {
        let conn = state.db.get().unwrap();
        let tournament = create_test_tournament(&conn, "Cash", 8, 0);
        let input = RegistrantInput {
            name: "Cash Cara".to_string(),
            email: "cash.cara@example.com".to_string(),
            payment_type: PaymentType::Manual,
        };
        queries::insert_registrant(&conn, &tournament.id, &input, AdmissionStatus::Confirmed)
            .unwrap()
    };
    let app = app(state);

    let (status, _) = post_checkout(app, &json!({ "registrant_id": registrant.id })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn draft_checkout_requires_open_registration() {
    let state = create_test_app_state(Some(PaymentGateway::Test(TestGateway::new())), None);

    let tournament_id = {
        let conn = state.db.get().unwrap();
        let tournament = create_test_tournament(&conn, "Closed Draft", 8, 0);
        queries::set_registration_open(&conn, &tournament.id, false).unwrap();
        tournament.id
    };
    let app = app(state);

    let (status, _) = post_checkout(
        app,
        &json!({
            "tournament_id": tournament_id,
            "draft": { "name": "Late Lucy", "email": "late.lucy@example.com" }
        }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn ambiguous_checkout_request_is_rejected() {
    let state = create_test_app_state(Some(PaymentGateway::Test(TestGateway::new())), None);
    let app = app(state);

    let (status, _) = post_checkout(app, &json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn no_gateway_returns_503() {
    let state = create_test_app_state(None, None);
    let registrant = {
        let conn = state.db.get().unwrap();
        let tournament = create_test_tournament(&conn, "Offline", 8, 0);
        create_test_registrant(&conn, &tournament.id, "Off Oscar", AdmissionStatus::Confirmed)
    };
    let app = app(state);

    let (status, _) = post_checkout(app, &json!({ "registrant_id": registrant.id })).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn session_status_passthrough() {
    let gateway = TestGateway::manual();
    let state = create_test_app_state(Some(PaymentGateway::Test(gateway.clone())), None);

    let registrant = {
        let conn = state.db.get().unwrap();
        let tournament = create_test_tournament(&conn, "Status", 8, 0);
        create_test_registrant(&conn, &tournament.id, "Watch Wendy", AdmissionStatus::Confirmed)
    };
    let app = app(state);

    let (_, checkout) = post_checkout(
        app.clone(),
        &json!({ "registrant_id": registrant.id }),
    )
    .await;
    let session_id = checkout["session_id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(format!("/checkout/session/{}", session_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let session: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(session["id"], session_id);
    assert_eq!(session["payment_status"], "unpaid");
}
