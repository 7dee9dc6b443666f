//! Reconciliation tests: idempotent confirmation, the pending path,
//! draft materialization, and the confirm endpoint round trip.

use axum::{body::Body, http::Request};
use scramble::error::AppError;
use scramble::reconcile::{reconcile, ReconcileOutcome};
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;
use common::*;

fn test_state_with(gateway: TestGateway) -> AppState {
    create_test_app_state(Some(PaymentGateway::Test(gateway)), None)
}

/// Create a gateway session and attach it to the registrant.
fn attach_session(state: &AppState, gateway: &TestGateway, registrant: &Registrant) -> String {
    let handle = gateway.create_checkout_session(
        7500,
        &SessionMetadata {
            tournament_id: registrant.tournament_id.clone(),
            registrant_id: Some(registrant.id.clone()),
        },
    );
    let conn = state.db.get().unwrap();
    assert!(queries::set_checkout_session(&conn, &registrant.id, &handle.id).unwrap());
    handle.id
}

#[tokio::test]
async fn reconcile_marks_registrant_paid() {
    let gateway = TestGateway::new();
    let state = test_state_with(gateway.clone());

    let registrant = {
        let conn = state.db.get().unwrap();
        let tournament = create_test_tournament(&conn, "Open", 8, 0);
        create_test_registrant(&conn, &tournament.id, "Payer One", AdmissionStatus::Confirmed)
    };
    let session_id = attach_session(&state, &gateway, &registrant);

    let outcome = reconcile(&state, &session_id, "test confirm").await.unwrap();
    let ReconcileOutcome::Paid {
        registrant: paid,
        newly_paid,
    } = outcome
    else {
        panic!("expected Paid outcome");
    };

    assert!(newly_paid);
    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert_eq!(paid.payment_amount_cents, Some(7500));
    assert!(paid
        .payment_intent_id
        .as_deref()
        .unwrap()
        .starts_with("pi_test_"));
    assert!(paid.payment_note.as_deref().unwrap().contains("test confirm"));
    // Test gateway reports synthetic card diagnostics.
    assert_eq!(paid.card_brand.as_deref(), Some("visa"));
    assert_eq!(paid.card_last4.as_deref(), Some("4242"));
}

#[tokio::test]
async fn double_reconcile_is_idempotent() {
    let gateway = TestGateway::new();
    let state = test_state_with(gateway.clone());

    let registrant = {
        let conn = state.db.get().unwrap();
        let tournament = create_test_tournament(&conn, "Open", 8, 0);
        create_test_registrant(&conn, &tournament.id, "Payer Two", AdmissionStatus::Confirmed)
    };
    let session_id = attach_session(&state, &gateway, &registrant);

    let first = reconcile(&state, &session_id, "channel a").await.unwrap();
    let second = reconcile(&state, &session_id, "channel b").await.unwrap();

    let ReconcileOutcome::Paid {
        registrant: first_r,
        newly_paid: first_new,
    } = first
    else {
        panic!("expected Paid outcome");
    };
    let ReconcileOutcome::Paid {
        registrant: second_r,
        newly_paid: second_new,
    } = second
    else {
        panic!("expected Paid outcome");
    };

    assert!(first_new);
    assert!(!second_new, "second reconciliation must not re-pay");
    assert_eq!(first_r.payment_intent_id, second_r.payment_intent_id);
    // The second channel writes nothing: the note still names the first.
    assert!(second_r.payment_note.as_deref().unwrap().contains("channel a"));
    assert!(!second_r.payment_note.as_deref().unwrap().contains("channel b"));
}

#[tokio::test]
async fn pending_until_gateway_completes() {
    let gateway = TestGateway::manual();
    let state = test_state_with(gateway.clone());

    let registrant = {
        let conn = state.db.get().unwrap();
        let tournament = create_test_tournament(&conn, "Open", 8, 0);
        create_test_registrant(&conn, &tournament.id, "Slow Payer", AdmissionStatus::Confirmed)
    };
    let session_id = attach_session(&state, &gateway, &registrant);

    let outcome = reconcile(&state, &session_id, "early confirm").await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Pending));
    {
        let conn = state.db.get().unwrap();
        let unchanged = queries::get_registrant_by_id(&conn, &registrant.id)
            .unwrap()
            .unwrap();
        assert_eq!(unchanged.payment_status, PaymentStatus::Unpaid);
    }

    gateway.complete_session(&session_id).expect("session exists");

    let outcome = reconcile(&state, &session_id, "retry confirm").await.unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::Paid { newly_paid: true, .. }
    ));
}

#[tokio::test]
async fn draft_is_materialized_and_consumed() {
    let gateway = TestGateway::new();
    let state = test_state_with(gateway.clone());

    let tournament_id = {
        let conn = state.db.get().unwrap();
        create_test_tournament(&conn, "Draft Open", 8, 0).id
    };

    let handle = gateway.create_checkout_session(
        7500,
        &SessionMetadata {
            tournament_id: tournament_id.clone(),
            registrant_id: None,
        },
    );
    {
        let conn = state.db.get().unwrap();
        queries::create_checkout_draft(&conn, &handle.id, &tournament_id, &test_input("Draft Dan"))
            .unwrap();
    }

    let outcome = reconcile(&state, &handle.id, "webhook").await.unwrap();
    let ReconcileOutcome::Paid {
        registrant,
        newly_paid,
    } = outcome
    else {
        panic!("expected Paid outcome");
    };

    assert!(newly_paid);
    assert_eq!(registrant.tournament_id, tournament_id);
    assert_eq!(registrant.admission_status, AdmissionStatus::Confirmed);
    assert_eq!(registrant.payment_status, PaymentStatus::Paid);
    assert_eq!(registrant.checkout_session_id.as_deref(), Some(handle.id.as_str()));

    let conn = state.db.get().unwrap();
    assert!(
        queries::get_checkout_draft(&conn, &handle.id).unwrap().is_none(),
        "draft must be consumed"
    );
}

#[tokio::test]
async fn unknown_session_is_rejected() {
    let state = test_state_with(TestGateway::new());
    let result = reconcile(&state, "cs_test_nobody", "confirm").await;
    assert!(matches!(result, Err(AppError::UnknownSession)));
}

#[tokio::test]
async fn refunded_registrant_is_not_resurrected() {
    let gateway = TestGateway::new();
    let state = test_state_with(gateway.clone());

    let registrant = {
        let conn = state.db.get().unwrap();
        let tournament = create_test_tournament(&conn, "Open", 8, 0);
        create_test_registrant(&conn, &tournament.id, "Refunded Ray", AdmissionStatus::Confirmed)
    };
    let session_id = attach_session(&state, &gateway, &registrant);

    reconcile(&state, &session_id, "confirm").await.unwrap();
    {
        let conn = state.db.get().unwrap();
        let update = RefundUpdate {
            refund_id: "re_test_manualstep".to_string(),
            refund_amount_cents: Some(7500),
            refund_reason: "test".to_string(),
        };
        assert!(queries::mark_refunded(&conn, &registrant.id, &update).unwrap());
    }

    // A redelivered completion event reconciles again; the refunded row
    // must stay refunded.
    let outcome = reconcile(&state, &session_id, "redelivery").await.unwrap();
    let ReconcileOutcome::Paid {
        registrant: after,
        newly_paid,
    } = outcome
    else {
        panic!("expected Paid outcome");
    };
    assert!(!newly_paid);
    assert_eq!(after.payment_status, PaymentStatus::Refunded);
}

#[tokio::test]
async fn confirm_endpoint_round_trip() {
    let state = test_state_with(TestGateway::new());
    let tournament_id = {
        let conn = state.db.get().unwrap();
        create_test_tournament(&conn, "Endpoint Open", 8, 0).id
    };
    let app = app(state);

    // Checkout with a pre-admission draft.
    let checkout_body = json!({
        "tournament_id": tournament_id,
        "draft": { "name": "End Toend", "email": "end.toend@example.com" }
    });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/checkout")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&checkout_body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let checkout: Value = serde_json::from_slice(&body).unwrap();
    let session_id = checkout["session_id"].as_str().unwrap().to_string();
    assert!(session_id.starts_with("cs_test_"));
    assert!(checkout["url"].as_str().unwrap().contains(&session_id));

    // Confirm twice: first is the real transition, second is a no-op.
    for (pass, expected_message) in [
        (1, "payment confirmed"),
        (2, "payment already confirmed"),
    ] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/checkout/confirm")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::to_string(&json!({ "session_id": session_id })).unwrap(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            axum::http::StatusCode::OK,
            "confirm pass {}",
            pass
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let confirm: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(confirm["message"], expected_message);
        assert_eq!(confirm["registrant"]["payment_status"], "paid");
        assert!(confirm["registrant"]["payment_intent_id"]
            .as_str()
            .unwrap()
            .starts_with("pi_test_"));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn simultaneous_channels_settle_exactly_once() {
    // The client confirm and the gateway webhook race to reconcile the
    // same session. Both must come back paid; exactly one performs the
    // unpaid-to-paid transition (and so fires the one notification).
    use std::sync::Arc;

    let db_path = std::env::temp_dir().join(format!(
        "scramble_reconcile_race_{}.db",
        uuid::Uuid::new_v4()
    ));
    let db_path = db_path.to_str().unwrap().to_string();

    let gateway = TestGateway::new();
    let state = create_file_app_state(&db_path, Some(PaymentGateway::Test(gateway.clone())));
    let registrant = {
        let conn = state.db.get().unwrap();
        let tournament = create_test_tournament(&conn, "Two Channels", 8, 0);
        create_test_registrant(&conn, &tournament.id, "Raced Rhea", AdmissionStatus::Confirmed)
    };
    let session_id = attach_session(&state, &gateway, &registrant);

    let barrier = Arc::new(tokio::sync::Barrier::new(2));
    let channels = ["checkout confirmation", "completion webhook"].map(|source| {
        let state = state.clone();
        let session_id = session_id.clone();
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            reconcile(&state, &session_id, source).await
        })
    });

    let mut transitions = 0;
    for channel in channels {
        let outcome = channel.await.unwrap().unwrap();
        let ReconcileOutcome::Paid {
            registrant: paid,
            newly_paid,
        } = outcome
        else {
            panic!("expected Paid outcome");
        };
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        if newly_paid {
            transitions += 1;
        }
    }
    assert_eq!(
        transitions, 1,
        "exactly one channel should perform the transition"
    );

    drop(state);
    std::fs::remove_file(&db_path).ok();
}

#[tokio::test]
async fn confirm_endpoint_returns_402_while_pending() {
    let gateway = TestGateway::manual();
    let state = test_state_with(gateway.clone());

    let registrant = {
        let conn = state.db.get().unwrap();
        let tournament = create_test_tournament(&conn, "Pending", 8, 0);
        create_test_registrant(&conn, &tournament.id, "Pending Pat", AdmissionStatus::Confirmed)
    };
    let session_id = attach_session(&state, &gateway, &registrant);
    let app = app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/checkout/confirm")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::to_string(&json!({ "session_id": session_id })).unwrap(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), axum::http::StatusCode::PAYMENT_REQUIRED);
}
