//! Gateway webhook ingestion.
//!
//! The webhook is the second confirmation channel; it may arrive
//! before, after, or instead of the client's confirm call, and the
//! gateway may deliver any event more than once. Everything dispatched
//! from here is idempotent, except the failure-note append which is
//! deduplicated by event id.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::gateway::verify_webhook_signature;
use crate::reconcile::{self, ReconcileOutcome};

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
struct WebhookEventData {
    object: EventObject,
}

/// The parts of the event object we act on; everything else is ignored.
#[derive(Debug, Deserialize)]
struct EventObject {
    id: Option<String>,
    #[serde(default)]
    metadata: EventMetadata,
    last_payment_error: Option<LastPaymentError>,
}

#[derive(Debug, Default, Deserialize)]
struct EventMetadata {
    registrant_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LastPaymentError {
    message: Option<String>,
}

/// POST /webhooks/gateway
///
/// Signature policy: with a configured secret, an invalid or missing
/// signature is rejected 400. Without one, unsigned payloads are
/// accepted and a warning is logged; local and test setups run without
/// a secret on purpose.
pub async fn gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str)> {
    if state.gateway.is_none() {
        return Err(AppError::GatewayUnavailable);
    }

    match &state.webhook_secret {
        Some(secret) => {
            let signature = headers
                .get("stripe-signature")
                .ok_or(AppError::SignatureInvalid)?
                .to_str()
                .map_err(|_| AppError::SignatureInvalid)?;
            if !verify_webhook_signature(&body, signature, secret)? {
                return Err(AppError::SignatureInvalid);
            }
        }
        None => {
            tracing::warn!("Webhook accepted without signature verification: no secret configured");
        }
    }

    // Only signature failures reject; a body we cannot parse is logged
    // and acknowledged so the gateway does not redeliver it forever.
    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("Unparseable webhook payload acknowledged: {}", e);
            return Ok((StatusCode::OK, "Ignored"));
        }
    };

    tracing::debug!(
        "Webhook event {} ({})",
        event.event_type,
        event.id.as_deref().unwrap_or("no id")
    );

    match event.event_type.as_str() {
        "checkout.session.completed" => handle_session_completed(&state, &event).await,
        "payment_intent.succeeded" => handle_intent_succeeded(&state, &event).await,
        "checkout.session.expired" => handle_session_expired(&state, &event),
        "payment_intent.payment_failed" => handle_payment_failed(&state, &event),
        other => {
            tracing::debug!("Ignoring webhook event type {}", other);
            Ok((StatusCode::OK, "Ignored"))
        }
    }
}

async fn handle_session_completed(
    state: &AppState,
    event: &WebhookEvent,
) -> Result<(StatusCode, &'static str)> {
    let Some(session_id) = event.data.object.id.as_deref() else {
        tracing::warn!("checkout.session.completed without a session id");
        return Ok((StatusCode::OK, "Ignored"));
    };

    run_reconcile(state, session_id, "checkout.session.completed webhook").await
}

async fn handle_intent_succeeded(
    state: &AppState,
    event: &WebhookEvent,
) -> Result<(StatusCode, &'static str)> {
    let Some(intent_id) = event.data.object.id.as_deref() else {
        return Ok((StatusCode::OK, "Ignored"));
    };

    // Primary correlation: a registrant already carrying this intent
    // was reconciled through the other channel.
    let session_id = {
        let conn = state.db.get()?;
        if queries::get_registrant_by_intent(&conn, intent_id)?.is_some() {
            return Ok((StatusCode::OK, "Already reconciled"));
        }
        // Metadata fallback: the intent carries the registrant id set at
        // session creation.
        let registrant = event
            .data
            .object
            .metadata
            .registrant_id
            .as_deref()
            .map(|id| queries::get_registrant_by_id(&conn, id))
            .transpose()?
            .flatten();
        match registrant.and_then(|r| r.checkout_session_id) {
            Some(session_id) => session_id,
            None => {
                tracing::debug!("payment_intent.succeeded {} has no correlation", intent_id);
                return Ok((StatusCode::OK, "No correlation"));
            }
        }
    };

    run_reconcile(state, &session_id, "payment_intent.succeeded webhook").await
}

async fn run_reconcile(
    state: &AppState,
    session_id: &str,
    source: &str,
) -> Result<(StatusCode, &'static str)> {
    match reconcile::reconcile(state, session_id, source).await {
        Ok(ReconcileOutcome::Paid { .. }) => Ok((StatusCode::OK, "OK")),
        Ok(ReconcileOutcome::Pending) => {
            Ok((StatusCode::OK, "Acknowledged; payment not completed"))
        }
        // A session nothing local points at (orphaned after re-issue,
        // or from a foreign environment) is acknowledged, not retried.
        Err(AppError::UnknownSession) => {
            tracing::debug!("Webhook for unknown session {}", session_id);
            Ok((StatusCode::OK, "Unknown session ignored"))
        }
        // Gateway failures bubble up as 502 so the sender redelivers.
        Err(e) => Err(e),
    }
}

fn handle_session_expired(
    state: &AppState,
    event: &WebhookEvent,
) -> Result<(StatusCode, &'static str)> {
    let Some(session_id) = event.data.object.id.as_deref() else {
        return Ok((StatusCode::OK, "Ignored"));
    };

    let conn = state.db.get()?;
    // Unpaid rows only; an expiry racing a completed payment must not
    // detach the correlation. Payment status is never touched.
    let cleared = queries::clear_stale_session(&conn, session_id)?;
    let dropped = queries::delete_checkout_draft(&conn, session_id)?;
    if cleared || dropped {
        tracing::info!("Cleared expired checkout session {}", session_id);
    }
    Ok((StatusCode::OK, "OK"))
}

fn handle_payment_failed(
    state: &AppState,
    event: &WebhookEvent,
) -> Result<(StatusCode, &'static str)> {
    let conn = state.db.get()?;

    // The note append is not idempotent, so redeliveries are deduped by
    // event id. Events without an id are acknowledged untouched.
    let Some(event_id) = event.id.as_deref() else {
        return Ok((StatusCode::OK, "Ignored"));
    };
    if !queries::try_record_webhook_event(&conn, event_id)? {
        return Ok((StatusCode::OK, "Duplicate delivery"));
    }

    let Some(registrant_id) = event.data.object.metadata.registrant_id.as_deref() else {
        return Ok((StatusCode::OK, "No correlation"));
    };

    let message = event
        .data
        .object
        .last_payment_error
        .as_ref()
        .and_then(|e| e.message.as_deref())
        .unwrap_or("no details from gateway");
    let note = format!("Payment attempt failed: {}", message);

    if queries::append_payment_note(&conn, registrant_id, &note)? {
        tracing::info!("Recorded failed payment attempt for {}", registrant_id);
    }
    Ok((StatusCode::OK, "OK"))
}
