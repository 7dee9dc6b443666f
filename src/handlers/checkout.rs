use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{AppError, OptionExt, Result};
use crate::extractors::{Json, Path};
use crate::gateway::{GatewaySession, PaymentGateway, SessionMetadata};
use crate::models::{PaymentStatus, PaymentType, Registrant, RegistrantInput};
use crate::reconcile::{self, ReconcileOutcome};

/// Checkout request: either for an existing registrant, or for a
/// pre-admission draft (tournament + registrant data, no row yet).
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub registrant_id: Option<String>,
    pub tournament_id: Option<String>,
    pub draft: Option<RegistrantInput>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: String,
}

/// POST /checkout
///
/// Create a gateway checkout session. Re-issuing for an unpaid
/// registrant overwrites the previous session id; late events for the
/// orphaned session no longer correlate and are ignored.
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    let gateway = state.gateway.as_ref().ok_or(AppError::GatewayUnavailable)?;

    match (req.registrant_id, req.tournament_id, req.draft) {
        (Some(registrant_id), None, None) => {
            checkout_for_registrant(&state, gateway, &registrant_id).await
        }
        (None, Some(tournament_id), Some(draft)) => {
            checkout_for_draft(&state, gateway, &tournament_id, draft).await
        }
        _ => Err(AppError::BadRequest(
            "provide either registrant_id, or tournament_id with draft".into(),
        )),
    }
}

async fn checkout_for_registrant(
    state: &AppState,
    gateway: &PaymentGateway,
    registrant_id: &str,
) -> Result<Json<CheckoutResponse>> {
    let (registrant, tournament) = {
        let conn = state.db.get()?;
        let registrant =
            queries::get_registrant_by_id(&conn, registrant_id).or_not_found("registrant")?;
        let tournament = queries::get_tournament_by_id(&conn, &registrant.tournament_id)
            .or_not_found("tournament")?;
        (registrant, tournament)
    };

    match registrant.payment_status {
        PaymentStatus::Paid => return Err(AppError::AlreadyPaid),
        PaymentStatus::Refunded => return Err(AppError::AlreadyRefunded),
        PaymentStatus::Unpaid => {}
    }
    if registrant.payment_type != PaymentType::Gateway {
        return Err(AppError::Validation(
            "registrant does not pay through the gateway".into(),
        ));
    }

    let metadata = SessionMetadata {
        tournament_id: registrant.tournament_id.clone(),
        registrant_id: Some(registrant.id.clone()),
    };
    let handle = gateway
        .create_checkout_session(
            tournament.entry_fee_cents,
            &metadata,
            &success_url(state),
            &state.base_url,
        )
        .await?;

    let conn = state.db.get()?;
    if !queries::set_checkout_session(&conn, &registrant.id, &handle.id)? {
        // Paid between our read and the session write. The orphaned
        // gateway session is never correlated and expires on its own.
        return Err(AppError::AlreadyPaid);
    }

    tracing::info!(
        "Checkout session {} created for registrant {}",
        handle.id,
        registrant.id
    );
    Ok(Json(CheckoutResponse {
        session_id: handle.id,
        url: handle.url,
    }))
}

async fn checkout_for_draft(
    state: &AppState,
    gateway: &PaymentGateway,
    tournament_id: &str,
    draft: RegistrantInput,
) -> Result<Json<CheckoutResponse>> {
    draft.validate().map_err(AppError::Validation)?;
    if draft.payment_type != PaymentType::Gateway {
        return Err(AppError::Validation(
            "draft checkout requires gateway payment".into(),
        ));
    }

    let tournament = {
        let conn = state.db.get()?;
        queries::get_tournament_by_id(&conn, tournament_id).or_not_found("tournament")?
    };
    if !tournament.registration_open {
        return Err(AppError::RegistrationClosed);
    }

    let metadata = SessionMetadata {
        tournament_id: tournament_id.to_string(),
        registrant_id: None,
    };
    let handle = gateway
        .create_checkout_session(
            tournament.entry_fee_cents,
            &metadata,
            &success_url(state),
            &state.base_url,
        )
        .await?;

    let conn = state.db.get()?;
    queries::create_checkout_draft(&conn, &handle.id, tournament_id, &draft)?;

    tracing::info!(
        "Checkout session {} created with draft for tournament {}",
        handle.id,
        tournament_id
    );
    Ok(Json(CheckoutResponse {
        session_id: handle.id,
        url: handle.url,
    }))
}

fn success_url(state: &AppState) -> String {
    format!("{}?session_id={{CHECKOUT_SESSION_ID}}", state.success_page_url)
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub registrant: Registrant,
    pub message: &'static str,
}

/// POST /checkout/confirm
///
/// Client-side confirmation channel. Gateway truth decides; a session
/// the gateway has not completed yet returns 402 and the client retries.
pub async fn confirm_checkout(
    State(state): State<AppState>,
    Json(req): Json<ConfirmRequest>,
) -> Result<Json<ConfirmResponse>> {
    match reconcile::reconcile(&state, &req.session_id, "checkout confirmation").await? {
        ReconcileOutcome::Paid {
            registrant,
            newly_paid,
        } => Ok(Json(ConfirmResponse {
            registrant,
            message: if newly_paid {
                "payment confirmed"
            } else {
                "payment already confirmed"
            },
        })),
        ReconcileOutcome::Pending => Err(AppError::PaymentPending),
    }
}

/// GET /checkout/session/{id}
///
/// Read-only passthrough of the gateway's view of a session.
pub async fn get_checkout_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<GatewaySession>> {
    let gateway = state.gateway.as_ref().ok_or(AppError::GatewayUnavailable)?;
    let session = gateway.retrieve_session(&session_id).await?;
    Ok(Json(session))
}
