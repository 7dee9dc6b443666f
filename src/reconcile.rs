//! Payment reconciliation.
//!
//! Both confirmation channels (the client's confirm call and the
//! gateway's webhook) funnel into `reconcile`. The gateway is always
//! asked for the session's current status rather than trusting the
//! caller, so a forged or stale confirmation cannot mark anyone paid.
//! The paid transition itself is a compare-and-swap on the unpaid
//! state: any number of overlapping reconciliations for the same
//! session produce exactly one transition.

use rusqlite::{Connection, TransactionBehavior};

use crate::admission;
use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::gateway::{GatewaySession, PaymentDiagnostics};
use crate::models::{PaidUpdate, PaymentStatus, Registrant};
use crate::notify::{spawn_notice, RegistrationNotice};

/// Result of reconciling a checkout session.
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// The registrant is paid. `newly_paid` is true for exactly one
    /// reconciliation per session; callers gate one-shot side effects
    /// on it.
    Paid {
        registrant: Registrant,
        newly_paid: bool,
    },
    /// The gateway has not (yet) seen a completed payment.
    Pending,
}

/// Reconcile a checkout session against gateway truth. `source` names
/// the confirmation channel for the audit note.
pub async fn reconcile(
    state: &AppState,
    session_id: &str,
    source: &str,
) -> Result<ReconcileOutcome> {
    let gateway = state.gateway.as_ref().ok_or(AppError::GatewayUnavailable)?;

    // Cheap local correlation check before going to the network. A
    // session nothing points at is unknown regardless of what the
    // gateway would say about it.
    {
        let conn = state.db.get()?;
        let known = queries::get_registrant_by_session(&conn, session_id)?.is_some()
            || queries::get_checkout_draft(&conn, session_id)?.is_some();
        if !known {
            return Err(AppError::UnknownSession);
        }
    }

    let session = gateway.retrieve_session(session_id).await?;
    if !session.is_paid() {
        tracing::debug!(
            "Session {} not paid yet (status={})",
            session_id,
            session.payment_status
        );
        return Ok(ReconcileOutcome::Pending);
    }

    // Card diagnostics are nice-to-have. A failed lookup leaves them
    // null and never fails the reconciliation.
    let diagnostics = match &session.payment_intent {
        Some(intent_id) => match gateway.lookup_payment_intent(intent_id).await {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!("Card diagnostics lookup failed for {}: {}", intent_id, e);
                PaymentDiagnostics::default()
            }
        },
        None => PaymentDiagnostics::default(),
    };

    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let (registrant, newly_paid) = settle_in_tx(&tx, session_id, &session, &diagnostics, source)?;
    tx.commit()?;

    if newly_paid {
        tracing::info!(
            "Registrant {} marked paid via {} (session {})",
            registrant.id,
            source,
            session_id
        );
        spawn_notice(
            state.http_client.clone(),
            state.notify_webhook_url.clone(),
            RegistrationNotice {
                event: "payment_confirmed".to_string(),
                tournament_id: registrant.tournament_id.clone(),
                registrant_id: registrant.id.clone(),
                registrant_name: registrant.name.clone(),
                registrant_email: registrant.email.clone(),
                admission_status: registrant.admission_status.to_string(),
                amount_cents: registrant.payment_amount_cents,
                timestamp: chrono::Utc::now().timestamp(),
            },
        );
    }

    Ok(ReconcileOutcome::Paid {
        registrant,
        newly_paid,
    })
}

/// Apply a paid session to local state under the write lock.
///
/// Resolves the session to a registrant, materializing a cached draft
/// when the payment completed before any registrant row existed, then
/// performs the unpaid-to-paid compare-and-swap.
fn settle_in_tx(
    tx: &Connection,
    session_id: &str,
    session: &GatewaySession,
    diagnostics: &PaymentDiagnostics,
    source: &str,
) -> Result<(Registrant, bool)> {
    // Re-resolve under the lock. A concurrent reconciliation may have
    // materialized the draft between our pre-check and here.
    let registrant = match queries::get_registrant_by_session(tx, session_id)? {
        Some(r) => r,
        None => {
            let (tournament_id, input) = queries::get_checkout_draft(tx, session_id)?
                .ok_or(AppError::UnknownSession)?;
            let r = admission::admit_in_tx(tx, &tournament_id, &input)?;
            queries::set_checkout_session(tx, &r.id, session_id)?;
            queries::delete_checkout_draft(tx, session_id)?;
            tracing::info!(
                "Materialized registrant {} from draft for session {}",
                r.id,
                session_id
            );
            r
        }
    };

    if registrant.payment_status != PaymentStatus::Unpaid {
        // Already settled. Refunded rows stay refunded, a redelivered
        // completion must not resurrect them.
        return Ok((registrant, false));
    }

    // Sessions the gateway settled without a payment carry no intent;
    // the session id itself becomes the correlation key.
    let payment_intent_id = session
        .payment_intent
        .clone()
        .unwrap_or_else(|| session.id.clone());

    let update = PaidUpdate {
        payment_intent_id,
        payment_amount_cents: session.amount_total,
        card_brand: diagnostics.card_brand.clone(),
        card_last4: diagnostics.card_last4.clone(),
        payment_note: format!("Payment confirmed via {}", source),
    };

    let swapped = queries::mark_paid(tx, &registrant.id, &update)?;
    let registrant = queries::get_registrant_by_session(tx, session_id)?
        .ok_or(AppError::UnknownSession)?;

    Ok((registrant, swapped))
}
