//! Refunds as compensating transactions.
//!
//! A gateway refund cannot happen atomically with the local state
//! change, so the flow is: check preconditions and reserve the refund
//! under lock, call the gateway with no lock held, then finalize the
//! local transition against the reservation. The reservation (a
//! placeholder refund id written compare-and-swap on paid-and-unrefunded)
//! makes the gateway call at-most-once per payment; a gateway failure
//! rolls it back so the registrant stays paid, seated, and retryable.

use rusqlite::TransactionBehavior;
use uuid::Uuid;

use crate::db::{queries, AppState};
use crate::error::{AppError, OptionExt, Result};
use crate::models::{PaymentStatus, PaymentType, Registrant, RefundUpdate};
use crate::notify::{spawn_notice, RegistrationNotice};

/// A refund admitted past the precondition gate. Manual payments finish
/// inside the reserving transaction; gateway payments leave it holding a
/// reservation that the gateway leg must resolve.
enum RefundStep {
    Done(Registrant),
    Reserved {
        intent_id: String,
        amount_cents: Option<i64>,
        placeholder: String,
    },
}

/// Refund a registrant's entry fee and release their slot.
///
/// Gateway payments are refunded through the gateway; manual payments
/// (cash/check) get a local-only refund record.
pub async fn refund(state: &AppState, registrant_id: &str, reason: &str) -> Result<Registrant> {
    let step = reserve_refund(state, registrant_id, reason)?;

    let refunded = match step {
        RefundStep::Done(refunded) => refunded,
        RefundStep::Reserved {
            intent_id,
            amount_cents,
            placeholder,
        } => {
            let gateway = state.gateway.as_ref().ok_or(AppError::GatewayUnavailable)?;
            // No lock held across this call; the reservation keeps a
            // concurrent refund of the same payment out.
            let gateway_refund = match gateway.create_refund(&intent_id, reason).await {
                Ok(refund) => refund,
                Err(e) => {
                    release_reservation(state, registrant_id, &placeholder);
                    return Err(e);
                }
            };

            let update = RefundUpdate {
                refund_id: gateway_refund.id,
                refund_amount_cents: gateway_refund.amount_cents.or(amount_cents),
                refund_reason: reason.to_string(),
            };
            let mut conn = state.db.get()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if !queries::finalize_refund(&tx, registrant_id, &placeholder, &update)? {
                // Nothing else can touch a reserved row; losing the
                // reservation means the store and the gateway disagree.
                tracing::error!(
                    "Refund reservation for registrant {} vanished; gateway refund {} recorded nowhere",
                    registrant_id,
                    update.refund_id
                );
                return Err(AppError::Internal("refund reservation lost".into()));
            }
            let refunded =
                queries::get_registrant_by_id(&tx, registrant_id).or_not_found("registrant")?;
            tx.commit()?;
            refunded
        }
    };

    tracing::info!(
        "Refunded registrant {} ({}, refund {})",
        refunded.id,
        refunded.payment_type,
        refunded.refund_id.as_deref().unwrap_or("unknown")
    );
    spawn_notice(
        state.http_client.clone(),
        state.notify_webhook_url.clone(),
        RegistrationNotice {
            event: "payment_refunded".to_string(),
            tournament_id: refunded.tournament_id.clone(),
            registrant_id: refunded.id.clone(),
            registrant_name: refunded.name.clone(),
            registrant_email: refunded.email.clone(),
            admission_status: refunded.admission_status.to_string(),
            amount_cents: refunded.refund_amount_cents,
            timestamp: chrono::Utc::now().timestamp(),
        },
    );

    Ok(refunded)
}

/// Check preconditions and claim the refund in one locked transaction.
///
/// Manual payments need no gateway leg, so their whole transition commits
/// here. Gateway payments get a placeholder refund id; once it is in
/// place a second refund attempt fails the compare-and-swap and never
/// reaches the gateway.
fn reserve_refund(state: &AppState, registrant_id: &str, reason: &str) -> Result<RefundStep> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let registrant = queries::get_registrant_by_id(&tx, registrant_id).or_not_found("registrant")?;
    check_refundable(&registrant)?;

    let step = match registrant.payment_type {
        PaymentType::Manual => {
            let update = RefundUpdate {
                refund_id: format!("manual_{}", Uuid::new_v4().simple()),
                refund_amount_cents: registrant.payment_amount_cents,
                refund_reason: reason.to_string(),
            };
            if !queries::mark_refunded(&tx, registrant_id, &update)? {
                return Err(AppError::AlreadyRefunded);
            }
            let refunded =
                queries::get_registrant_by_id(&tx, registrant_id).or_not_found("registrant")?;
            RefundStep::Done(refunded)
        }
        PaymentType::Gateway => {
            if state.gateway.is_none() {
                return Err(AppError::GatewayUnavailable);
            }
            let intent_id = registrant.payment_intent_id.clone().ok_or_else(|| {
                AppError::Validation("registrant has no payment to refund".into())
            })?;
            let placeholder = format!("pending_{}", Uuid::new_v4().simple());
            if !queries::try_reserve_refund(&tx, registrant_id, &placeholder)? {
                // Refunded, or a reservation is already in flight.
                return Err(AppError::AlreadyRefunded);
            }
            RefundStep::Reserved {
                intent_id,
                amount_cents: registrant.payment_amount_cents,
                placeholder,
            }
        }
    };
    tx.commit()?;
    Ok(step)
}

/// Roll a reservation back after a gateway failure. Best effort: the
/// refund already failed, so rollback problems are logged, not returned.
fn release_reservation(state: &AppState, registrant_id: &str, placeholder: &str) {
    let released = state.db.get().map_err(AppError::from).and_then(|conn| {
        queries::release_refund_reservation(&conn, registrant_id, placeholder)
    });
    match released {
        Ok(true) => {}
        Ok(false) => tracing::error!(
            "Refund reservation for registrant {} missing during rollback",
            registrant_id
        ),
        Err(e) => tracing::error!(
            "Failed to roll back refund reservation for registrant {}: {}",
            registrant_id,
            e
        ),
    }
}

fn check_refundable(registrant: &Registrant) -> Result<()> {
    match registrant.payment_status {
        PaymentStatus::Refunded => Err(AppError::AlreadyRefunded),
        PaymentStatus::Unpaid => Err(AppError::Validation(
            "registrant has not paid".into(),
        )),
        PaymentStatus::Paid => Ok(()),
    }
}
