use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

use super::from_row::{query_all, query_one, GROUP_COLS, REGISTRANT_COLS, TOURNAMENT_COLS};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

// ============ Tournaments ============

pub fn create_tournament(conn: &Connection, input: &CreateTournament) -> Result<Tournament> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO tournaments (id, name, capacity, reserved_slots, registration_open, entry_fee_cents, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6, ?7)",
        params![
            &id,
            &input.name,
            input.capacity,
            input.reserved_slots,
            input.entry_fee_cents,
            now,
            now
        ],
    )?;

    Ok(Tournament {
        id,
        name: input.name.clone(),
        capacity: input.capacity,
        reserved_slots: input.reserved_slots,
        registration_open: true,
        entry_fee_cents: input.entry_fee_cents,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_tournament_by_id(conn: &Connection, id: &str) -> Result<Option<Tournament>> {
    query_one(
        conn,
        &format!("SELECT {} FROM tournaments WHERE id = ?1", TOURNAMENT_COLS),
        &[&id],
    )
}

pub fn set_registration_open(conn: &Connection, id: &str, open: bool) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE tournaments SET registration_open = ?1, updated_at = ?2 WHERE id = ?3",
        params![open as i64, now(), id],
    )?;
    Ok(affected > 0)
}

/// Count registrants holding a confirmed slot. Only meaningful for
/// admission decisions when read inside the tournament-scoped
/// (immediate) transaction.
pub fn count_confirmed(conn: &Connection, tournament_id: &str) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM registrants
         WHERE tournament_id = ?1 AND admission_status = 'confirmed'",
        params![tournament_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ============ Groups ============

pub fn create_group(conn: &Connection, tournament_id: &str, input: &CreateGroup) -> Result<Group> {
    let id = gen_id();
    let now = now();

    conn.execute(
        "INSERT INTO groups (id, tournament_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![&id, tournament_id, &input.name, now],
    )?;

    Ok(Group {
        id,
        tournament_id: tournament_id.to_string(),
        name: input.name.clone(),
        created_at: now,
    })
}

pub fn list_groups(conn: &Connection, tournament_id: &str) -> Result<Vec<Group>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM groups WHERE tournament_id = ?1 ORDER BY created_at",
            GROUP_COLS
        ),
        &[&tournament_id],
    )
}

pub fn assign_group_slot(
    conn: &Connection,
    registrant_id: &str,
    group_id: &str,
    slot: i64,
) -> Result<bool> {
    // Cancelled registrants must never hold a slot.
    let affected = conn.execute(
        "UPDATE registrants SET group_id = ?1, group_slot = ?2, updated_at = ?3
         WHERE id = ?4 AND admission_status != 'cancelled'",
        params![group_id, slot, now(), registrant_id],
    )?;
    Ok(affected > 0)
}

// ============ Registrants ============

/// Insert a registrant with an already-decided admission status.
/// Callers run this inside the tournament-scoped transaction so the
/// capacity count the decision was based on cannot have moved.
pub fn insert_registrant(
    conn: &Connection,
    tournament_id: &str,
    input: &RegistrantInput,
    admission_status: AdmissionStatus,
) -> Result<Registrant> {
    let id = gen_id();
    let now = now();
    let email = input.email.trim().to_lowercase();
    let name = input.name.trim().to_string();

    conn.execute(
        "INSERT INTO registrants (id, tournament_id, name, email, admission_status, payment_status, payment_type, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'unpaid', ?6, ?7, ?8)",
        params![
            &id,
            tournament_id,
            &name,
            &email,
            admission_status.to_string(),
            input.payment_type.to_string(),
            now,
            now
        ],
    )?;

    Ok(Registrant {
        id,
        tournament_id: tournament_id.to_string(),
        name,
        email,
        admission_status,
        payment_status: PaymentStatus::Unpaid,
        payment_type: input.payment_type,
        checkout_session_id: None,
        payment_intent_id: None,
        payment_amount_cents: None,
        card_brand: None,
        card_last4: None,
        payment_note: None,
        refund_id: None,
        refund_amount_cents: None,
        refund_reason: None,
        refunded_at: None,
        group_id: None,
        group_slot: None,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_registrant_by_id(conn: &Connection, id: &str) -> Result<Option<Registrant>> {
    query_one(
        conn,
        &format!("SELECT {} FROM registrants WHERE id = ?1", REGISTRANT_COLS),
        &[&id],
    )
}

pub fn get_registrant_by_session(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<Registrant>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM registrants WHERE checkout_session_id = ?1",
            REGISTRANT_COLS
        ),
        &[&session_id],
    )
}

pub fn get_registrant_by_intent(
    conn: &Connection,
    payment_intent_id: &str,
) -> Result<Option<Registrant>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM registrants WHERE payment_intent_id = ?1",
            REGISTRANT_COLS
        ),
        &[&payment_intent_id],
    )
}

pub fn list_registrants(conn: &Connection, tournament_id: &str) -> Result<Vec<Registrant>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM registrants WHERE tournament_id = ?1 ORDER BY created_at",
            REGISTRANT_COLS
        ),
        &[&tournament_id],
    )
}

/// Attach a checkout session to an unpaid registrant. Overwrites any
/// previous session identifier (the old one becomes orphaned and late
/// events referencing it are ignored). Returns false when the registrant
/// is not unpaid, which callers surface as `AlreadyPaid`.
pub fn set_checkout_session(
    conn: &Connection,
    registrant_id: &str,
    session_id: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE registrants SET checkout_session_id = ?1, updated_at = ?2
         WHERE id = ?3 AND payment_status = 'unpaid'",
        params![session_id, now(), registrant_id],
    )?;
    Ok(affected > 0)
}

/// Transition a registrant to paid. Compare-and-swap on the unpaid
/// state: exactly one of any number of concurrent reconciliations
/// performs the write; the rest observe 0 rows affected.
pub fn mark_paid(conn: &Connection, registrant_id: &str, update: &PaidUpdate) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE registrants
         SET payment_status = 'paid', payment_intent_id = ?1, payment_amount_cents = ?2,
             card_brand = ?3, card_last4 = ?4, payment_note = ?5, updated_at = ?6
         WHERE id = ?7 AND payment_status = 'unpaid'",
        params![
            &update.payment_intent_id,
            update.payment_amount_cents,
            update.card_brand,
            update.card_last4,
            &update.payment_note,
            now(),
            registrant_id
        ],
    )?;
    Ok(affected > 0)
}

/// Clear a stale (expired) checkout session so the registrant can retry.
/// Paid rows are left alone: an expiry event racing a completed payment
/// must not detach the correlation.
pub fn clear_stale_session(conn: &Connection, session_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE registrants SET checkout_session_id = NULL, updated_at = ?1
         WHERE checkout_session_id = ?2 AND payment_status = 'unpaid'",
        params![now(), session_id],
    )?;
    Ok(affected > 0)
}

/// Append a line to the diagnostic payment note without touching
/// payment state.
pub fn append_payment_note(conn: &Connection, registrant_id: &str, note: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE registrants
         SET payment_note = COALESCE(payment_note || char(10), '') || ?1, updated_at = ?2
         WHERE id = ?3",
        params![note, now(), registrant_id],
    )?;
    Ok(affected > 0)
}

/// Reserve a refund in progress by writing a placeholder refund id.
/// Compare-and-swap on the paid, not-yet-refunded state: at most one
/// reservation can exist, so at most one gateway refund call can be in
/// flight for a payment.
pub fn try_reserve_refund(
    conn: &Connection,
    registrant_id: &str,
    placeholder: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE registrants SET refund_id = ?1, updated_at = ?2
         WHERE id = ?3 AND payment_status = 'paid' AND refund_id IS NULL",
        params![placeholder, now(), registrant_id],
    )?;
    Ok(affected > 0)
}

/// Roll a reservation back after a gateway failure, restoring the
/// registrant to plain paid so the refund can be retried.
pub fn release_refund_reservation(
    conn: &Connection,
    registrant_id: &str,
    placeholder: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE registrants SET refund_id = NULL, updated_at = ?1
         WHERE id = ?2 AND refund_id = ?3 AND payment_status = 'paid'",
        params![now(), registrant_id, placeholder],
    )?;
    Ok(affected > 0)
}

/// Complete a reserved refund: flip to refunded/cancelled, detach any
/// group slot, and replace the placeholder with the real refund record,
/// all in one statement.
pub fn finalize_refund(
    conn: &Connection,
    registrant_id: &str,
    placeholder: &str,
    update: &RefundUpdate,
) -> Result<bool> {
    let now = now();
    let affected = conn.execute(
        "UPDATE registrants
         SET payment_status = 'refunded', admission_status = 'cancelled',
             group_id = NULL, group_slot = NULL,
             refund_id = ?1, refund_amount_cents = ?2, refund_reason = ?3,
             refunded_at = ?4, updated_at = ?4
         WHERE id = ?5 AND refund_id = ?6 AND payment_status = 'paid'",
        params![
            &update.refund_id,
            update.refund_amount_cents,
            &update.refund_reason,
            now,
            registrant_id,
            placeholder
        ],
    )?;
    Ok(affected > 0)
}

/// Complete a refund with no gateway leg: flip to refunded/cancelled,
/// detach any group slot, and persist the refund record, all in one
/// statement. Compare-and-swap on the paid, not-yet-refunded state.
pub fn mark_refunded(
    conn: &Connection,
    registrant_id: &str,
    update: &RefundUpdate,
) -> Result<bool> {
    let now = now();
    let affected = conn.execute(
        "UPDATE registrants
         SET payment_status = 'refunded', admission_status = 'cancelled',
             group_id = NULL, group_slot = NULL,
             refund_id = ?1, refund_amount_cents = ?2, refund_reason = ?3,
             refunded_at = ?4, updated_at = ?4
         WHERE id = ?5 AND payment_status = 'paid' AND refund_id IS NULL",
        params![
            &update.refund_id,
            update.refund_amount_cents,
            &update.refund_reason,
            now,
            registrant_id
        ],
    )?;
    Ok(affected > 0)
}

// ============ Checkout drafts ============

/// How long a cached pre-admission draft stays redeemable.
pub const DRAFT_TTL_SECS: i64 = 24 * 3600;

pub fn create_checkout_draft(
    conn: &Connection,
    session_id: &str,
    tournament_id: &str,
    input: &RegistrantInput,
) -> Result<()> {
    let now = now();
    let payload = serde_json::to_string(input)?;
    conn.execute(
        "INSERT INTO checkout_drafts (session_id, tournament_id, payload, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![session_id, tournament_id, &payload, now, now + DRAFT_TTL_SECS],
    )?;
    Ok(())
}

/// Fetch an unexpired draft. Expired drafts are invisible here and get
/// removed by the cleanup task.
pub fn get_checkout_draft(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<(String, RegistrantInput)>> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT tournament_id, payload FROM checkout_drafts
             WHERE session_id = ?1 AND expires_at > ?2",
            params![session_id, now()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match row {
        Some((tournament_id, payload)) => {
            let input: RegistrantInput = serde_json::from_str(&payload)?;
            Ok(Some((tournament_id, input)))
        }
        None => Ok(None),
    }
}

pub fn delete_checkout_draft(conn: &Connection, session_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "DELETE FROM checkout_drafts WHERE session_id = ?1",
        params![session_id],
    )?;
    Ok(affected > 0)
}

pub fn purge_expired_drafts(conn: &Connection) -> Result<usize> {
    let affected = conn.execute(
        "DELETE FROM checkout_drafts WHERE expires_at <= ?1",
        params![now()],
    )?;
    Ok(affected)
}

// ============ Webhook events ============

/// Record a webhook event id. Returns false when the event was already
/// recorded, so redelivered events skip non-idempotent actions.
pub fn try_record_webhook_event(conn: &Connection, event_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO webhook_events (id, event_id, created_at) VALUES (?1, ?2, ?3)",
        params![gen_id(), event_id, now()],
    )?;
    Ok(affected > 0)
}

pub fn purge_old_webhook_events(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - retention_days * 86400;
    let affected = conn.execute(
        "DELETE FROM webhook_events WHERE created_at < ?1",
        params![cutoff],
    )?;
    Ok(affected)
}
