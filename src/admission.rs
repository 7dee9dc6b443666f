//! Capacity-gated admission.
//!
//! All admission decisions happen inside one immediate transaction per
//! tournament: the write lock is taken before the confirmed count is
//! read, so two concurrent admissions cannot both see the last open
//! slot. Registration is never refused on capacity grounds, the
//! overflow lands on the waitlist.

use rusqlite::{Connection, TransactionBehavior};

use crate::capacity::CapacityLedger;
use crate::db::queries;
use crate::error::{AppError, OptionExt, Result};
use crate::models::{Registrant, RegistrantInput, Tournament};

/// Admit a registrant into a tournament, deciding confirmed vs
/// waitlisted against the live confirmed count.
pub fn admit(
    conn: &mut Connection,
    tournament_id: &str,
    input: &RegistrantInput,
) -> Result<Registrant> {
    input.validate().map_err(AppError::Validation)?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let tournament =
        queries::get_tournament_by_id(&tx, tournament_id).or_not_found("tournament")?;

    // Re-checked under the lock: a close racing an admission loses.
    if !tournament.registration_open {
        return Err(AppError::RegistrationClosed);
    }

    let registrant = decide_and_insert(&tx, &tournament, input)?;
    tx.commit()?;

    tracing::info!(
        "Admitted registrant {} to tournament {} as {}",
        registrant.id,
        tournament_id,
        registrant.admission_status
    );
    Ok(registrant)
}

/// Admission body for draft materialization during reconciliation,
/// which already holds the write transaction. No `registration_open`
/// check here: the entry fee has been collected, and the open check
/// happened when the draft's session was created.
pub fn admit_in_tx(
    tx: &Connection,
    tournament_id: &str,
    input: &RegistrantInput,
) -> Result<Registrant> {
    let tournament =
        queries::get_tournament_by_id(tx, tournament_id).or_not_found("tournament")?;
    decide_and_insert(tx, &tournament, input)
}

fn decide_and_insert(
    tx: &Connection,
    tournament: &Tournament,
    input: &RegistrantInput,
) -> Result<Registrant> {
    let confirmed = queries::count_confirmed(tx, &tournament.id)?;
    let ledger = CapacityLedger::new(tournament.capacity, tournament.reserved_slots, confirmed);
    let status = ledger.decide();

    queries::insert_registrant(tx, &tournament.id, input, status)
}
