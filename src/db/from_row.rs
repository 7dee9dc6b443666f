//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on corrupted data.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const TOURNAMENT_COLS: &str =
    "id, name, capacity, reserved_slots, registration_open, entry_fee_cents, created_at, updated_at";

pub const GROUP_COLS: &str = "id, tournament_id, name, created_at";

pub const REGISTRANT_COLS: &str = "id, tournament_id, name, email, admission_status, \
     payment_status, payment_type, checkout_session_id, payment_intent_id, \
     payment_amount_cents, card_brand, card_last4, payment_note, refund_id, \
     refund_amount_cents, refund_reason, refunded_at, group_id, group_slot, \
     created_at, updated_at";

// ============ FromRow Implementations ============

impl FromRow for Tournament {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Tournament {
            id: row.get(0)?,
            name: row.get(1)?,
            capacity: row.get(2)?,
            reserved_slots: row.get(3)?,
            registration_open: row.get::<_, i64>(4)? != 0,
            entry_fee_cents: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

impl FromRow for Group {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Group {
            id: row.get(0)?,
            tournament_id: row.get(1)?,
            name: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

impl FromRow for Registrant {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Registrant {
            id: row.get(0)?,
            tournament_id: row.get(1)?,
            name: row.get(2)?,
            email: row.get(3)?,
            admission_status: parse_enum(row, 4, "admission_status")?,
            payment_status: parse_enum(row, 5, "payment_status")?,
            payment_type: parse_enum(row, 6, "payment_type")?,
            checkout_session_id: row.get(7)?,
            payment_intent_id: row.get(8)?,
            payment_amount_cents: row.get(9)?,
            card_brand: row.get(10)?,
            card_last4: row.get(11)?,
            payment_note: row.get(12)?,
            refund_id: row.get(13)?,
            refund_amount_cents: row.get(14)?,
            refund_reason: row.get(15)?,
            refunded_at: row.get(16)?,
            group_id: row.get(17)?,
            group_slot: row.get(18)?,
            created_at: row.get(19)?,
            updated_at: row.get(20)?,
        })
    }
}
