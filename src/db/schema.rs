use rusqlite::Connection;

/// Initialize the database schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Tournaments (capacity-limited events)
        -- public cap = capacity - reserved_slots
        CREATE TABLE IF NOT EXISTS tournaments (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            capacity INTEGER NOT NULL,
            reserved_slots INTEGER NOT NULL DEFAULT 0,
            registration_open INTEGER NOT NULL DEFAULT 1,
            entry_fee_cents INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Playing groups (foursomes)
        CREATE TABLE IF NOT EXISTS groups (
            id TEXT PRIMARY KEY,
            tournament_id TEXT NOT NULL REFERENCES tournaments(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_groups_tournament ON groups(tournament_id);

        -- Registrants (the paying entities)
        -- checkout_session_id is the correlation handle both confirmation
        -- channels carry; re-issuing a session overwrites it and orphans
        -- the previous identifier.
        CREATE TABLE IF NOT EXISTS registrants (
            id TEXT PRIMARY KEY,
            tournament_id TEXT NOT NULL REFERENCES tournaments(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            admission_status TEXT NOT NULL CHECK (admission_status IN ('confirmed', 'waitlisted', 'cancelled')),
            payment_status TEXT NOT NULL DEFAULT 'unpaid' CHECK (payment_status IN ('unpaid', 'paid', 'refunded')),
            payment_type TEXT NOT NULL DEFAULT 'gateway' CHECK (payment_type IN ('gateway', 'manual')),
            checkout_session_id TEXT UNIQUE,
            payment_intent_id TEXT,
            payment_amount_cents INTEGER,
            card_brand TEXT,
            card_last4 TEXT,
            payment_note TEXT,
            refund_id TEXT UNIQUE,
            refund_amount_cents INTEGER,
            refund_reason TEXT,
            refunded_at INTEGER,
            group_id TEXT REFERENCES groups(id) ON DELETE SET NULL,
            group_slot INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_registrants_tournament ON registrants(tournament_id);
        CREATE INDEX IF NOT EXISTS idx_registrants_confirmed
            ON registrants(tournament_id) WHERE admission_status = 'confirmed';
        CREATE INDEX IF NOT EXISTS idx_registrants_intent ON registrants(payment_intent_id);
        CREATE INDEX IF NOT EXISTS idx_registrants_group ON registrants(group_id);

        -- Checkout drafts (pre-admission checkout: registrant payload cached
        -- for the lifetime of the gateway session, consumed exactly once)
        CREATE TABLE IF NOT EXISTS checkout_drafts (
            session_id TEXT PRIMARY KEY,
            tournament_id TEXT NOT NULL REFERENCES tournaments(id) ON DELETE CASCADE,
            payload TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_checkout_drafts_expires ON checkout_drafts(expires_at);

        -- Webhook events (redelivery dedup for non-idempotent actions)
        CREATE TABLE IF NOT EXISTS webhook_events (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}
