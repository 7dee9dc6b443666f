use serde::{Deserialize, Serialize};

/// A capacity-limited event registrants pay to enter.
///
/// `capacity` is the total cap; `reserved_slots` are held back for
/// sponsors/committee, so the public-facing cap is
/// `capacity - reserved_slots`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tournament {
    pub id: String,
    pub name: String,
    pub capacity: i64,
    pub reserved_slots: i64,
    pub registration_open: bool,
    pub entry_fee_cents: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Tournament {
    pub fn public_capacity(&self) -> i64 {
        self.capacity - self.reserved_slots
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTournament {
    pub name: String,
    pub capacity: i64,
    #[serde(default)]
    pub reserved_slots: i64,
    pub entry_fee_cents: i64,
}
