//! Capacity ledger: pure admission arithmetic over tournament counters.
//!
//! No I/O here. Callers read the confirmed count under the tournament
//! lock and ask the ledger for the decision, so the count cannot drift
//! between read and insert.

use crate::models::AdmissionStatus;

/// Snapshot of a tournament's capacity at decision time.
#[derive(Debug, Clone, Copy)]
pub struct CapacityLedger {
    pub capacity: i64,
    pub reserved_slots: i64,
    pub confirmed: i64,
}

impl CapacityLedger {
    pub fn new(capacity: i64, reserved_slots: i64, confirmed: i64) -> Self {
        Self {
            capacity,
            reserved_slots,
            confirmed,
        }
    }

    /// The cap visible to public registration: total minus reserved.
    pub fn public_capacity(&self) -> i64 {
        (self.capacity - self.reserved_slots).max(0)
    }

    pub fn has_public_slot(&self) -> bool {
        self.confirmed < self.public_capacity()
    }

    /// Admission decision: confirm while a public slot remains, waitlist
    /// after. Registration is never refused on capacity grounds.
    pub fn decide(&self) -> AdmissionStatus {
        if self.has_public_slot() {
            AdmissionStatus::Confirmed
        } else {
            AdmissionStatus::Waitlisted
        }
    }
}
