use serde::{Deserialize, Serialize};

/// A playing group (foursome) registrants are slotted into.
/// A refunded or cancelled registrant must never hold a slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub tournament_id: String,
    pub name: String,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroup {
    pub name: String,
}
