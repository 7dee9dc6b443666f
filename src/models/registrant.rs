use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Capacity-gated admission decision for a registrant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionStatus {
    Confirmed,
    Waitlisted,
    Cancelled,
}

impl fmt::Display for AdmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AdmissionStatus::Confirmed => "confirmed",
            AdmissionStatus::Waitlisted => "waitlisted",
            AdmissionStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for AdmissionStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(AdmissionStatus::Confirmed),
            "waitlisted" => Ok(AdmissionStatus::Waitlisted),
            "cancelled" => Ok(AdmissionStatus::Cancelled),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Refunded,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

impl FromStr for PaymentStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "paid" => Ok(PaymentStatus::Paid),
            "refunded" => Ok(PaymentStatus::Refunded),
            _ => Err(()),
        }
    }
}

/// How the entry fee was (or will be) collected.
/// Manual covers cash/check entries recorded by an admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Gateway,
    Manual,
}

impl fmt::Display for PaymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentType::Gateway => "gateway",
            PaymentType::Manual => "manual",
        };
        f.write_str(s)
    }
}

impl FromStr for PaymentType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gateway" => Ok(PaymentType::Gateway),
            "manual" => Ok(PaymentType::Manual),
            _ => Err(()),
        }
    }
}

/// The paying entity admitted into a tournament.
///
/// Correlation fields link the row to the external gateway:
/// `checkout_session_id` is the handle both confirmation channels carry,
/// `payment_intent_id` is set when the row transitions to paid, and
/// `refund_id` when a refund completes. Card fields are diagnostic only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registrant {
    pub id: String,
    pub tournament_id: String,
    pub name: String,
    pub email: String,
    pub admission_status: AdmissionStatus,
    pub payment_status: PaymentStatus,
    pub payment_type: PaymentType,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub payment_amount_cents: Option<i64>,
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
    pub payment_note: Option<String>,
    pub refund_id: Option<String>,
    pub refund_amount_cents: Option<i64>,
    pub refund_reason: Option<String>,
    pub refunded_at: Option<i64>,
    pub group_id: Option<String>,
    pub group_slot: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Registrant data supplied at admission or checkout time.
/// Also serves as the draft payload cached for pre-admission checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrantInput {
    pub name: String,
    pub email: String,
    #[serde(default = "default_payment_type")]
    pub payment_type: PaymentType,
}

fn default_payment_type() -> PaymentType {
    PaymentType::Gateway
}

impl RegistrantInput {
    /// Basic field validation. Returns the offending problem as a message.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".into());
        }
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err("email is not valid".into());
        }
        Ok(())
    }
}

/// Fields written when a reconciliation transitions a registrant to paid.
#[derive(Debug, Clone)]
pub struct PaidUpdate {
    pub payment_intent_id: String,
    pub payment_amount_cents: Option<i64>,
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
    pub payment_note: String,
}

/// Fields written when a refund completes.
#[derive(Debug, Clone)]
pub struct RefundUpdate {
    pub refund_id: String,
    pub refund_amount_cents: Option<i64>,
    pub refund_reason: String,
}
