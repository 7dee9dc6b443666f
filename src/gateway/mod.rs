//! Payment gateway collaborator.
//!
//! The gateway is a black-box capability: create a checkout session,
//! retrieve its status, look up payment diagnostics, create a refund.
//! Two backends exist - the real Stripe API and an in-process test
//! gateway with synthetic identifiers - and callers cannot observe
//! which one they are talking to.

mod stripe;

pub use stripe::StripeClient;
pub use test::TestGateway;

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Client-usable handle returned by session creation.
#[derive(Debug, Clone, Serialize)]
pub struct SessionHandle {
    pub id: String,
    pub url: String,
}

/// Gateway-reported truth about a checkout session.
#[derive(Debug, Clone, Serialize)]
pub struct GatewaySession {
    pub id: String,
    pub payment_status: String,
    pub amount_total: Option<i64>,
    pub payment_intent: Option<String>,
}

impl GatewaySession {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid" || self.payment_status == "no_payment_required"
    }
}

/// Card diagnostics, fetched opportunistically. A failed lookup leaves
/// the registrant's card fields null.
#[derive(Debug, Clone, Default)]
pub struct PaymentDiagnostics {
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GatewayRefund {
    pub id: String,
    pub amount_cents: Option<i64>,
}

/// Correlation metadata attached to a session at creation time, echoed
/// back in webhook payloads.
#[derive(Debug, Clone)]
pub struct SessionMetadata {
    pub tournament_id: String,
    pub registrant_id: Option<String>,
}

#[derive(Clone)]
pub enum PaymentGateway {
    Stripe(StripeClient),
    Test(TestGateway),
}

impl PaymentGateway {
    pub async fn create_checkout_session(
        &self,
        amount_cents: i64,
        metadata: &SessionMetadata,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<SessionHandle> {
        match self {
            PaymentGateway::Stripe(client) => {
                client
                    .create_checkout_session(amount_cents, metadata, success_url, cancel_url)
                    .await
            }
            PaymentGateway::Test(gateway) => {
                Ok(gateway.create_checkout_session(amount_cents, metadata))
            }
        }
    }

    pub async fn retrieve_session(&self, session_id: &str) -> Result<GatewaySession> {
        match self {
            PaymentGateway::Stripe(client) => client.retrieve_session(session_id).await,
            PaymentGateway::Test(gateway) => gateway.retrieve_session(session_id),
        }
    }

    pub async fn lookup_payment_intent(&self, intent_id: &str) -> Result<PaymentDiagnostics> {
        match self {
            PaymentGateway::Stripe(client) => client.lookup_payment_intent(intent_id).await,
            PaymentGateway::Test(gateway) => Ok(gateway.lookup_payment_intent(intent_id)),
        }
    }

    pub async fn create_refund(&self, intent_id: &str, reason: &str) -> Result<GatewayRefund> {
        match self {
            PaymentGateway::Stripe(client) => client.create_refund(intent_id, reason).await,
            PaymentGateway::Test(gateway) => gateway.create_refund(intent_id),
        }
    }
}

/// Maximum age of a webhook timestamp before it's rejected (seconds).
const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Verify a gateway webhook signature of the form `t=<ts>,v1=<hex hmac>`
/// over `"<ts>.<payload>"`, with a replay-protection window and a
/// constant-time digest comparison.
pub fn verify_webhook_signature(payload: &[u8], signature: &str, secret: &str) -> Result<bool> {
    let mut timestamp = None;
    let mut sig_v1 = None;

    for part in signature.split(',') {
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(s) = part.strip_prefix("v1=") {
            sig_v1 = Some(s);
        }
    }

    let timestamp_str = timestamp.ok_or(AppError::SignatureInvalid)?;
    let sig_v1 = sig_v1.ok_or(AppError::SignatureInvalid)?;

    let timestamp: i64 = timestamp_str
        .parse()
        .map_err(|_| AppError::SignatureInvalid)?;

    let age = chrono::Utc::now().timestamp() - timestamp;
    if age > WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
        tracing::warn!(
            "webhook rejected: timestamp too old (age={}s, max={}s)",
            age,
            WEBHOOK_TIMESTAMP_TOLERANCE_SECS
        );
        return Ok(false);
    }
    // Clock skew tolerance for timestamps from the future: 60 seconds.
    if age < -60 {
        tracing::warn!("webhook rejected: timestamp in the future (age={}s)", age);
        return Ok(false);
    }

    let expected = compute_signature(payload, timestamp_str, secret)?;

    let expected_bytes = expected.as_bytes();
    let provided_bytes = sig_v1.as_bytes();
    // Length is not secret (always 64 hex chars), so this check need not
    // be constant-time.
    if expected_bytes.len() != provided_bytes.len() {
        return Ok(false);
    }

    Ok(expected_bytes.ct_eq(provided_bytes).into())
}

/// Compute the hex HMAC for a timestamped payload. Public so tests and
/// local tooling can construct valid signature headers.
pub fn compute_signature(payload: &[u8], timestamp: &str, secret: &str) -> Result<String> {
    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("invalid webhook secret".into()))?;
    mac.update(signed_payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Build a complete `t=..,v1=..` header for a payload. Test helper.
pub fn sign_payload(payload: &[u8], secret: &str) -> Result<String> {
    let timestamp = chrono::Utc::now().timestamp().to_string();
    let sig = compute_signature(payload, &timestamp, secret)?;
    Ok(format!("t={},v1={}", timestamp, sig))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_verifies() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = sign_payload(payload, "whsec_test").unwrap();
        assert!(verify_webhook_signature(payload, &header, "whsec_test").unwrap());
    }

    #[test]
    fn wrong_secret_fails() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = sign_payload(payload, "whsec_test").unwrap();
        assert!(!verify_webhook_signature(payload, &header, "whsec_other").unwrap());
    }

    #[test]
    fn tampered_payload_fails() {
        let payload = br#"{"amount":100}"#;
        let header = sign_payload(payload, "whsec_test").unwrap();
        assert!(!verify_webhook_signature(br#"{"amount":999}"#, &header, "whsec_test").unwrap());
    }

    #[test]
    fn stale_timestamp_rejected() {
        let payload = b"{}";
        let old_ts = (chrono::Utc::now().timestamp() - 3600).to_string();
        let sig = compute_signature(payload, &old_ts, "whsec_test").unwrap();
        let header = format!("t={},v1={}", old_ts, sig);
        assert!(!verify_webhook_signature(payload, &header, "whsec_test").unwrap());
    }

    #[test]
    fn malformed_header_is_an_error() {
        let result = verify_webhook_signature(b"{}", "not-a-signature", "whsec_test");
        assert!(matches!(result, Err(AppError::SignatureInvalid)));
    }
}
