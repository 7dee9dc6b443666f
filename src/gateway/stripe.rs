use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use crate::error::{AppError, Result};

use super::{GatewayRefund, GatewaySession, PaymentDiagnostics, SessionHandle, SessionMetadata};

const STRIPE_API: &str = "https://api.stripe.com/v1";

/// Per-call deadline; a timed-out call surfaces as a retryable gateway
/// error with no local state written.
const GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionResponse {
    id: String,
    url: Option<String>,
    payment_status: Option<String>,
    amount_total: Option<i64>,
    payment_intent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentResponse {
    latest_charge: Option<ChargeResponse>,
}

#[derive(Debug, Deserialize)]
struct ChargeResponse {
    payment_method_details: Option<PaymentMethodDetails>,
}

#[derive(Debug, Deserialize)]
struct PaymentMethodDetails {
    card: Option<CardDetails>,
}

#[derive(Debug, Deserialize)]
struct CardDetails {
    brand: Option<String>,
    last4: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
    amount: Option<i64>,
}

impl StripeClient {
    pub fn new(client: Client, secret_key: String) -> Self {
        Self { client, secret_key }
    }

    fn gateway_err(context: &str, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Gateway(format!("{}: timed out", context))
        } else {
            AppError::Gateway(format!("{}: {}", context, e))
        }
    }

    /// Create a checkout session with an ad-hoc price for the entry fee.
    /// The tournament (and registrant, when known up front) ride along as
    /// metadata so webhook events can be correlated even if the primary
    /// identifier is missing.
    pub async fn create_checkout_session(
        &self,
        amount_cents: i64,
        metadata: &SessionMetadata,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<SessionHandle> {
        let amount = amount_cents.to_string();
        let mut form: Vec<(&str, &str)> = vec![
            ("mode", "payment"),
            ("success_url", success_url),
            ("cancel_url", cancel_url),
            ("line_items[0][price_data][currency]", "usd"),
            ("line_items[0][price_data][product_data][name]", "Tournament entry"),
            ("line_items[0][price_data][unit_amount]", &amount),
            ("line_items[0][quantity]", "1"),
            ("metadata[tournament_id]", &metadata.tournament_id),
        ];
        if let Some(ref registrant_id) = metadata.registrant_id {
            form.push(("metadata[registrant_id]", registrant_id));
            // Mirrored onto the payment intent so intent-level events
            // can be correlated without a session lookup.
            form.push(("payment_intent_data[metadata][registrant_id]", registrant_id));
        }

        let response = self
            .client
            .post(format!("{}/checkout/sessions", STRIPE_API))
            .basic_auth(&self.secret_key, None::<&str>)
            .timeout(GATEWAY_TIMEOUT)
            .form(&form)
            .send()
            .await
            .map_err(|e| Self::gateway_err("create checkout session", e))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!(
                "create checkout session: {}",
                error_text
            )));
        }

        let session: CheckoutSessionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("parse checkout session: {}", e)))?;

        let url = session
            .url
            .ok_or_else(|| AppError::Gateway("checkout session has no url".into()))?;

        Ok(SessionHandle {
            id: session.id,
            url,
        })
    }

    pub async fn retrieve_session(&self, session_id: &str) -> Result<GatewaySession> {
        let response = self
            .client
            .get(format!("{}/checkout/sessions/{}", STRIPE_API, session_id))
            .basic_auth(&self.secret_key, None::<&str>)
            .timeout(GATEWAY_TIMEOUT)
            .send()
            .await
            .map_err(|e| Self::gateway_err("retrieve session", e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::UnknownSession);
        }
        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!("retrieve session: {}", error_text)));
        }

        let session: CheckoutSessionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("parse session: {}", e)))?;

        Ok(GatewaySession {
            id: session.id,
            payment_status: session.payment_status.unwrap_or_else(|| "unpaid".into()),
            amount_total: session.amount_total,
            payment_intent: session.payment_intent,
        })
    }

    /// Card diagnostics via the payment intent's latest charge. Callers
    /// treat failure as "no diagnostics", not as an error.
    pub async fn lookup_payment_intent(&self, intent_id: &str) -> Result<PaymentDiagnostics> {
        let response = self
            .client
            .get(format!("{}/payment_intents/{}", STRIPE_API, intent_id))
            .basic_auth(&self.secret_key, None::<&str>)
            .timeout(GATEWAY_TIMEOUT)
            .query(&[("expand[]", "latest_charge")])
            .send()
            .await
            .map_err(|e| Self::gateway_err("lookup payment intent", e))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!(
                "lookup payment intent: {}",
                error_text
            )));
        }

        let intent: PaymentIntentResponse = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("parse payment intent: {}", e)))?;

        let card = intent
            .latest_charge
            .and_then(|c| c.payment_method_details)
            .and_then(|d| d.card);

        Ok(match card {
            Some(card) => PaymentDiagnostics {
                card_brand: card.brand,
                card_last4: card.last4,
            },
            None => PaymentDiagnostics::default(),
        })
    }

    pub async fn create_refund(&self, intent_id: &str, reason: &str) -> Result<GatewayRefund> {
        let response = self
            .client
            .post(format!("{}/refunds", STRIPE_API))
            .basic_auth(&self.secret_key, None::<&str>)
            .timeout(GATEWAY_TIMEOUT)
            .form(&[
                ("payment_intent", intent_id),
                ("metadata[reason]", reason),
            ])
            .send()
            .await
            .map_err(|e| Self::gateway_err("create refund", e))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!("create refund: {}", error_text)));
        }

        let refund: RefundResponse = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("parse refund: {}", e)))?;

        Ok(GatewayRefund {
            id: refund.id,
            amount_cents: refund.amount,
        })
    }
}
