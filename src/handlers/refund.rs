use axum::extract::State;
use serde::Deserialize;

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::{Json, Path};
use crate::models::Registrant;
use crate::refund;

#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    pub reason: Option<String>,
}

/// POST /registrants/{id}/refund
///
/// Refund the entry fee and release the registrant's slot. Gateway
/// payments go through the gateway first; a gateway failure leaves the
/// registrant paid and seated, and the call can be retried.
pub async fn refund_registrant(
    State(state): State<AppState>,
    Path(registrant_id): Path<String>,
    Json(req): Json<RefundRequest>,
) -> Result<Json<Registrant>> {
    let reason = req
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "requested_by_organizer".to_string());

    let refunded = refund::refund(&state, &registrant_id, &reason).await?;
    Ok(Json(refunded))
}
