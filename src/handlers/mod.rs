mod checkout;
mod registration;
mod refund;
mod webhooks;

pub use checkout::*;
pub use registration::*;
pub use refund::*;
pub use webhooks::*;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::db::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/tournaments/{id}/register", post(register))
        .route("/checkout", post(create_checkout))
        .route("/checkout/confirm", post(confirm_checkout))
        .route("/checkout/session/{id}", get(get_checkout_session))
        .route("/registrants/{id}/refund", post(refund_registrant))
        .route("/webhooks/gateway", post(gateway_webhook))
}
