use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Registration is closed")]
    RegistrationClosed,

    #[error("Registrant is already paid")]
    AlreadyPaid,

    #[error("Registrant is already refunded")]
    AlreadyRefunded,

    #[error("Unknown checkout session")]
    UnknownSession,

    /// Gateway reports the payment has not completed yet. Valid outcome
    /// for a confirm call, mapped to 402 so the client can retry.
    #[error("Payment has not completed")]
    PaymentPending,

    /// Gateway communication failure. No local state was written, so the
    /// whole operation is safe to retry.
    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Payment gateway is not configured")]
    GatewayUnavailable,

    #[error("Invalid webhook signature")]
    SignatureInvalid,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone()))
            }
            AppError::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Validation failed",
                Some(msg.clone()),
            ),
            AppError::RegistrationClosed => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Registration is closed",
                None,
            ),
            AppError::AlreadyPaid => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Registrant is already paid",
                None,
            ),
            AppError::AlreadyRefunded => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Registrant is already refunded",
                None,
            ),
            AppError::UnknownSession => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Unknown checkout session",
                None,
            ),
            AppError::PaymentPending => (
                StatusCode::PAYMENT_REQUIRED,
                "Payment has not completed",
                None,
            ),
            AppError::Gateway(msg) => {
                tracing::error!("Gateway error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Payment gateway error", None)
            }
            AppError::GatewayUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Payment gateway is not configured",
                None,
            ),
            AppError::SignatureInvalid => {
                (StatusCode::BAD_REQUEST, "Invalid webhook signature", None)
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    None,
                )
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    None,
                )
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string()))
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Convert rejections from axum's own extractors into our error shape.
impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<axum::extract::rejection::PathRejection> for AppError {
    fn from(rejection: axum::extract::rejection::PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Shorthand for mapping `Ok(None)` lookups to `NotFound`.
pub trait OptionExt<T> {
    fn or_not_found(self, what: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Result<Option<T>> {
    fn or_not_found(self, what: &str) -> Result<T> {
        self?.ok_or_else(|| AppError::NotFound(what.to_string()))
    }
}
