// Error types for the provider webhook endpoint

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use thiserror::Error;

use crate::discounts::DiscountError;
use crate::stripe::SignatureError;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Missing stripe-signature header")]
    MissingSignature,

    #[error("Signature verification failed: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("Malformed webhook payload: {0}")]
    InvalidPayload(String),

    /// Recording failed; the provider should redeliver
    #[error(transparent)]
    Processing(#[from] DiscountError),
}

impl WebhookError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::MissingSignature
            | WebhookError::InvalidSignature(_)
            | WebhookError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            WebhookError::Processing(inner) => inner.status_code(),
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        match self {
            WebhookError::Processing(inner) => inner.into_response(),
            other => {
                tracing::warn!("Rejected webhook: {}", other);
                let error_code = match &other {
                    WebhookError::InvalidPayload(_) => "INVALID_PAYLOAD",
                    _ => "INVALID_SIGNATURE",
                };
                let body = Json(json!({
                    "error_code": error_code,
                    "message": other.to_string(),
                    "timestamp": Utc::now().to_rfc3339(),
                }));
                (other.status_code(), body).into_response()
            }
        }
    }
}
