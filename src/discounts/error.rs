// Error types for the discount engine
// Covers rule validation, persistence, provider failures and ledger conflicts

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::stripe::ProviderError;

/// Main error type for discount selection, synchronization and recording
#[derive(Debug, Error)]
pub enum DiscountError {
    /// Request validation failed (missing fields, bad ranges)
    #[error("Validation failed: {0}")]
    ValidationError(String),

    /// Magnitude fields do not match the item key
    #[error("Invalid discount magnitude: {0}")]
    InvalidMagnitude(String),

    /// Item key exists but is not enabled for creation
    #[error("Item key {0} is not enabled")]
    ItemKeyDisabled(String),

    /// Referenced rule does not exist
    #[error("Discount rule not found: {0}")]
    RuleNotFound(Uuid),

    /// A redemption for the same month index was written concurrently
    #[error("Redemption ledger conflict: {0}")]
    LedgerConflict(String),

    /// Payment provider call failed
    #[error("Payment provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Database operation errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Result type alias for discount operations
pub type DiscountResult<T> = Result<T, DiscountError>;

impl From<validator::ValidationErrors> for DiscountError {
    fn from(err: validator::ValidationErrors) -> Self {
        DiscountError::ValidationError(err.to_string())
    }
}

impl DiscountError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DiscountError::ValidationError(_)
            | DiscountError::InvalidMagnitude(_)
            | DiscountError::ItemKeyDisabled(_) => StatusCode::BAD_REQUEST,
            DiscountError::RuleNotFound(_) => StatusCode::NOT_FOUND,
            DiscountError::LedgerConflict(_) => StatusCode::CONFLICT,
            DiscountError::Provider(_) => StatusCode::BAD_GATEWAY,
            DiscountError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            DiscountError::ValidationError(_) => "VALIDATION_ERROR",
            DiscountError::InvalidMagnitude(_) => "INVALID_MAGNITUDE",
            DiscountError::ItemKeyDisabled(_) => "ITEM_KEY_DISABLED",
            DiscountError::RuleNotFound(_) => "NOT_FOUND",
            DiscountError::LedgerConflict(_) => "LEDGER_CONFLICT",
            DiscountError::Provider(_) => "PROVIDER_ERROR",
            DiscountError::DatabaseError(_) => "DATABASE_ERROR",
        }
    }
}

impl IntoResponse for DiscountError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal details stay in the logs
        let message = match &self {
            DiscountError::DatabaseError(e) => {
                tracing::error!("Database error: {:?}", e);
                "A database error occurred".to_string()
            }
            DiscountError::Provider(e) => {
                tracing::error!("Payment provider error: {}", e);
                "The payment provider request failed".to_string()
            }
            DiscountError::LedgerConflict(msg) => {
                tracing::warn!("Ledger conflict: {}", msg);
                self.to_string()
            }
            _ => {
                tracing::debug!("Discount request rejected: {}", self);
                self.to_string()
            }
        };

        let body = Json(json!({
            "error_code": self.error_code(),
            "message": message,
            "timestamp": Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}
