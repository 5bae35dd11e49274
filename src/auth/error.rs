// Authentication and authorization error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::auth::models::Role;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication token")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    /// Authenticated, but the role claim does not grant access
    #[error("Insufficient permissions: required role '{required}', but user has role '{actual}'")]
    InsufficientPermissions { required: Role, actual: Role },

    #[error("Token generation error: {0}")]
    TokenGenerationError(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingToken | AuthError::InvalidToken | AuthError::ExpiredToken => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::InsufficientPermissions { .. } => StatusCode::FORBIDDEN,
            AuthError::TokenGenerationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingToken | AuthError::InvalidToken | AuthError::ExpiredToken => {
                "UNAUTHORIZED"
            }
            AuthError::InsufficientPermissions { .. } => "FORBIDDEN",
            AuthError::TokenGenerationError(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to send to clients
    pub fn error_message(&self) -> String {
        match self {
            AuthError::InsufficientPermissions { required, .. } => {
                format!("Insufficient permissions: required role '{}'", required)
            }
            AuthError::TokenGenerationError(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            AuthError::TokenGenerationError(msg) => error!("Token generation error: {}", msg),
            other => warn!("Rejected request: {}", other),
        }

        let body = Json(json!({
            "error_code": self.error_code(),
            "message": self.error_message(),
            "timestamp": Utc::now().to_rfc3339(),
        }));

        (self.status_code(), body).into_response()
    }
}
