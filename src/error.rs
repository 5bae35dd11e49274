// Crate-level error type for handlers outside the domain modules
// (health check and the unmatched-route fallback)

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error};

#[derive(Debug)]
pub enum ApiError {
    /// No route matched the request path
    NotFound { path: String },

    /// A dependency the service needs is unreachable
    ServiceUnavailable(String),
}

/// JSON body shared by every error response in the service
#[derive(Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "NOT_FOUND")
    pub error_code: String,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// RFC 3339 timestamp
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_code: &str, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.to_string(),
            message: message.into(),
            details: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn to_error_response(&self) -> ErrorResponse {
        match self {
            ApiError::NotFound { path } => {
                debug!("No route for {}", path);
                ErrorResponse::new("NOT_FOUND", format!("No route for {}", path))
            }
            ApiError::ServiceUnavailable(reason) => {
                // Reason is logged, never returned
                error!("Service unavailable: {}", reason);
                ErrorResponse::new("SERVICE_UNAVAILABLE", "A required dependency is unavailable")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_error_response())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::NotFound { path: "/nope".to_string() }.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::ServiceUnavailable("db down".to_string()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_unavailable_hides_reason() {
        let body = ApiError::ServiceUnavailable("password authentication failed".to_string())
            .to_error_response();
        assert_eq!(body.error_code, "SERVICE_UNAVAILABLE");
        assert!(!body.message.contains("password"));
    }
}
