// Authorization middleware for operator routes

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::auth::{error::AuthError, models::Role, token::TokenService};
use crate::AppState;

/// Caller identity, inserted into request extensions once authorized
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: String,
    pub role: Role,
}

/// Extract the token from an `Authorization: Bearer ...` header
fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::InvalidToken)?
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidToken)
}

/// Validate the bearer token and check the role claim
pub fn authorize(
    tokens: &TokenService,
    headers: &HeaderMap,
    required: Role,
) -> Result<AuthenticatedUser, AuthError> {
    let claims = tokens.validate_token(bearer_token(headers)?)?;

    if claims.role != required {
        return Err(AuthError::InsufficientPermissions {
            required,
            actual: claims.role,
        });
    }

    Ok(AuthenticatedUser {
        user_id: claims.sub,
        email: claims.email,
        role: claims.role,
    })
}

/// Route layer admitting only operator tokens
pub async fn require_operator(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let endpoint = request.uri().path().to_string();

    let user = authorize(&state.tokens, request.headers(), Role::Operator).map_err(|e| {
        warn!("Authorization failed for {}: {}", endpoint, e);
        e
    })?;

    debug!("Authorized operator {} for {}", user.user_id, endpoint);
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
