// JWT issuing and validation
//
// Tokens are HS256, signed with the shared `JWT_SECRET`.

use chrono::Utc;
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};

use crate::auth::error::AuthError;
use crate::auth::models::{Claims, Role};

/// Default token lifetime: 15 minutes
const ACCESS_TOKEN_TTL_SECS: i64 = 900;

pub struct TokenService {
    secret: SecretString,
    access_token_duration: i64,
}

impl TokenService {
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            access_token_duration: ACCESS_TOKEN_TTL_SECS,
        }
    }

    pub fn issue_token(&self, subject: &str, email: &str, role: Role) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            email: email.to_string(),
            role,
            iat: now,
            exp: now + self.access_token_duration,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.expose_secret().as_bytes()),
        )
        .map_err(|e| AuthError::TokenGenerationError(e.to_string()))
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.expose_secret().as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
            _ => AuthError::InvalidToken,
        })
    }
}
