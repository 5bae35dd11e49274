// Authentication module
// Operator tokens are issued by the identity provider; this service only
// validates them and enforces the role claim on admin routes.

pub mod error;
pub mod middleware;
pub mod models;
pub mod token;

pub use error::AuthError;
pub use middleware::{require_operator, AuthenticatedUser};
pub use models::{Claims, Role};
pub use token::TokenService;
