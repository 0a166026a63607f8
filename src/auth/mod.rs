//! Authentication module.
//!
//! HS256 JWT issue/verify plus the axum middleware that turns a bearer
//! header, cookie, or `token` query parameter into a [`CurrentUser`].

mod claims;
mod error;
mod middleware;

pub use claims::Claims;
pub use error::AuthError;
pub use middleware::{AUTH_COOKIE, AuthState, CurrentUser, auth_middleware};
