//! JWT claims.

use serde::{Deserialize, Serialize};

/// Claims carried by a huddle access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: String,

    /// Expiration time (as Unix timestamp).
    pub exp: i64,

    /// Issued at (as Unix timestamp).
    #[serde(default)]
    pub iat: Option<i64>,

    /// User's email.
    pub email: String,

    /// User's display name.
    #[serde(default)]
    pub name: Option<String>,
}

impl Claims {
    /// Display handle for chat: the name when set, the email otherwise.
    pub fn handle(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}
