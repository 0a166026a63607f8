//! Storage entities.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A registered user.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Public view without the password hash.
    pub fn info(&self) -> UserInfo {
        UserInfo {
            id: self.id.clone(),
            email: self.email.clone(),
        }
    }
}

/// User shape exposed over the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct UserInfo {
    pub id: String,
    pub email: String,
}

/// A project. Its id doubles as the chat room name for project chat.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}
