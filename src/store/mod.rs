//! User and project storage.
//!
//! Storage is an injectable dependency: handlers talk to the [`UserStore`]
//! and [`ProjectStore`] traits, with a SQLite implementation for real
//! deployments and an in-memory one for tests and `--memory` mode.

mod memory;
mod models;
mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryStore;
pub use models::{Project, User, UserInfo};
pub use sqlite::SqliteStore;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} already exists")]
    Duplicate(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// User persistence.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create a user; fails with [`StoreError::Duplicate`] if the email is
    /// taken.
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User, StoreError>;

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn user_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;

    /// All users except `user_id` (the caller), ordered by email.
    async fn list_users_except(&self, user_id: &str) -> Result<Vec<User>, StoreError>;
}

/// Project persistence. The creating user becomes the first member.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn create_project(&self, name: &str, owner_id: &str) -> Result<Project, StoreError>;

    async fn project_by_id(&self, id: &str) -> Result<Option<Project>, StoreError>;

    async fn projects_for_user(&self, user_id: &str) -> Result<Vec<Project>, StoreError>;

    async fn project_members(&self, project_id: &str) -> Result<Vec<UserInfo>, StoreError>;

    /// Add users to a project. Unknown user ids fail with
    /// [`StoreError::NotFound`]; already-present members are ignored.
    async fn add_members(&self, project_id: &str, user_ids: &[String]) -> Result<(), StoreError>;

    async fn is_member(&self, project_id: &str, user_id: &str) -> Result<bool, StoreError>;
}
