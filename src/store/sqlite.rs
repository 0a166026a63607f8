//! SQLite-backed store.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, instrument};

use super::{Project, StoreError, User, UserInfo};

/// Store backed by a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

fn generate_user_id() -> String {
    format!("usr_{}", nanoid::nanoid!(12))
}

fn generate_project_id() -> String {
    format!("prj_{}", nanoid::nanoid!(12))
}

/// SQLite reports unique-constraint violations as error code 2067/1555.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl SqliteStore {
    /// Open (or create) a database at `path` and run migrations.
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory: {}", parent.display()))?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .context("parsing database URL")?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("connecting to database")?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// In-memory database for tests.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("parsing in-memory database URL")?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("connecting to in-memory database")?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("running database migrations")?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl super::UserStore for SqliteStore {
    #[instrument(skip(self, password_hash))]
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        let id = generate_user_id();
        debug!("creating user {id} ({email})");

        sqlx::query("INSERT INTO users (id, email, password_hash, created_at) VALUES (?, ?, ?, ?)")
            .bind(&id)
            .bind(email)
            .bind(password_hash)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Duplicate(format!("user {email}"))
                } else {
                    StoreError::Database(e)
                }
            })?;

        self.user_by_id(&id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))
    }

    #[instrument(skip(self))]
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self))]
    async fn user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self))]
    async fn list_users_except(&self, user_id: &str) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, created_at FROM users WHERE id != ? ORDER BY email",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }
}

#[async_trait]
impl super::ProjectStore for SqliteStore {
    #[instrument(skip(self))]
    async fn create_project(&self, name: &str, owner_id: &str) -> Result<Project, StoreError> {
        let id = generate_project_id();
        debug!("creating project {id} ({name}) for {owner_id}");

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO projects (id, name, created_at) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(name)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO project_members (project_id, user_id, added_at) VALUES (?, ?, ?)",
        )
        .bind(&id)
        .bind(owner_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.project_by_id(&id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("project {id}")))
    }

    #[instrument(skip(self))]
    async fn project_by_id(&self, id: &str) -> Result<Option<Project>, StoreError> {
        let project = sqlx::query_as::<_, Project>(
            "SELECT id, name, created_at FROM projects WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(project)
    }

    #[instrument(skip(self))]
    async fn projects_for_user(&self, user_id: &str) -> Result<Vec<Project>, StoreError> {
        let projects = sqlx::query_as::<_, Project>(
            r#"
            SELECT p.id, p.name, p.created_at
            FROM projects p
            JOIN project_members m ON m.project_id = p.id
            WHERE m.user_id = ?
            ORDER BY p.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(projects)
    }

    #[instrument(skip(self))]
    async fn project_members(&self, project_id: &str) -> Result<Vec<UserInfo>, StoreError> {
        let members = sqlx::query_as::<_, UserInfo>(
            r#"
            SELECT u.id, u.email
            FROM users u
            JOIN project_members m ON m.user_id = u.id
            WHERE m.project_id = ?
            ORDER BY u.email
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(members)
    }

    #[instrument(skip(self))]
    async fn add_members(&self, project_id: &str, user_ids: &[String]) -> Result<(), StoreError> {
        if self.project_by_id(project_id).await?.is_none() {
            return Err(StoreError::NotFound(format!("project {project_id}")));
        }

        let mut tx = self.pool.begin().await?;

        for user_id in user_ids {
            let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
            if exists.is_none() {
                return Err(StoreError::NotFound(format!("user {user_id}")));
            }

            sqlx::query(
                "INSERT OR IGNORE INTO project_members (project_id, user_id, added_at) VALUES (?, ?, ?)",
            )
            .bind(project_id)
            .bind(user_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn is_member(&self, project_id: &str, user_id: &str) -> Result<bool, StoreError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM project_members WHERE project_id = ? AND user_id = ?",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ProjectStore, UserStore};

    #[tokio::test]
    async fn test_user_crud_against_sqlite() {
        let store = SqliteStore::in_memory().await.unwrap();

        let ana = store.create_user("ana@example.com", "hash-a").await.unwrap();
        assert!(ana.id.starts_with("usr_"));

        let found = store.user_by_email("ana@example.com").await.unwrap();
        assert_eq!(found.unwrap().id, ana.id);

        let duplicate = store.create_user("ana@example.com", "hash-b").await;
        assert!(matches!(duplicate, Err(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_project_membership() {
        let store = SqliteStore::in_memory().await.unwrap();

        let ana = store.create_user("ana@example.com", "h").await.unwrap();
        let bo = store.create_user("bo@example.com", "h").await.unwrap();
        let project = store.create_project("apollo", &ana.id).await.unwrap();

        assert!(store.is_member(&project.id, &ana.id).await.unwrap());
        assert!(!store.is_member(&project.id, &bo.id).await.unwrap());

        store
            .add_members(&project.id, &[bo.id.clone()])
            .await
            .unwrap();
        assert!(store.is_member(&project.id, &bo.id).await.unwrap());

        // Re-adding an existing member is a no-op.
        store
            .add_members(&project.id, &[bo.id.clone()])
            .await
            .unwrap();
        assert_eq!(store.project_members(&project.id).await.unwrap().len(), 2);

        let unknown = store
            .add_members(&project.id, &["usr_missing".to_string()])
            .await;
        assert!(matches!(unknown, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_on_disk_database() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(&dir.path().join("huddle.db")).await.unwrap();

        store.create_user("ana@example.com", "h").await.unwrap();
        let users = store.list_users_except("usr_other").await.unwrap();
        assert_eq!(users.len(), 1);
    }
}
