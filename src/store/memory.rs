//! In-memory store for tests and database-free mode.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use super::{Project, StoreError, User, UserInfo};

/// Store keeping everything in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: DashMap<String, User>,
    projects: DashMap<String, Project>,
    members: DashMap<String, HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl super::UserStore for MemoryStore {
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User, StoreError> {
        if self.users.iter().any(|u| u.email == email) {
            return Err(StoreError::Duplicate(format!("user {email}")));
        }

        let user = User {
            id: format!("usr_{}", nanoid::nanoid!(12)),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        self.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.email == email)
            .map(|u| u.clone()))
    }

    async fn user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(id).map(|u| u.clone()))
    }

    async fn list_users_except(&self, user_id: &str) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self
            .users
            .iter()
            .filter(|u| u.id != user_id)
            .map(|u| u.clone())
            .collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }
}

#[async_trait]
impl super::ProjectStore for MemoryStore {
    async fn create_project(&self, name: &str, owner_id: &str) -> Result<Project, StoreError> {
        let project = Project {
            id: format!("prj_{}", nanoid::nanoid!(12)),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.projects.insert(project.id.clone(), project.clone());
        self.members
            .entry(project.id.clone())
            .or_default()
            .insert(owner_id.to_string());
        Ok(project)
    }

    async fn project_by_id(&self, id: &str) -> Result<Option<Project>, StoreError> {
        Ok(self.projects.get(id).map(|p| p.clone()))
    }

    async fn projects_for_user(&self, user_id: &str) -> Result<Vec<Project>, StoreError> {
        let mut projects: Vec<Project> = self
            .members
            .iter()
            .filter(|entry| entry.value().contains(user_id))
            .filter_map(|entry| self.projects.get(entry.key()).map(|p| p.clone()))
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    async fn project_members(&self, project_id: &str) -> Result<Vec<UserInfo>, StoreError> {
        let Some(member_ids) = self.members.get(project_id) else {
            return Ok(Vec::new());
        };

        let mut members: Vec<UserInfo> = member_ids
            .iter()
            .filter_map(|id| self.users.get(id).map(|u| u.info()))
            .collect();
        members.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(members)
    }

    async fn add_members(&self, project_id: &str, user_ids: &[String]) -> Result<(), StoreError> {
        if !self.projects.contains_key(project_id) {
            return Err(StoreError::NotFound(format!("project {project_id}")));
        }
        for user_id in user_ids {
            if !self.users.contains_key(user_id) {
                return Err(StoreError::NotFound(format!("user {user_id}")));
            }
        }

        let mut members = self.members.entry(project_id.to_string()).or_default();
        for user_id in user_ids {
            members.insert(user_id.clone());
        }
        Ok(())
    }

    async fn is_member(&self, project_id: &str, user_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .members
            .get(project_id)
            .map(|m| m.contains(user_id))
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ProjectStore, UserStore};

    #[tokio::test]
    async fn test_memory_store_matches_sqlite_semantics() {
        let store = MemoryStore::new();

        let ana = store.create_user("ana@example.com", "h").await.unwrap();
        assert!(matches!(
            store.create_user("ana@example.com", "h").await,
            Err(StoreError::Duplicate(_))
        ));

        let project = store.create_project("apollo", &ana.id).await.unwrap();
        assert!(store.is_member(&project.id, &ana.id).await.unwrap());

        assert!(matches!(
            store.add_members(&project.id, &["usr_nope".to_string()]).await,
            Err(StoreError::NotFound(_))
        ));

        assert!(matches!(
            store.add_members("prj_nope", &[]).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
