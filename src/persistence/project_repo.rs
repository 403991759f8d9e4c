//! Project repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::Utc;

use crate::models::project::{validate_folder_name, Project};
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for project records.
#[derive(Clone)]
pub struct ProjectRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: String,
    chat_id: String,
    creator_id: String,
    title: String,
    description: Option<String>,
    folder_name: String,
    created_at: String,
    updated_at: String,
}

impl ProjectRow {
    fn into_project(self) -> Result<Project> {
        let created_at = chrono::DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| AppError::Db(format!("invalid created_at: {e}")))?
            .with_timezone(&Utc);
        let updated_at = chrono::DateTime::parse_from_rfc3339(&self.updated_at)
            .map_err(|e| AppError::Db(format!("invalid updated_at: {e}")))?
            .with_timezone(&Utc);

        Ok(Project {
            id: self.id,
            chat_id: self.chat_id,
            creator_id: self.creator_id,
            title: self.title,
            description: self.description,
            folder_name: self.folder_name,
            created_at,
            updated_at,
        })
    }
}

impl ProjectRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new project record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the folder name is invalid and
    /// `AppError::Db` if the insert fails.
    pub async fn create(&self, project: &Project) -> Result<Project> {
        validate_folder_name(&project.folder_name)?;

        sqlx::query(
            "INSERT INTO projects (id, chat_id, creator_id, title, description, folder_name,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&project.id)
        .bind(&project.chat_id)
        .bind(&project.creator_id)
        .bind(&project.title)
        .bind(&project.description)
        .bind(&project.folder_name)
        .bind(project.created_at.to_rfc3339())
        .bind(project.updated_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;

        Ok(project.clone())
    }

    /// Retrieve a project by identifier.
    ///
    /// Returns `Ok(None)` if the project does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Project>> {
        let row: Option<ProjectRow> = sqlx::query_as("SELECT * FROM projects WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(ProjectRow::into_project).transpose()
    }

    /// List all projects in a chat, most recently touched first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_by_chat(&self, chat_id: &str) -> Result<Vec<Project>> {
        let rows: Vec<ProjectRow> = sqlx::query_as(
            "SELECT * FROM projects WHERE chat_id = ?1 ORDER BY updated_at DESC",
        )
        .bind(chat_id)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(ProjectRow::into_project).collect()
    }

    /// Update title, description, and folder name of a project.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the folder name is invalid and
    /// `AppError::Db` if the update fails.
    pub async fn update(
        &self,
        id: &str,
        title: &str,
        description: Option<&str>,
        folder_name: &str,
    ) -> Result<()> {
        validate_folder_name(folder_name)?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "UPDATE projects SET title = ?1, description = ?2, folder_name = ?3, updated_at = ?4
             WHERE id = ?5",
        )
        .bind(title)
        .bind(description)
        .bind(folder_name)
        .bind(&now)
        .bind(id)
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// Bump the `updated_at` timestamp.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn touch(&self, id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query("UPDATE projects SET updated_at = ?1 WHERE id = ?2")
            .bind(&now)
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        Ok(())
    }

    /// Delete a project row.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM projects WHERE id = ?1")
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        Ok(())
    }
}
