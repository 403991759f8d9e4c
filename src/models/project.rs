//! Project model and folder-name validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppError, Result};

/// Characters a project folder name may never contain.
const FORBIDDEN_FOLDER_CHARS: &[char] =
    &['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\0'];

/// Project domain entity: a named working-directory scope inside a chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Project {
    /// Unique record identifier.
    pub id: String,
    /// Chat the project belongs to.
    pub chat_id: String,
    /// Open ID of the creating user.
    pub creator_id: String,
    /// Display title.
    pub title: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Folder name under the base working directory.
    pub folder_name: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last activity timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Construct a new project with a generated identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `folder_name` fails validation.
    pub fn new(
        chat_id: String,
        creator_id: String,
        title: String,
        description: Option<String>,
        folder_name: String,
    ) -> Result<Self> {
        validate_folder_name(&folder_name)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            chat_id,
            creator_id,
            title,
            description,
            folder_name,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Validate a project folder name.
///
/// Rejects empty names, `.`/`..`, and names containing path separators,
/// Windows-reserved punctuation, or NUL.
///
/// # Errors
///
/// Returns `AppError::Config` describing the violation.
pub fn validate_folder_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AppError::Config("folder name must not be empty".into()));
    }
    if name == "." || name == ".." {
        return Err(AppError::Config(format!(
            "folder name '{name}' is reserved"
        )));
    }
    if let Some(bad) = name.chars().find(|c| FORBIDDEN_FOLDER_CHARS.contains(c)) {
        return Err(AppError::Config(format!(
            "folder name contains forbidden character {bad:?}"
        )));
    }
    Ok(())
}
