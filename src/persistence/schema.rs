//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS` — safe to
//! re-run on every server startup. Produces a convergent result.

use sqlx::SqlitePool;

use crate::Result;

/// Add a column to a table if it does not already exist.
///
/// Uses `PRAGMA table_info` to check column presence before issuing
/// `ALTER TABLE`, making the operation idempotent on repeated startups.
///
/// # Errors
///
/// Returns `AppError::Db` if the PRAGMA query or `ALTER TABLE` fails.
async fn add_column_if_missing(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    alter_sql: &str,
) -> Result<()> {
    let count: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM pragma_table_info('{table}') WHERE name = '{column}'"
    ))
    .fetch_one(pool)
    .await?;

    if count == 0 {
        sqlx::raw_sql(alter_sql).execute(pool).await?;
    }
    Ok(())
}

/// Apply column migrations for the `sessions` table.
///
/// # Errors
///
/// Returns `AppError::Db` if any check or migration fails.
async fn migrate_session_columns(pool: &SqlitePool) -> Result<()> {
    add_column_if_missing(
        pool,
        "sessions",
        "doc_token",
        "ALTER TABLE sessions ADD COLUMN doc_token TEXT",
    )
    .await?;

    add_column_if_missing(
        pool,
        "sessions",
        "working_message_id",
        "ALTER TABLE sessions ADD COLUMN working_message_id TEXT",
    )
    .await?;

    Ok(())
}

/// Apply all table definitions to the connected `SQLite` database.
///
/// Creates the three tables idempotently. Safe to call on every startup.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS sessions (
    id                  TEXT PRIMARY KEY NOT NULL,
    chat_id             TEXT NOT NULL,
    thread_id           TEXT NOT NULL,
    creator_id          TEXT NOT NULL,
    status              TEXT NOT NULL CHECK(status IN ('idle','running')),
    initial_prompt      TEXT NOT NULL,
    acp_session_id      TEXT,
    working_dir         TEXT NOT NULL,
    doc_token           TEXT,
    working_message_id  TEXT,
    mode                TEXT NOT NULL,
    project_id          TEXT,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_chat ON sessions(chat_id);
CREATE INDEX IF NOT EXISTS idx_sessions_thread ON sessions(thread_id);
CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project_id);

CREATE TABLE IF NOT EXISTS projects (
    id          TEXT PRIMARY KEY NOT NULL,
    chat_id     TEXT NOT NULL,
    creator_id  TEXT NOT NULL,
    title       TEXT NOT NULL,
    description TEXT,
    folder_name TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_projects_chat ON projects(chat_id);

CREATE TABLE IF NOT EXISTS processed_events (
    event_id     TEXT PRIMARY KEY NOT NULL,
    processed_at TEXT NOT NULL
);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    migrate_session_columns(pool).await?;
    Ok(())
}
