//! Persistence layer modules.

pub mod db;
pub mod event_repo;
pub mod project_repo;
pub mod retention;
pub mod schema;
pub mod session_repo;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;
