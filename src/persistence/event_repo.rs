//! Processed-event deduplication records.
//!
//! Every inbound IM event carries an `event_id`; the first delivery wins
//! and repeats are acknowledged without side effects.

use std::sync::Arc;

use chrono::Utc;

use crate::Result;

use super::db::Database;

/// Repository for exactly-once IM event processing.
#[derive(Clone)]
pub struct EventRepo {
    db: Arc<Database>,
}

impl EventRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Record an event id, returning `true` if it was fresh.
    ///
    /// Uses `INSERT OR IGNORE` so the check and the insert are one atomic
    /// statement; a duplicate delivery observes zero affected rows.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn mark_processed(&self, event_id: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT OR IGNORE INTO processed_events (event_id, processed_at) VALUES (?1, ?2)",
        )
        .bind(event_id)
        .bind(&now)
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete records older than `max_age_seconds`.
    ///
    /// Returns the number of pruned rows.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn prune_older_than(&self, max_age_seconds: u64) -> Result<u64> {
        let age = i64::try_from(max_age_seconds).unwrap_or(i64::MAX);
        let cutoff = (Utc::now() - chrono::Duration::seconds(age)).to_rfc3339();

        let result = sqlx::query("DELETE FROM processed_events WHERE processed_at < ?1")
            .bind(&cutoff)
            .execute(self.db.as_ref())
            .await?;

        Ok(result.rows_affected())
    }
}
