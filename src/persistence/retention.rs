//! Retention service for time-based data purge.
//!
//! Runs as a background task pruning processed-event records past the
//! configured maximum age, keeping the dedup table bounded.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::db::Database;
use super::event_repo::EventRepo;

const PURGE_INTERVAL: Duration = Duration::from_secs(600);

/// Spawn the processed-event purge background task.
///
/// The task ticks every ten minutes; each tick deletes dedup records older
/// than `event_max_age_seconds`.
#[must_use]
pub fn spawn_retention_task(
    db: Arc<Database>,
    event_max_age_seconds: u64,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let repo = EventRepo::new(db);
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("retention task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    match repo.prune_older_than(event_max_age_seconds).await {
                        Ok(pruned) if pruned > 0 => {
                            debug!(pruned, "pruned processed-event records");
                        }
                        Ok(_) => {}
                        Err(err) => {
                            error!(%err, "processed-event purge failed");
                        }
                    }
                }
            }
        }
    })
}
