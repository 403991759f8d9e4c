use std::sync::Arc;

use lark_agent_gateway::persistence::{db, event_repo::EventRepo};

async fn repo() -> EventRepo {
    let pool = db::connect_memory().await.expect("db connect");
    EventRepo::new(Arc::new(pool))
}

#[tokio::test]
async fn first_delivery_is_fresh_second_is_duplicate() {
    let repo = repo().await;
    assert!(repo.mark_processed("evt_1").await.expect("first"));
    assert!(!repo.mark_processed("evt_1").await.expect("second"));
    assert!(repo.mark_processed("evt_2").await.expect("other id"));
}

#[tokio::test]
async fn prune_removes_only_old_entries() {
    let repo = repo().await;
    repo.mark_processed("evt_now").await.expect("insert");

    // Nothing is older than an hour yet.
    let pruned = repo.prune_older_than(3600).await.expect("prune");
    assert_eq!(pruned, 0);

    // With a zero max age everything is stale.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let pruned = repo.prune_older_than(0).await.expect("prune all");
    assert_eq!(pruned, 1);

    // The id can be processed again after pruning.
    assert!(repo.mark_processed("evt_now").await.expect("reprocess"));
}
