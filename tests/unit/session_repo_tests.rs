use std::sync::Arc;

use lark_agent_gateway::models::session::{Session, SessionStatus};
use lark_agent_gateway::persistence::{db, session_repo::SessionRepo};
use lark_agent_gateway::AppError;

fn session(chat: &str, thread: &str) -> Session {
    Session::new(
        chat.into(),
        thread.into(),
        "ou_user".into(),
        "hello agent".into(),
        "/ws".into(),
    )
}

async fn repo() -> SessionRepo {
    let pool = db::connect_memory().await.expect("db connect");
    SessionRepo::new(Arc::new(pool))
}

#[tokio::test]
async fn create_and_fetch_roundtrip() {
    let repo = repo().await;
    let created = repo.create(&session("oc_1", "om_1")).await.expect("create");

    let fetched = repo
        .get_by_id(&created.id)
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(fetched.chat_id, "oc_1");
    assert_eq!(fetched.thread_id, "om_1");
    assert_eq!(fetched.status, SessionStatus::Idle);
    assert_eq!(fetched.initial_prompt, "hello agent");
}

#[tokio::test]
async fn get_by_id_returns_none_for_missing() {
    let repo = repo().await;
    assert!(repo.get_by_id("nope").await.expect("query").is_none());
}

#[tokio::test]
async fn status_roundtrip_idle_running_idle() {
    let repo = repo().await;
    let created = repo.create(&session("oc_1", "om_1")).await.expect("create");

    let running = repo
        .update_status(&created.id, SessionStatus::Running)
        .await
        .expect("to running");
    assert_eq!(running.status, SessionStatus::Running);

    let idle = repo
        .update_status(&created.id, SessionStatus::Idle)
        .await
        .expect("back to idle");
    assert_eq!(idle.status, SessionStatus::Idle);
}

#[tokio::test]
async fn repeated_transition_is_rejected() {
    let repo = repo().await;
    let created = repo.create(&session("oc_1", "om_1")).await.expect("create");

    let err = repo
        .update_status(&created.id, SessionStatus::Idle)
        .await
        .expect_err("idle -> idle is illegal");
    assert!(matches!(err, AppError::SessionState(_)));

    repo.update_status(&created.id, SessionStatus::Running)
        .await
        .expect("to running");
    let err = repo
        .update_status(&created.id, SessionStatus::Running)
        .await
        .expect_err("running -> running is illegal");
    assert!(matches!(err, AppError::SessionState(_)));
}

#[tokio::test]
async fn update_status_of_missing_session_is_not_found() {
    let repo = repo().await;
    let err = repo
        .update_status("ghost", SessionStatus::Running)
        .await
        .expect_err("missing session");
    assert!(matches!(err, AppError::SessionNotFound(_)));
}

#[tokio::test]
async fn thread_lookup_returns_most_recent() {
    let repo = repo().await;
    let first = repo.create(&session("oc_1", "om_t")).await.expect("create");
    let second = repo.create(&session("oc_1", "om_t")).await.expect("create");

    // Touch the second so it is strictly newer.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    repo.touch(&second.id).await.expect("touch");

    let found = repo
        .find_by_thread("om_t")
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(found.id, second.id);
    drop(first);
}

#[tokio::test]
async fn project_listing_is_recency_ordered() {
    let repo = repo().await;
    let mut a = session("oc_1", "om_a");
    a.project_id = Some("p1".into());
    let mut b = session("oc_1", "om_b");
    b.project_id = Some("p1".into());
    let a = repo.create(&a).await.expect("create a");
    let b = repo.create(&b).await.expect("create b");

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    repo.touch(&a.id).await.expect("touch");

    let listed = repo.list_by_project("p1").await.expect("list");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, a.id);
    assert_eq!(listed[1].id, b.id);

    let latest = repo
        .find_latest_in_project("p1")
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(latest.id, a.id);
}

#[tokio::test]
async fn acp_session_id_and_working_message_updates() {
    let repo = repo().await;
    let created = repo.create(&session("oc_1", "om_1")).await.expect("create");

    repo.set_acp_session_id(&created.id, "acp_42")
        .await
        .expect("set acp id");
    repo.set_working_message_id(&created.id, Some("om_card"))
        .await
        .expect("set working message");

    let fetched = repo
        .get_by_id(&created.id)
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(fetched.acp_session_id.as_deref(), Some("acp_42"));
    assert_eq!(fetched.working_message_id.as_deref(), Some("om_card"));

    repo.set_working_message_id(&created.id, None)
        .await
        .expect("clear working message");
    let cleared = repo
        .get_by_id(&created.id)
        .await
        .expect("query")
        .expect("exists");
    assert!(cleared.working_message_id.is_none());
}

#[tokio::test]
async fn project_binding_updates_working_dir() {
    let repo = repo().await;
    let created = repo.create(&session("oc_1", "om_1")).await.expect("create");

    repo.set_project(&created.id, Some("p9"), "/ws/p9")
        .await
        .expect("bind project");
    let bound = repo
        .get_by_id(&created.id)
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(bound.project_id.as_deref(), Some("p9"));
    assert_eq!(bound.working_dir, "/ws/p9");
}

#[tokio::test]
async fn delete_removes_the_row() {
    let repo = repo().await;
    let created = repo.create(&session("oc_1", "om_1")).await.expect("create");
    repo.delete(&created.id).await.expect("delete");
    assert!(repo.get_by_id(&created.id).await.expect("query").is_none());
}
