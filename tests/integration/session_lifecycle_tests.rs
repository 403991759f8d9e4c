use std::sync::Arc;

use lark_agent_gateway::models::session::{Session, SessionStatus};
use lark_agent_gateway::orchestrator::MSG_AGENT_BUSY;
use lark_agent_gateway::persistence::session_repo::SessionRepo;

use super::mock_lark::{build_gateway, text_message};

#[tokio::test]
async fn prompt_into_a_running_session_is_rejected_with_please_wait() {
    let gateway = build_gateway().await;
    let repo = SessionRepo::new(Arc::clone(&gateway.db));

    let session = Session::new(
        "oc_1".into(),
        "om_root".into(),
        "ou_user".into(),
        "first prompt".into(),
        gateway.base_dir.path().to_string_lossy().into_owned(),
    );
    let created = repo.create(&session).await.expect("create");
    repo.update_status(&created.id, SessionStatus::Running)
        .await
        .expect("mark running");

    // A reply into the session's thread while it is running.
    let mut message = text_message("evt_1", "om_2", "oc_1", "another prompt");
    message.root_id = Some("om_root".into());

    gateway
        .orchestrator
        .handle_message(message)
        .await
        .expect("handled");

    let replies = gateway.lark.calls_named("reply_text").await;
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].text.as_deref(), Some(MSG_AGENT_BUSY));

    // No second session was created for the thread.
    let found = repo
        .find_by_thread("om_root")
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(found.id, created.id);
}

#[tokio::test]
async fn delete_command_removes_the_thread_session() {
    let gateway = build_gateway().await;
    let repo = SessionRepo::new(Arc::clone(&gateway.db));

    let session = Session::new(
        "oc_1".into(),
        "om_root".into(),
        "ou_user".into(),
        "first prompt".into(),
        gateway.base_dir.path().to_string_lossy().into_owned(),
    );
    let created = repo.create(&session).await.expect("create");

    let mut message = text_message("evt_1", "om_2", "oc_1", "/delete");
    message.root_id = Some("om_root".into());
    gateway
        .orchestrator
        .handle_message(message)
        .await
        .expect("handled");

    assert!(repo.get_by_id(&created.id).await.expect("query").is_none());
    let replies = gateway.lark.calls_named("reply_text").await;
    assert!(replies[0].text.as_ref().expect("text").contains("已删除"));
}

#[tokio::test]
async fn stop_with_stale_running_status_settles_to_idle() {
    let gateway = build_gateway().await;
    let repo = SessionRepo::new(Arc::clone(&gateway.db));

    let session = Session::new(
        "oc_1".into(),
        "om_root".into(),
        "ou_user".into(),
        "first prompt".into(),
        gateway.base_dir.path().to_string_lossy().into_owned(),
    );
    let created = repo.create(&session).await.expect("create");
    repo.update_status(&created.id, SessionStatus::Running)
        .await
        .expect("mark running");

    // No live connection exists, so /stop settles the stale row.
    let mut message = text_message("evt_1", "om_2", "oc_1", "/stop");
    message.root_id = Some("om_root".into());
    gateway
        .orchestrator
        .handle_message(message)
        .await
        .expect("handled");

    let settled = repo
        .get_by_id(&created.id)
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(settled.status, SessionStatus::Idle);
}
