use lark_agent_gateway::lark::events::ChatType;
use lark_agent_gateway::orchestrator::MSG_NO_SESSION;

use super::mock_lark::{build_gateway, text_message};

async fn session_count(db: &lark_agent_gateway::persistence::db::Database) -> i64 {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
        .fetch_one(db)
        .await
        .expect("count query");
    row.0
}

#[tokio::test]
async fn group_message_without_mention_is_ignored() {
    let gateway = build_gateway().await;

    let mut message = text_message("evt_1", "om_1", "oc_group", "do something");
    message.chat_type = ChatType::Group;
    message.mentions_bot = false;

    gateway
        .orchestrator
        .handle_message(message)
        .await
        .expect("handled");

    assert_eq!(session_count(&gateway.db).await, 0);
    assert!(gateway.lark.calls().await.is_empty(), "no IM traffic");
}

#[tokio::test]
async fn non_text_messages_are_ignored() {
    let gateway = build_gateway().await;

    let mut message = text_message("evt_1", "om_1", "oc_1", "ignored");
    message.message_type = "image".to_owned();

    gateway
        .orchestrator
        .handle_message(message)
        .await
        .expect("handled");

    assert_eq!(session_count(&gateway.db).await, 0);
    assert!(gateway.lark.calls().await.is_empty());
}

#[tokio::test]
async fn empty_text_is_ignored() {
    let gateway = build_gateway().await;

    let message = text_message("evt_1", "om_1", "oc_1", "   ");
    gateway
        .orchestrator
        .handle_message(message)
        .await
        .expect("handled");

    assert_eq!(session_count(&gateway.db).await, 0);
}

#[tokio::test]
async fn shell_without_session_reports_no_active_session() {
    let gateway = build_gateway().await;

    let message = text_message("evt_1", "om_1", "oc_1", "! echo hi");
    gateway
        .orchestrator
        .handle_message(message)
        .await
        .expect("handled");

    let replies = gateway.lark.calls_named("reply_text").await;
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].text.as_deref(), Some(MSG_NO_SESSION));
    assert_eq!(session_count(&gateway.db).await, 0);
}

#[tokio::test]
async fn help_replies_with_the_command_list() {
    let gateway = build_gateway().await;

    let message = text_message("evt_1", "om_1", "oc_1", "/help");
    gateway
        .orchestrator
        .handle_message(message)
        .await
        .expect("handled");

    let replies = gateway.lark.calls_named("reply_text").await;
    assert_eq!(replies.len(), 1);
    assert!(replies[0].text.as_ref().expect("text").contains("/mode"));
}

#[tokio::test]
async fn unknown_command_without_session_reports_no_session() {
    let gateway = build_gateway().await;

    // Commands beyond the session-free set need a session first.
    let message = text_message("evt_1", "om_1", "oc_1", "/frobnicate now");
    gateway
        .orchestrator
        .handle_message(message)
        .await
        .expect("handled");

    let replies = gateway.lark.calls_named("reply_text").await;
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].text.as_deref(), Some(MSG_NO_SESSION));
}

#[tokio::test]
async fn project_list_replies_with_a_card() {
    let gateway = build_gateway().await;

    let message = text_message("evt_1", "om_1", "oc_1", "/project list");
    gateway
        .orchestrator
        .handle_message(message)
        .await
        .expect("handled");

    assert_eq!(gateway.lark.calls_named("reply_card").await.len(), 1);
}
