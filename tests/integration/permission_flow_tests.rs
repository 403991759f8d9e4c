use std::sync::Arc;

use lark_agent_gateway::acp::protocol::{PermissionOption, PermissionOutcome};
use lark_agent_gateway::orchestrator::active::PendingPermission;
use lark_agent_gateway::orchestrator::permission::{describe_tool_call, resolve_permission};
use serde_json::json;
use tokio::sync::{oneshot, Mutex};

use super::mock_lark::{test_active_session, RecordingLark};

fn options() -> Vec<PermissionOption> {
    vec![
        PermissionOption {
            option_id: "allow_once".into(),
            name: "Allow".into(),
            kind: Some("allow_once".into()),
        },
        PermissionOption {
            option_id: "reject_once".into(),
            name: "Reject".into(),
            kind: Some("reject_once".into()),
        },
    ]
}

async fn register_pending(
    handle: &Arc<Mutex<lark_agent_gateway::orchestrator::active::ActiveSession>>,
    card_message_id: &str,
) -> oneshot::Receiver<PermissionOutcome> {
    let (tx, rx) = oneshot::channel();
    let timer = tokio::spawn(async {
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
    });
    handle.lock().await.permission_resolvers.insert(
        card_message_id.to_owned(),
        PendingPermission {
            tx,
            options: options(),
            tool_description: "Edit src/main.rs (edit)".to_owned(),
            timer,
        },
    );
    rx
}

#[tokio::test]
async fn click_resolves_exactly_once() {
    let lark = RecordingLark::new();
    let lark_api: Arc<dyn lark_agent_gateway::lark::client::LarkApi> = lark.clone();
    let handle = Arc::new(Mutex::new(test_active_session("s1")));
    let rx = register_pending(&handle, "om_perm").await;

    let first = resolve_permission(
        &lark_api,
        &handle,
        "om_perm",
        PermissionOutcome::Selected {
            option_id: "allow_once".into(),
        },
        true,
    )
    .await;
    assert!(first, "first resolution wins");

    // The agent-side future observes the selection.
    let outcome = rx.await.expect("outcome delivered");
    assert_eq!(
        outcome,
        PermissionOutcome::Selected {
            option_id: "allow_once".into()
        }
    );

    // A second resolution (late timer) is a no-op.
    let second = resolve_permission(
        &lark_api,
        &handle,
        "om_perm",
        PermissionOutcome::Cancelled,
        false,
    )
    .await;
    assert!(!second, "resolver was already removed");

    // The card was patched exactly once, to the chosen label.
    let patches = lark.calls_named("update_message_card").await;
    assert_eq!(patches.len(), 1);
    let payload = patches[0].payload.as_ref().expect("payload").to_string();
    assert!(payload.contains("Allow"));
    assert!(handle.lock().await.permission_resolvers.is_empty());
}

#[tokio::test]
async fn timeout_resolves_as_cancelled() {
    let lark = RecordingLark::new();
    let lark_api: Arc<dyn lark_agent_gateway::lark::client::LarkApi> = lark.clone();
    let handle = Arc::new(Mutex::new(test_active_session("s1")));
    let rx = register_pending(&handle, "om_perm").await;

    let resolved = resolve_permission(
        &lark_api,
        &handle,
        "om_perm",
        PermissionOutcome::Cancelled,
        false,
    )
    .await;
    assert!(resolved);
    assert_eq!(rx.await.expect("outcome"), PermissionOutcome::Cancelled);

    let patches = lark.calls_named("update_message_card").await;
    assert_eq!(patches.len(), 1);
    assert!(patches[0]
        .payload
        .as_ref()
        .expect("payload")
        .to_string()
        .contains("超时"));
}

#[tokio::test]
async fn unknown_card_resolution_is_a_noop() {
    let lark = RecordingLark::new();
    let lark_api: Arc<dyn lark_agent_gateway::lark::client::LarkApi> = lark.clone();
    let handle = Arc::new(Mutex::new(test_active_session("s1")));

    let resolved = resolve_permission(
        &lark_api,
        &handle,
        "om_ghost",
        PermissionOutcome::Cancelled,
        false,
    )
    .await;
    assert!(!resolved);
    assert!(lark.calls().await.is_empty());
}

#[test]
fn tool_descriptions_join_title_and_kind() {
    let full = json!({"title": "Edit src/main.rs", "kind": "edit"});
    assert_eq!(describe_tool_call(&full), "Edit src/main.rs (edit)");

    let title_only = json!({"title": "Run tests"});
    assert_eq!(describe_tool_call(&title_only), "Run tests");

    let empty = json!({});
    assert_eq!(describe_tool_call(&empty), "工具调用");
}
