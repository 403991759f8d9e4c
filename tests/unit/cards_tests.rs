use lark_agent_gateway::acp::protocol::PermissionOption;
use lark_agent_gateway::lark::cards;
use serde_json::Value;

#[test]
fn streaming_card_has_placeholder_and_indicator() {
    let card = cards::streaming_card("");
    assert_eq!(card["config"]["streaming_mode"], true);

    let elements = card["body"]["elements"].as_array().expect("elements");
    assert_eq!(elements.len(), 2);
    assert_eq!(elements[0]["element_id"], cards::PLACEHOLDER_ELEMENT_ID);
    assert!(elements[0]["content"]
        .as_str()
        .expect("content")
        .contains("Pending..."));
    assert_eq!(elements[1]["element_id"], cards::PROCESSING_ELEMENT_ID);
}

#[test]
fn permission_card_buttons_carry_callback_values() {
    let options = vec![
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
    ];
    let card = cards::permission_card("s1", "Edit src/main.rs (edit)", &options);
    let json = card.to_string();

    assert!(json.contains("permission_select"));
    assert!(json.contains("\"session_id\":\"s1\""));
    assert!(json.contains("allow_once"));
    assert!(json.contains("reject_once"));
}

#[test]
fn tool_call_element_reflects_status_and_duration() {
    let pending = cards::tool_call_element("tool_1", "read", "in_progress", "Read", "a.rs", None);
    let content = pending["content"].as_str().expect("content");
    assert!(content.contains("📖"));
    assert!(content.contains("a.rs"));

    let done = cards::tool_call_element("tool_1", "read", "completed", "Read", "a.rs", Some(3));
    let content = done["content"].as_str().expect("content");
    assert!(content.contains("✅"));
    assert!(content.contains("3s"));

    let failed = cards::tool_call_element("tool_1", "execute", "failed", "Run", "", Some(2));
    let content = failed["content"].as_str().expect("content");
    assert!(content.contains("❌"));
    assert!(content.contains("red"));
}

#[test]
fn shell_footer_is_colored() {
    let footer = cards::shell_footer_element("md_9", "red", "0s · Exit: 1");
    let content = footer["content"].as_str().expect("content");
    assert!(content.contains("color='red'"));
    assert!(content.contains("0s · Exit: 1"));
}

#[test]
fn duration_marker_replaces_the_indicator_id() {
    let marker = cards::duration_marker(42);
    assert_eq!(marker["element_id"], cards::PROCESSING_ELEMENT_ID);
    assert!(marker["content"].as_str().expect("content").contains("42s"));
}

#[test]
fn streaming_settings_toggle() {
    let closed = cards::streaming_settings(false, "done");
    assert_eq!(closed["config"]["streaming_mode"], false);
    assert_eq!(closed["config"]["summary"]["content"], "done");

    let open = cards::streaming_settings(true, "");
    assert_eq!(open["config"]["streaming_mode"], true);
}

#[test]
fn cards_are_valid_json_objects() {
    let cards: Vec<Value> = vec![
        cards::text_card("hi"),
        cards::plan_card(&[]),
        cards::project_list_card(&[]),
        cards::session_list_card("会话", &[]),
    ];
    for card in cards {
        assert!(card.is_object());
        assert!(card["body"]["elements"].is_array());
    }
}
