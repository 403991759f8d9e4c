use lark_agent_gateway::lark::events::{
    parse_card_action_event, parse_message_event, strip_mention_placeholders, ChatType,
};
use serde_json::json;

#[test]
fn strips_mention_placeholders() {
    assert_eq!(strip_mention_placeholders("@_user_1 hello"), "hello");
    assert_eq!(strip_mention_placeholders("hello @_user_12 world"), "hello  world");
    assert_eq!(strip_mention_placeholders("no mentions"), "no mentions");
}

#[test]
fn parses_group_message_with_mention() {
    let event = json!({
        "sender": { "sender_id": { "open_id": "ou_sender" } },
        "message": {
            "message_id": "om_1",
            "chat_id": "oc_1",
            "chat_type": "group",
            "message_type": "text",
            "content": "{\"text\": \"@_user_1 fix the bug\"}",
            "mentions": [ { "key": "@_user_1", "name": "bot" } ]
        }
    });

    let message = parse_message_event("evt_1", &event).expect("parses");
    assert_eq!(message.event_id, "evt_1");
    assert_eq!(message.sender_open_id, "ou_sender");
    assert_eq!(message.chat_type, ChatType::Group);
    assert!(message.mentions_bot);
    assert_eq!(message.text, "fix the bug");
    assert_eq!(message.thread_id(), "om_1");
}

#[test]
fn reply_root_becomes_the_thread_id() {
    let event = json!({
        "sender": { "sender_id": { "open_id": "ou_sender" } },
        "message": {
            "message_id": "om_2",
            "chat_id": "oc_1",
            "chat_type": "p2p",
            "message_type": "text",
            "content": "{\"text\": \"continue\"}",
            "root_id": "om_root"
        }
    });

    let message = parse_message_event("evt_2", &event).expect("parses");
    assert_eq!(message.root_id.as_deref(), Some("om_root"));
    assert_eq!(message.thread_id(), "om_root");
    assert!(!message.mentions_bot);
}

#[test]
fn missing_message_id_is_an_error() {
    let event = json!({
        "message": { "chat_id": "oc_1", "content": "{\"text\": \"x\"}" }
    });
    assert!(parse_message_event("evt", &event).is_err());
}

#[test]
fn parses_card_action_values_and_form() {
    let event = json!({
        "operator": { "open_id": "ou_clicker" },
        "context": { "open_message_id": "om_card", "open_chat_id": "oc_1" },
        "action": {
            "value": {
                "action": "permission_select",
                "session_id": "s1",
                "option_id": "allow_once"
            },
            "form_value": { "title": "My Project" }
        }
    });

    let action = parse_card_action_event("evt_3", &event).expect("parses");
    assert_eq!(action.action(), "permission_select");
    assert_eq!(action.value_str("session_id"), Some("s1"));
    assert_eq!(action.value_str("option_id"), Some("allow_once"));
    assert_eq!(action.form_str("title"), Some("My Project"));
    assert_eq!(action.operator_open_id, "ou_clicker");
    assert_eq!(action.open_message_id, "om_card");
}

#[test]
fn card_action_without_message_id_is_an_error() {
    let event = json!({ "action": { "value": { "action": "x" } } });
    assert!(parse_card_action_event("evt", &event).is_err());
}
