use lark_agent_gateway::acp::protocol::{PermissionOutcome, SessionUpdate};
use lark_agent_gateway::models::plan::{PlanPriority, PlanStatus};
use serde_json::json;

#[test]
fn parses_message_and_thought_chunks() {
    let message = json!({
        "sessionUpdate": "agent_message_chunk",
        "content": {"type": "text", "text": "hello"}
    });
    match SessionUpdate::from_value(&message) {
        SessionUpdate::AgentMessageChunk { text } => assert_eq!(text, "hello"),
        other => panic!("unexpected variant: {other:?}"),
    }

    let thought = json!({
        "sessionUpdate": "agent_thought_chunk",
        "content": {"type": "text", "text": "hmm"}
    });
    assert!(matches!(
        SessionUpdate::from_value(&thought),
        SessionUpdate::AgentThoughtChunk { .. }
    ));
}

#[test]
fn parses_tool_call_with_raw_input() {
    let value = json!({
        "sessionUpdate": "tool_call",
        "toolCallId": "tc_1",
        "title": "Read file",
        "kind": "read",
        "status": "in_progress",
        "rawInput": {"file_path": "/tmp/a.rs"}
    });
    match SessionUpdate::from_value(&value) {
        SessionUpdate::ToolCall(info) => {
            assert_eq!(info.tool_call_id, "tc_1");
            assert_eq!(info.kind, "read");
            assert_eq!(info.status, "in_progress");
            assert!(info.raw_input.is_some());
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn parses_tool_call_update_with_optional_fields() {
    let value = json!({
        "sessionUpdate": "tool_call_update",
        "toolCallId": "tc_1",
        "status": "completed"
    });
    match SessionUpdate::from_value(&value) {
        SessionUpdate::ToolCallUpdate(info) => {
            assert_eq!(info.tool_call_id, "tc_1");
            assert_eq!(info.status.as_deref(), Some("completed"));
            assert!(info.title.is_none());
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn parses_plan_with_priorities_and_defaults() {
    let value = json!({
        "sessionUpdate": "plan",
        "entries": [
            {"content": "a", "priority": "high", "status": "in_progress"},
            {"content": "b", "priority": "low", "status": "completed"},
            {"content": "c"}
        ]
    });
    match SessionUpdate::from_value(&value) {
        SessionUpdate::Plan(entries) => {
            assert_eq!(entries.len(), 3);
            assert_eq!(entries[0].priority, PlanPriority::High);
            assert_eq!(entries[0].status, PlanStatus::InProgress);
            assert_eq!(entries[1].status, PlanStatus::Completed);
            assert_eq!(entries[2].priority, PlanPriority::Medium);
            assert_eq!(entries[2].status, PlanStatus::Pending);
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn parses_mode_commands_and_config_updates() {
    let mode = json!({ "sessionUpdate": "current_mode_update", "currentModeId": "bypassPermissions" });
    match SessionUpdate::from_value(&mode) {
        SessionUpdate::CurrentModeUpdate { mode_id } => assert_eq!(mode_id, "bypassPermissions"),
        other => panic!("unexpected variant: {other:?}"),
    }

    let commands = json!({
        "sessionUpdate": "available_commands_update",
        "availableCommands": [ {"name": "review", "description": "review code"} ]
    });
    match SessionUpdate::from_value(&commands) {
        SessionUpdate::AvailableCommandsUpdate(list) => {
            assert_eq!(list.len(), 1);
            assert_eq!(list[0].name, "review");
        }
        other => panic!("unexpected variant: {other:?}"),
    }

    let config = json!({
        "sessionUpdate": "config_option_update",
        "configOptions": [ {"id": "thinking", "name": "Thinking", "values": []} ]
    });
    match SessionUpdate::from_value(&config) {
        SessionUpdate::ConfigOptionUpdate(options) => {
            assert_eq!(options.len(), 1);
            assert_eq!(options[0].id, "thinking");
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn unknown_updates_are_preserved_not_dropped() {
    let value = json!({"sessionUpdate": "something_new", "x": 1});
    match SessionUpdate::from_value(&value) {
        SessionUpdate::Unknown(raw) => assert_eq!(raw["x"], 1),
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn permission_outcome_wire_format() {
    let selected = PermissionOutcome::Selected {
        option_id: "allow".into(),
    };
    let json = serde_json::to_value(&selected).unwrap();
    assert_eq!(json["outcome"], "selected");
    assert_eq!(json["optionId"], "allow");

    let cancelled = serde_json::to_value(PermissionOutcome::Cancelled).unwrap();
    assert_eq!(cancelled["outcome"], "cancelled");
}
