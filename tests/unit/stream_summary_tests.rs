use lark_agent_gateway::orchestrator::stream::{
    pause_summary, WAITING_FOR_INTERACTION, WAITING_FOR_PERMISSION,
};

#[test]
fn empty_text_falls_back_to_the_waiting_literal() {
    assert_eq!(pause_summary("", WAITING_FOR_PERMISSION), "(等待授权)");
    assert_eq!(pause_summary("   \n", WAITING_FOR_INTERACTION), "(等待操作)");
}

#[test]
fn short_text_is_used_verbatim() {
    assert_eq!(pause_summary("working on it", WAITING_FOR_PERMISSION), "working on it");
}

#[test]
fn long_text_is_truncated_to_one_hundred_chars() {
    let text = "字".repeat(150);
    let summary = pause_summary(&text, WAITING_FOR_PERMISSION);
    assert_eq!(summary.chars().count(), 101);
    assert!(summary.ends_with('…'));
}

#[test]
fn exactly_one_hundred_chars_is_not_truncated() {
    let text = "a".repeat(100);
    let summary = pause_summary(&text, WAITING_FOR_PERMISSION);
    assert_eq!(summary, text);
}
