use lark_agent_gateway::orchestrator::shell::{
    strip_ansi, OutputCap, ShellOutcome, SHELL_OUTPUT_CAP, TRUNCATION_MARKER,
};

#[test]
fn strips_color_and_cursor_sequences() {
    assert_eq!(strip_ansi("\x1b[31mred\x1b[0m"), "red");
    assert_eq!(strip_ansi("\x1b[1;32mbold green\x1b[m"), "bold green");
    assert_eq!(strip_ansi("plain"), "plain");
    assert_eq!(strip_ansi("\x1b[2K\x1b[1Gprogress 50%"), "progress 50%");
}

#[test]
fn strips_osc_title_sequences() {
    assert_eq!(strip_ansi("\x1b]0;window title\x07ls output"), "ls output");
}

#[test]
fn cap_admits_until_the_limit() {
    let mut cap = OutputCap::default();
    let chunk = "x".repeat(1024);
    for _ in 0..100 {
        assert_eq!(cap.admit(&chunk), Some(chunk.clone()));
    }
    // The cap is reached exactly; the next chunk carries only the marker.
    let over = cap.admit("y").expect("marker chunk");
    assert_eq!(over, format!("{TRUNCATION_MARKER}"));
    assert_eq!(cap.admit("z"), None);
}

#[test]
fn cap_clips_the_straddling_chunk_once() {
    let mut cap = OutputCap::default();
    let almost = "a".repeat(SHELL_OUTPUT_CAP - 10);
    assert!(cap.admit(&almost).is_some());

    let spill = cap.admit(&"b".repeat(100)).expect("clipped chunk");
    assert_eq!(spill, format!("{}{TRUNCATION_MARKER}", "b".repeat(10)));
    assert_eq!(cap.admit("more"), None);
}

#[test]
fn total_admitted_is_bounded() {
    let mut cap = OutputCap::default();
    let mut total = 0;
    for _ in 0..300 {
        if let Some(chunk) = cap.admit(&"x".repeat(1000)) {
            total += chunk.len();
        }
    }
    assert!(total <= SHELL_OUTPUT_CAP + TRUNCATION_MARKER.len());
}

#[test]
fn footer_text_and_colors_by_outcome() {
    let ok = ShellOutcome::Exited(0);
    assert_eq!(ok.color(), "green");
    assert_eq!(ok.footer_text(3), "3s · Exit: 0");
    assert_eq!(ok.summary(), "Completed successfully");

    let failed = ShellOutcome::Exited(1);
    assert_eq!(failed.color(), "red");
    assert_eq!(failed.footer_text(0), "0s · Exit: 1");
    assert_eq!(failed.summary(), "Failed (exit 1)");

    let signalled = ShellOutcome::Signalled("TERM".into());
    assert_eq!(signalled.color(), "orange");
    assert_eq!(signalled.footer_text(300), "300s · Signal: TERM");
    assert_eq!(signalled.summary(), "Terminated (TERM)");
}
