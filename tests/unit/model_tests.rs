use lark_agent_gateway::models::plan::{PlanEntry, PlanPriority, PlanStatus};
use lark_agent_gateway::models::session::{Session, SessionStatus};

fn session() -> Session {
    Session::new(
        "oc_chat".into(),
        "om_root".into(),
        "ou_user".into(),
        "build me a parser".into(),
        "/ws".into(),
    )
}

#[test]
fn new_sessions_start_idle_with_default_mode() {
    let session = session();
    assert_eq!(session.status, SessionStatus::Idle);
    assert_eq!(session.mode, "default");
    assert!(session.acp_session_id.is_none());
    assert!(session.project_id.is_none());
}

#[test]
fn only_idle_running_transitions_are_legal() {
    let mut session = session();
    assert!(session.can_transition_to(SessionStatus::Running));
    assert!(!session.can_transition_to(SessionStatus::Idle));

    session.status = SessionStatus::Running;
    assert!(session.can_transition_to(SessionStatus::Idle));
    assert!(!session.can_transition_to(SessionStatus::Running));
}

#[test]
fn prompt_prefix_truncates_long_prompts() {
    let mut session = session();
    session.initial_prompt = "x".repeat(50);
    let prefix = session.prompt_prefix();
    assert_eq!(prefix.chars().count(), 31);
    assert!(prefix.ends_with('…'));

    session.initial_prompt = "short".into();
    assert_eq!(session.prompt_prefix(), "short");
}

#[test]
fn plan_glyphs_track_status() {
    let entry = |status| PlanEntry {
        content: "step".into(),
        priority: PlanPriority::Medium,
        status,
    };
    assert_eq!(entry(PlanStatus::Pending).status_glyph(), "\u{2610}");
    assert_eq!(entry(PlanStatus::InProgress).status_glyph(), "\u{25b6}");
    assert_eq!(entry(PlanStatus::Completed).status_glyph(), "\u{2611}");
}
