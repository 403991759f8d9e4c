use lark_agent_gateway::models::project::{validate_folder_name, Project};

#[test]
fn accepts_plain_names() {
    assert!(validate_folder_name("my-project").is_ok());
    assert!(validate_folder_name("proj_01").is_ok());
    assert!(validate_folder_name("深度重构").is_ok());
}

#[test]
fn rejects_empty_and_dot_names() {
    assert!(validate_folder_name("").is_err());
    assert!(validate_folder_name("   ").is_err());
    assert!(validate_folder_name(".").is_err());
    assert!(validate_folder_name("..").is_err());
}

#[test]
fn rejects_separators_and_reserved_characters() {
    for name in [
        "a/b", "a\\b", "a:b", "a*b", "a?b", "a\"b", "a<b", "a>b", "a|b", "a\0b",
    ] {
        assert!(validate_folder_name(name).is_err(), "{name:?} should fail");
    }
}

#[test]
fn project_constructor_validates_the_folder() {
    assert!(Project::new(
        "oc_chat".into(),
        "ou_user".into(),
        "Demo".into(),
        None,
        "bad/name".into(),
    )
    .is_err());

    let project = Project::new(
        "oc_chat".into(),
        "ou_user".into(),
        "Demo".into(),
        Some("a demo".into()),
        "demo".into(),
    )
    .expect("valid project");
    assert_eq!(project.chat_id, "oc_chat");
    assert_eq!(project.folder_name, "demo");
}
