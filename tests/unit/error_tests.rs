use lark_agent_gateway::AppError;

#[test]
fn display_prefixes_identify_the_domain() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::Db("locked".into()), "db: locked"),
        (AppError::Lark("429".into()), "lark: 429"),
        (AppError::Acp("eof".into()), "acp: eof"),
        (AppError::Process("spawn".into()), "process: spawn"),
        (AppError::Shell("timeout".into()), "shell: timeout"),
        (
            AppError::SessionNotFound("s1".into()),
            "session not found: s1",
        ),
        (
            AppError::ProjectNotFound("p1".into()),
            "project not found: p1",
        ),
        (
            AppError::SessionState("idle -> idle".into()),
            "invalid session state: idle -> idle",
        ),
        (AppError::NotFound("x".into()), "not found: x"),
        (AppError::Io("eperm".into()), "io: eperm"),
    ];

    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn sqlx_errors_convert_to_db() {
    let err: AppError = sqlx::Error::RowNotFound.into();
    assert!(matches!(err, AppError::Db(_)));
}

#[test]
fn toml_errors_convert_to_config() {
    let parse_err = toml::from_str::<toml::Value>("not = = toml").unwrap_err();
    let err: AppError = parse_err.into();
    assert!(matches!(err, AppError::Config(_)));
}
