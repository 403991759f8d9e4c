use lark_agent_gateway::config::GlobalConfig;

fn minimal_toml(base_dir: &str) -> String {
    format!(
        r#"
base_working_dir = "{base_dir}"

[lark]
app_id = "cli_test"
app_secret = "secret"

[agent]
command = "mock"
"#
    )
}

#[test]
fn parses_minimal_config_with_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = GlobalConfig::from_toml_str(&minimal_toml(&dir.path().to_string_lossy()))
        .expect("config parses");

    assert_eq!(config.stream.flush_interval_ms, 150);
    assert_eq!(config.stream.max_content_length, 100 * 1024);
    assert_eq!(config.stream.auto_close_ms, 600_000);
    assert_eq!(config.timeouts.permission_seconds, 300);
    assert_eq!(config.timeouts.shell_seconds, 300);
    assert!(config.agent.sse_url.is_none());
    assert!(config.prompt_commands.is_empty());
}

#[test]
fn db_path_derives_from_base_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = GlobalConfig::from_toml_str(&minimal_toml(&dir.path().to_string_lossy()))
        .expect("config parses");

    let db_path = config.db_path();
    assert!(db_path.starts_with(&config.base_working_dir));
    assert!(db_path.to_string_lossy().ends_with("gateway.db"));
}

#[test]
fn rejects_missing_credentials() {
    let dir = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        r#"
base_working_dir = "{}"

[lark]
app_id = ""
app_secret = ""

[agent]
command = "mock"
"#,
        dir.path().to_string_lossy()
    );
    assert!(GlobalConfig::from_toml_str(&toml).is_err());
}

#[test]
fn rejects_sse_url_without_send_url() {
    let dir = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        r#"
base_working_dir = "{}"

[lark]
app_id = "cli"
app_secret = "s"

[agent]
command = "mock"
sse_url = "https://example.com/events"
"#,
        dir.path().to_string_lossy()
    );
    assert!(GlobalConfig::from_toml_str(&toml).is_err());
}

#[test]
fn rejects_zero_flush_interval() {
    let dir = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        r#"
base_working_dir = "{}"

[lark]
app_id = "cli"
app_secret = "s"

[agent]
command = "mock"

[stream]
flush_interval_ms = 0
"#,
        dir.path().to_string_lossy()
    );
    assert!(GlobalConfig::from_toml_str(&toml).is_err());
}

#[test]
fn prompt_commands_are_read() {
    let dir = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        r#"
base_working_dir = "{}"

[lark]
app_id = "cli"
app_secret = "s"

[agent]
command = "mock"

[prompt_commands]
refactor = "Refactor the following: {{args}}"
"#,
        dir.path().to_string_lossy()
    );
    let config = GlobalConfig::from_toml_str(&toml).expect("config parses");
    assert_eq!(
        config.prompt_commands.get("refactor").map(String::as_str),
        Some("Refactor the following: {args}")
    );
}
