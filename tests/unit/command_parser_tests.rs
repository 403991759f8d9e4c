use lark_agent_gateway::orchestrator::commands::{parse_command, ParsedCommand};

#[test]
fn plain_text_is_not_a_command() {
    assert_eq!(parse_command("write a hello world"), None);
    assert_eq!(parse_command("hello /world"), None);
    assert_eq!(parse_command("say !loudly"), None);
}

#[test]
fn empty_and_whitespace_are_not_commands() {
    assert_eq!(parse_command(""), None);
    assert_eq!(parse_command("   "), None);
    assert_eq!(parse_command("\n\t"), None);
}

#[test]
fn shell_command_takes_the_rest_verbatim() {
    match parse_command("! cargo test --all  ") {
        Some(ParsedCommand::Shell { command_line, raw }) => {
            assert_eq!(command_line, "cargo test --all");
            assert_eq!(raw, "! cargo test --all");
        }
        other => panic!("unexpected parse: {other:?}"),
    }
}

#[test]
fn leading_spaces_are_ignored() {
    match parse_command("   /Help") {
        Some(ParsedCommand::Slash { command, args, .. }) => {
            assert_eq!(command, "help");
            assert_eq!(args, "");
        }
        other => panic!("unexpected parse: {other:?}"),
    }
}

#[test]
fn slash_command_is_lowercased_with_args() {
    match parse_command("/Mode Bypass Permissions") {
        Some(ParsedCommand::Slash { command, args, .. }) => {
            assert_eq!(command, "mode");
            assert_eq!(args, "Bypass Permissions");
        }
        other => panic!("unexpected parse: {other:?}"),
    }
}

#[test]
fn bare_slash_yields_empty_command() {
    match parse_command("/") {
        Some(ParsedCommand::Slash { command, args, .. }) => {
            assert_eq!(command, "");
            assert_eq!(args, "");
        }
        other => panic!("unexpected parse: {other:?}"),
    }
}

#[test]
fn reparsing_raw_is_idempotent() {
    for input in [
        "/mode default",
        "  /LIST",
        "! false",
        "!echo '  spaced  '",
        "/project new my proj",
    ] {
        let first = parse_command(input).expect("parses");
        let raw = match &first {
            ParsedCommand::Shell { raw, .. } | ParsedCommand::Slash { raw, .. } => raw.clone(),
        };
        let second = parse_command(&raw).expect("reparses");
        assert_eq!(first, second, "not idempotent for {input:?}");
    }
}
