use lark_agent_gateway::acp::sse::{backoff_delay, SseParser};
use std::time::Duration;

#[test]
fn parses_single_event() {
    let mut parser = SseParser::default();
    let events = parser.push(b"event: message\ndata: {\"jsonrpc\":\"2.0\"}\n\n");
    assert_eq!(events, vec!["{\"jsonrpc\":\"2.0\"}".to_owned()]);
}

#[test]
fn buffers_partial_chunks_across_pushes() {
    let mut parser = SseParser::default();
    assert!(parser.push(b"data: {\"a\":").is_empty());
    assert!(parser.push(b"1}\n").is_empty());
    let events = parser.push(b"\n");
    assert_eq!(events, vec!["{\"a\":1}".to_owned()]);
}

#[test]
fn joins_multi_line_data() {
    let mut parser = SseParser::default();
    let events = parser.push(b"data: line1\ndata: line2\n\n");
    assert_eq!(events, vec!["line1\nline2".to_owned()]);
}

#[test]
fn ignores_comments_and_ids() {
    let mut parser = SseParser::default();
    let events = parser.push(b": keepalive\nid: 42\ndata: {}\n\n");
    assert_eq!(events, vec!["{}".to_owned()]);
}

#[test]
fn handles_crlf_line_endings() {
    let mut parser = SseParser::default();
    let events = parser.push(b"data: {}\r\n\r\n");
    assert_eq!(events, vec!["{}".to_owned()]);
}

#[test]
fn multiple_events_in_one_chunk() {
    let mut parser = SseParser::default();
    let events = parser.push(b"data: 1\n\ndata: 2\n\n");
    assert_eq!(events, vec!["1".to_owned(), "2".to_owned()]);
}

#[test]
fn backoff_doubles_and_caps_at_thirty_seconds() {
    assert_eq!(backoff_delay(0), Duration::from_secs(1));
    assert_eq!(backoff_delay(1), Duration::from_secs(2));
    assert_eq!(backoff_delay(3), Duration::from_secs(8));
    assert_eq!(backoff_delay(5), Duration::from_secs(30));
    assert_eq!(backoff_delay(20), Duration::from_secs(30));
    assert_eq!(backoff_delay(u32::MAX), Duration::from_secs(30));
}
