use std::sync::Arc;

use lark_agent_gateway::config::StreamConfig;
use lark_agent_gateway::lark::cards;
use lark_agent_gateway::orchestrator::stream::StreamManager;
use tokio::sync::Mutex;

use super::mock_lark::{test_active_session, RecordingLark};

fn manager(lark: &Arc<RecordingLark>) -> Arc<StreamManager> {
    Arc::new(StreamManager::new(
        Arc::clone(lark) as Arc<dyn lark_agent_gateway::lark::client::LarkApi>,
        StreamConfig::default(),
    ))
}

fn fast_manager(lark: &Arc<RecordingLark>) -> Arc<StreamManager> {
    Arc::new(StreamManager::new(
        Arc::clone(lark) as Arc<dyn lark_agent_gateway::lark::client::LarkApi>,
        StreamConfig {
            flush_interval_ms: 10,
            ..StreamConfig::default()
        },
    ))
}

#[tokio::test]
async fn first_flush_replaces_the_placeholder_in_place() {
    let lark = RecordingLark::new();
    let stream = manager(&lark);
    let handle = Arc::new(Mutex::new(test_active_session("s1")));

    {
        let mut active = handle.lock().await;
        stream
            .ensure_card(&mut active, "om_prompt")
            .await
            .expect("card created");
        stream.append_text(&handle, &mut active, "hello ");
        stream.append_text(&handle, &mut active, "world");
        stream.flush(&mut active).await.expect("flush");
    }

    // The first real flush writes into md_0 — no delete, no new element.
    let streams = lark.calls_named("stream_card_text").await;
    assert_eq!(streams.len(), 1);
    assert_eq!(
        streams[0].element_id.as_deref(),
        Some(cards::PLACEHOLDER_ELEMENT_ID)
    );
    assert_eq!(streams[0].text.as_deref(), Some("hello world"));
    assert!(lark.calls_named("delete_card_element").await.is_empty());
    assert!(lark.calls_named("add_card_elements").await.is_empty());
}

#[tokio::test]
async fn flush_is_a_noop_without_new_text() {
    let lark = RecordingLark::new();
    let stream = manager(&lark);
    let handle = Arc::new(Mutex::new(test_active_session("s1")));

    let mut active = handle.lock().await;
    stream
        .ensure_card(&mut active, "om_prompt")
        .await
        .expect("card created");
    stream.append_text(&handle, &mut active, "once");
    stream.flush(&mut active).await.expect("first flush");
    stream.flush(&mut active).await.expect("second flush");

    assert_eq!(lark.calls_named("stream_card_text").await.len(), 1);
}

#[tokio::test]
async fn tool_call_first_deletes_the_placeholder() {
    let lark = RecordingLark::new();
    let stream = manager(&lark);
    let handle = Arc::new(Mutex::new(test_active_session("s1")));

    let mut active = handle.lock().await;
    stream
        .ensure_card(&mut active, "om_prompt")
        .await
        .expect("card created");
    stream
        .insert_tool_element(&mut active, "tc_1", "read", "in_progress", "Read", "a.rs")
        .await
        .expect("tool inserted");

    let deletes = lark.calls_named("delete_card_element").await;
    assert_eq!(deletes.len(), 1);
    assert_eq!(
        deletes[0].element_id.as_deref(),
        Some(cards::PLACEHOLDER_ELEMENT_ID)
    );
    assert!(active.tool_call_elements.contains_key("tc_1"));
}

#[tokio::test]
async fn text_after_tool_call_opens_a_new_element() {
    let lark = RecordingLark::new();
    let stream = manager(&lark);
    let handle = Arc::new(Mutex::new(test_active_session("s1")));

    let mut active = handle.lock().await;
    stream
        .ensure_card(&mut active, "om_prompt")
        .await
        .expect("card created");

    stream.append_text(&handle, &mut active, "intro");
    stream.flush(&mut active).await.expect("flush intro");
    stream
        .insert_tool_element(&mut active, "tc_1", "search", "in_progress", "Search", "foo")
        .await
        .expect("tool inserted");
    stream.append_text(&handle, &mut active, "after tool");
    stream.flush(&mut active).await.expect("flush tail");

    // The tail flush targets a fresh md element and only carries the new
    // text, not the whole transcript.
    let streams = lark.calls_named("stream_card_text").await;
    assert_eq!(streams.len(), 2);
    let tail = &streams[1];
    assert_ne!(
        tail.element_id.as_deref(),
        Some(cards::PLACEHOLDER_ELEMENT_ID)
    );
    assert_eq!(tail.text.as_deref(), Some("after tool"));
}

#[tokio::test]
async fn sequences_are_strictly_monotonic_per_card() {
    let lark = RecordingLark::new();
    let stream = manager(&lark);
    let handle = Arc::new(Mutex::new(test_active_session("s1")));

    let mut active = handle.lock().await;
    stream
        .ensure_card(&mut active, "om_prompt")
        .await
        .expect("card created");
    stream.append_text(&handle, &mut active, "a");
    stream.flush(&mut active).await.expect("flush");
    stream
        .insert_tool_element(&mut active, "tc_1", "execute", "in_progress", "Run", "ls")
        .await
        .expect("insert");
    stream
        .patch_tool_element(&mut active, "tc_1", "completed", None)
        .await
        .expect("patch");
    stream.append_text(&handle, &mut active, "b");
    stream.flush(&mut active).await.expect("flush");
    stream.close(&mut active, "done").await.expect("close");

    lark.assert_monotonic_sequences().await;
}

#[tokio::test]
async fn close_marks_duration_and_leaves_streaming_mode() {
    let lark = RecordingLark::new();
    let stream = manager(&lark);
    let handle = Arc::new(Mutex::new(test_active_session("s1")));

    let mut active = handle.lock().await;
    stream
        .ensure_card(&mut active, "om_prompt")
        .await
        .expect("card created");
    stream.append_text(&handle, &mut active, "output");
    let message_id = stream.close(&mut active, "完成").await.expect("close");

    assert!(message_id.is_some());
    assert!(active.streaming_card.is_none());

    // Indicator replaced with the grey duration marker.
    let patches = lark.calls_named("patch_card_element").await;
    assert!(patches
        .iter()
        .any(|call| call.element_id.as_deref() == Some(cards::PROCESSING_ELEMENT_ID)));

    // Streaming mode left with the summary.
    let settings = lark.calls_named("update_card_settings").await;
    let last = settings.last().expect("settings patch");
    let payload = last.payload.as_ref().expect("payload");
    assert_eq!(payload["config"]["streaming_mode"], false);
    assert_eq!(payload["config"]["summary"]["content"], "完成");
}

#[tokio::test]
async fn scheduled_flush_fires_without_an_explicit_call() {
    let lark = RecordingLark::new();
    let stream = fast_manager(&lark);
    let handle = Arc::new(Mutex::new(test_active_session("s1")));

    {
        let mut active = handle.lock().await;
        stream
            .ensure_card(&mut active, "om_prompt")
            .await
            .expect("card created");
        stream.append_text(&handle, &mut active, "deferred");
    }

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let streams = lark.calls_named("stream_card_text").await;
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0].text.as_deref(), Some("deferred"));
}

#[tokio::test]
async fn pause_closes_streaming_with_a_summary() {
    let lark = RecordingLark::new();
    let stream = manager(&lark);
    let handle = Arc::new(Mutex::new(test_active_session("s1")));

    let mut active = handle.lock().await;
    stream
        .ensure_card(&mut active, "om_prompt")
        .await
        .expect("card created");
    stream
        .pause(
            &mut active,
            lark_agent_gateway::orchestrator::stream::WAITING_FOR_PERMISSION,
        )
        .await
        .expect("pause");

    let settings = lark.calls_named("update_card_settings").await;
    let last = settings.last().expect("settings patch");
    let payload = last.payload.as_ref().expect("payload");
    assert_eq!(payload["config"]["streaming_mode"], false);
    assert_eq!(payload["config"]["summary"]["content"], "(等待授权)");

    // The card stays; the next flush re-enables streaming mode.
    assert!(active.streaming_card.is_some());
    stream.append_text(&handle, &mut active, "resumed");
    stream.flush(&mut active).await.expect("flush");
    let reopened = lark.calls_named("update_card_settings").await;
    let payload = reopened.last().expect("reopen").payload.as_ref().expect("payload");
    assert_eq!(payload["config"]["streaming_mode"], true);
}

#[tokio::test]
async fn content_is_clamped_at_the_cap() {
    let lark = RecordingLark::new();
    let stream = Arc::new(StreamManager::new(
        Arc::clone(&lark) as Arc<dyn lark_agent_gateway::lark::client::LarkApi>,
        StreamConfig {
            max_content_length: 64,
            ..StreamConfig::default()
        },
    ));
    let handle = Arc::new(Mutex::new(test_active_session("s1")));

    let mut active = handle.lock().await;
    stream
        .ensure_card(&mut active, "om_prompt")
        .await
        .expect("card created");
    stream.append_text(&handle, &mut active, &"x".repeat(100));
    stream.append_text(&handle, &mut active, "ignored tail");
    stream.flush(&mut active).await.expect("flush");

    let streams = lark.calls_named("stream_card_text").await;
    assert_eq!(streams[0].text.as_ref().expect("text").len(), 64);
}
