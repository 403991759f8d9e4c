use std::sync::Arc;

use lark_agent_gateway::lark::events::InboundEvent;

use super::mock_lark::{build_gateway, text_message};

#[tokio::test]
async fn duplicate_event_ids_are_processed_once() {
    let gateway = build_gateway().await;

    let event = InboundEvent::Message(text_message("evt_dup", "om_1", "oc_1", "/help"));

    Arc::clone(&gateway.orchestrator)
        .process_event(event.clone())
        .await;
    Arc::clone(&gateway.orchestrator)
        .process_event(event)
        .await;

    // One /help reply, not two: the second delivery was acknowledged
    // without side effects.
    assert_eq!(gateway.lark.calls_named("reply_text").await.len(), 1);
}

#[tokio::test]
async fn distinct_event_ids_are_both_processed() {
    let gateway = build_gateway().await;

    Arc::clone(&gateway.orchestrator)
        .process_event(InboundEvent::Message(text_message(
            "evt_a", "om_1", "oc_1", "/help",
        )))
        .await;
    Arc::clone(&gateway.orchestrator)
        .process_event(InboundEvent::Message(text_message(
            "evt_b", "om_2", "oc_1", "/help",
        )))
        .await;

    assert_eq!(gateway.lark.calls_named("reply_text").await.len(), 2);
}
