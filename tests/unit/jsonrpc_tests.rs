use lark_agent_gateway::acp::jsonrpc::{IncomingMessage, JsonRpcClient};
use serde_json::json;
use tokio::sync::mpsc;

#[test]
fn classifies_incoming_messages() {
    let response: IncomingMessage =
        serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#).unwrap();
    assert!(response.is_response());
    assert!(!response.is_notification());
    assert!(!response.is_remote_call());

    let notification: IncomingMessage =
        serde_json::from_str(r#"{"jsonrpc":"2.0","method":"session/update","params":{}}"#).unwrap();
    assert!(notification.is_notification());
    assert!(!notification.is_response());

    let call: IncomingMessage = serde_json::from_str(
        r#"{"jsonrpc":"2.0","id":5,"method":"session/request_permission","params":{}}"#,
    )
    .unwrap();
    assert!(call.is_remote_call());
    assert!(!call.is_notification());
}

#[tokio::test]
async fn request_resolves_with_matching_response() {
    let (line_tx, mut outbound_rx) = mpsc::channel::<String>(8);
    let (inbound_tx, inbound_rx) = mpsc::channel::<String>(8);
    let client = JsonRpcClient::new(line_tx, inbound_rx);

    // Echo server: answer each request by id.
    tokio::spawn(async move {
        while let Some(line) = outbound_rx.recv().await {
            let msg: serde_json::Value = serde_json::from_str(&line).unwrap();
            if let Some(id) = msg.get("id").and_then(serde_json::Value::as_u64) {
                let reply = json!({"jsonrpc": "2.0", "id": id, "result": {"echo": msg["method"]}});
                if inbound_tx.send(reply.to_string()).await.is_err() {
                    break;
                }
            }
        }
    });

    let response = client
        .request("initialize", Some(json!({"protocolVersion": 1})))
        .await
        .expect("response arrives");
    let result = response.into_result().expect("success");
    assert_eq!(result["echo"], "initialize");
}

#[tokio::test]
async fn error_responses_surface_as_acp_errors() {
    let (line_tx, mut outbound_rx) = mpsc::channel::<String>(8);
    let (inbound_tx, inbound_rx) = mpsc::channel::<String>(8);
    let client = JsonRpcClient::new(line_tx, inbound_rx);

    tokio::spawn(async move {
        while let Some(line) = outbound_rx.recv().await {
            let msg: serde_json::Value = serde_json::from_str(&line).unwrap();
            if let Some(id) = msg.get("id").and_then(serde_json::Value::as_u64) {
                let reply = json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": -32601, "message": "unsupported"}
                });
                let _ = inbound_tx.send(reply.to_string()).await;
            }
        }
    });

    let response = client.request("bogus", None).await.expect("transport ok");
    let err = response.into_result().expect_err("error surfaces");
    assert!(err.to_string().contains("unsupported"));
}

#[tokio::test]
async fn transport_close_fails_pending_requests() {
    let (line_tx, outbound_rx) = mpsc::channel::<String>(8);
    let (inbound_tx, inbound_rx) = mpsc::channel::<String>(8);
    let client = JsonRpcClient::new(line_tx, inbound_rx);

    // Close the inbound side without ever answering.
    drop(inbound_tx);
    drop(outbound_rx);

    let err = client.request("initialize", None).await.expect_err("fails");
    assert!(matches!(err, lark_agent_gateway::AppError::Acp(_)));
}

#[tokio::test]
async fn notifications_and_calls_reach_the_incoming_channel() {
    let (line_tx, _outbound_rx) = mpsc::channel::<String>(8);
    let (inbound_tx, inbound_rx) = mpsc::channel::<String>(8);
    let client = JsonRpcClient::new(line_tx, inbound_rx);
    let mut incoming = client.take_incoming().expect("first take succeeds");
    assert!(client.take_incoming().is_none(), "second take is empty");

    inbound_tx
        .send(r#"{"jsonrpc":"2.0","method":"session/update","params":{"x":1}}"#.into())
        .await
        .unwrap();
    inbound_tx
        .send("not json at all".into())
        .await
        .unwrap();
    inbound_tx
        .send(r#"{"jsonrpc":"2.0","id":9,"method":"session/request_permission"}"#.into())
        .await
        .unwrap();

    let first = incoming.recv().await.expect("notification");
    assert_eq!(first.method.as_deref(), Some("session/update"));

    // The malformed line is skipped, not fatal.
    let second = incoming.recv().await.expect("remote call");
    assert!(second.is_remote_call());
}
