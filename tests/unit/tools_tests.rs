use std::sync::Arc;

use lark_agent_gateway::acp::tools::{ToolDefinition, ToolHandler, ToolRegistry};
use lark_agent_gateway::AppError;
use serde_json::{json, Value};

fn echo_tool(name: &str) -> (ToolDefinition, ToolHandler) {
    (
        ToolDefinition {
            name: name.to_owned(),
            description: "echo".to_owned(),
            input_schema: json!({"type": "object"}),
        },
        Arc::new(|args| Box::pin(async move { Ok(json!({"echo": args})) })),
    )
}

#[tokio::test]
async fn listed_definitions_are_sorted_by_name() {
    let mut registry = ToolRegistry::new();
    for name in ["zeta", "alpha", "mid"] {
        let (def, handler) = echo_tool(name);
        registry.register(def, handler);
    }

    let names: Vec<String> = registry.list().into_iter().map(|def| def.name).collect();
    assert_eq!(names, vec!["alpha", "mid", "zeta"]);
}

#[tokio::test]
async fn call_dispatches_by_name() {
    let mut registry = ToolRegistry::new();
    let (def, handler) = echo_tool("echo");
    registry.register(def, handler);

    let result = registry
        .call("echo", json!({"x": 1}))
        .await
        .expect("call succeeds");
    assert_eq!(result["echo"]["x"], 1);
}

#[tokio::test]
async fn unknown_tool_is_not_found() {
    let registry = ToolRegistry::new();
    let err = registry.call("missing", Value::Null).await.expect_err("fails");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn re_registration_replaces_the_handler() {
    let mut registry = ToolRegistry::new();
    let (def, handler) = echo_tool("tool");
    registry.register(def, handler);

    let def = ToolDefinition {
        name: "tool".to_owned(),
        description: "v2".to_owned(),
        input_schema: json!({"type": "object"}),
    };
    registry.register(def, Arc::new(|_| Box::pin(async { Ok(json!("v2")) })));

    assert_eq!(registry.list().len(), 1);
    let result = registry.call("tool", Value::Null).await.expect("call");
    assert_eq!(result, json!("v2"));
}
