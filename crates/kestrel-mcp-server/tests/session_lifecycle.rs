//! Session lifecycle, dispatch, and capability behaviour, exercised through
//! the same service seam the HTTP transport uses.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use kestrel_http_mcp_server::McpService;
use kestrel_mcp_json_rpc::{
    JsonRpcFrame, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};
use kestrel_mcp_protocol::{JsonSchema, LoggingLevel, McpResult, ToolSchema};
use kestrel_mcp_server::{
    AuthConfig, AuthContext, AuthError, CallToolResult, Frame, McpError, McpResource, McpServer,
    McpServerBuilder, McpTool, ResourceContents, TokenValidator, ToolContent,
};
use kestrel_mcp_session_storage::{InMemorySessionStorage, SessionStorage};

struct EchoTool {
    schema: ToolSchema,
}

impl EchoTool {
    fn new() -> Self {
        Self {
            schema: ToolSchema::object()
                .with_properties(HashMap::from([("text".to_string(), JsonSchema::string())]))
                .with_required(vec!["text".to_string()]),
        }
    }
}

#[async_trait]
impl McpTool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn input_schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn call(&self, args: Value, _frame: &mut Frame) -> McpResult<CallToolResult> {
        let text = args.get("text").and_then(Value::as_str).unwrap_or_default();
        Ok(CallToolResult::text(text))
    }
}

/// Declares an output schema its structured output violates on demand.
struct StructuredTool {
    input: ToolSchema,
    output: ToolSchema,
}

impl StructuredTool {
    fn new() -> Self {
        Self {
            input: ToolSchema::object(),
            output: ToolSchema::object()
                .with_properties(HashMap::from([(
                    "count".to_string(),
                    JsonSchema::integer(),
                )]))
                .with_required(vec!["count".to_string()]),
        }
    }
}

#[async_trait]
impl McpTool for StructuredTool {
    fn name(&self) -> &str {
        "structured"
    }

    fn input_schema(&self) -> &ToolSchema {
        &self.input
    }

    fn output_schema(&self) -> Option<&ToolSchema> {
        Some(&self.output)
    }

    async fn call(&self, args: Value, _frame: &mut Frame) -> McpResult<CallToolResult> {
        let valid = args.get("valid").and_then(Value::as_bool).unwrap_or(true);
        let structured = if valid {
            json!({"count": 3})
        } else {
            json!({"count": "three"})
        };
        Ok(CallToolResult::text("done").with_structured(structured))
    }
}

/// Requires the `write` scope.
struct WriteTool {
    schema: ToolSchema,
    scopes: Vec<String>,
}

impl WriteTool {
    fn new() -> Self {
        Self {
            schema: ToolSchema::object(),
            scopes: vec!["write".to_string()],
        }
    }
}

#[async_trait]
impl McpTool for WriteTool {
    fn name(&self) -> &str {
        "write_data"
    }

    fn input_schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn required_scopes(&self) -> &[String] {
        &self.scopes
    }

    async fn call(&self, _args: Value, _frame: &mut Frame) -> McpResult<CallToolResult> {
        Ok(CallToolResult::text("written"))
    }
}

/// Spins until cancelled, then returns.
struct WaitForCancelTool {
    schema: ToolSchema,
}

#[async_trait]
impl McpTool for WaitForCancelTool {
    fn name(&self) -> &str {
        "wait"
    }

    fn input_schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn call(&self, _args: Value, frame: &mut Frame) -> McpResult<CallToolResult> {
        for _ in 0..500 {
            if frame.is_cancelled() {
                return Ok(CallToolResult::text("interrupted"));
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(CallToolResult::text("completed"))
    }
}

/// Logs at two levels when called.
struct ChattyTool {
    schema: ToolSchema,
}

#[async_trait]
impl McpTool for ChattyTool {
    fn name(&self) -> &str {
        "chatty"
    }

    fn input_schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn call(&self, _args: Value, frame: &mut Frame) -> McpResult<CallToolResult> {
        frame
            .log(LoggingLevel::Info, Some("test"), json!("routine detail"))
            .await;
        frame
            .log(LoggingLevel::Error, Some("test"), json!("something failed"))
            .await;
        Ok(CallToolResult::text("chatted"))
    }
}

struct UserRecord;

#[async_trait]
impl McpResource for UserRecord {
    fn name(&self) -> &str {
        "user record"
    }

    fn uri_template(&self) -> Option<&str> {
        Some("db://users/{user_id}")
    }

    async fn read(
        &self,
        uri: &str,
        params: HashMap<String, String>,
        _frame: &mut Frame,
    ) -> McpResult<Vec<ResourceContents>> {
        let user_id = params
            .get("user_id")
            .ok_or_else(|| McpError::missing_param("user_id"))?;
        Ok(vec![ResourceContents::text(uri, format!("user {}", user_id))])
    }
}

struct StatusResource;

#[async_trait]
impl McpResource for StatusResource {
    fn name(&self) -> &str {
        "status"
    }

    fn uri(&self) -> Option<&str> {
        Some("memo://status")
    }

    async fn read(
        &self,
        uri: &str,
        _params: HashMap<String, String>,
        _frame: &mut Frame,
    ) -> McpResult<Vec<ResourceContents>> {
        Ok(vec![ResourceContents::text(uri, "all good")])
    }
}

struct TableValidator;

#[async_trait]
impl TokenValidator for TableValidator {
    async fn validate(&self, token: &str) -> Result<AuthContext, AuthError> {
        match token {
            "reader" => Ok(AuthContext::new("alice").with_scopes(["read"])),
            "writer" => Ok(AuthContext::new("bob").with_scopes(["read", "write"])),
            _ => Err(AuthError::Invalid),
        }
    }
}

fn build_server(storage: Arc<InMemorySessionStorage>) -> Arc<McpServer> {
    McpServerBuilder::new("test-server", "0.1.0")
        .storage(storage)
        .tool(EchoTool::new())
        .tool(StructuredTool::new())
        .tool(WriteTool::new())
        .tool(WaitForCancelTool {
            schema: ToolSchema::object(),
        })
        .tool(ChattyTool {
            schema: ToolSchema::object(),
        })
        .resource(UserRecord)
        .resource(StatusResource)
        .enable_logging()
        .enable_subscriptions()
        .authorization(AuthConfig {
            validator: Some(Arc::new(TableValidator)),
            realm: Some("mcp".to_string()),
            scopes_supported: vec!["read".to_string(), "write".to_string()],
            audience: None,
        })
        .build()
}

fn request(id: i64, method: &str, params: Value) -> JsonRpcFrame {
    JsonRpcRequest::with_value_params(RequestId::Number(id), method, params).into()
}

fn notification(method: &str, params: Value) -> JsonRpcFrame {
    JsonRpcNotification::with_value_params(method, params).into()
}

async fn call(server: &Arc<McpServer>, session: &str, frame: JsonRpcFrame) -> Option<Value> {
    let reply = server
        .handle_frame(session, frame, None)
        .await
        .expect("session reachable");
    reply.map(|frame| serde_json::to_value(frame).unwrap())
}

/// Run the full handshake; returns the session id.
async fn initialized_session(server: &Arc<McpServer>) -> String {
    initialized_session_with_capabilities(server, json!({})).await
}

async fn initialized_session_with_capabilities(
    server: &Arc<McpServer>,
    capabilities: Value,
) -> String {
    let session = server.resolve_session(true, None).await.unwrap();

    let reply = call(
        server,
        &session,
        request(
            1,
            "initialize",
            json!({
                "protocolVersion": "2025-06-18",
                "capabilities": capabilities,
                "clientInfo": {"name": "test-client", "version": "0.0.1"}
            }),
        ),
    )
    .await
    .expect("initialize replies");
    assert_eq!(reply["result"]["protocolVersion"], "2025-06-18");

    let none = call(
        server,
        &session,
        notification("notifications/initialized", json!({})),
    )
    .await;
    assert!(none.is_none());
    session
}

#[tokio::test]
async fn test_handshake_then_ping() {
    let server = build_server(Arc::new(InMemorySessionStorage::new()));
    let session = initialized_session(&server).await;

    let reply = call(&server, &session, request(2, "ping", json!({})))
        .await
        .unwrap();
    assert_eq!(reply["result"], json!({}));
}

#[tokio::test]
async fn test_version_mismatch_yields_invalid_params_and_blocks_ready() {
    let server = build_server(Arc::new(InMemorySessionStorage::new()));
    let session = server.resolve_session(true, None).await.unwrap();

    let reply = call(
        &server,
        &session,
        request(
            1,
            "initialize",
            json!({
                "protocolVersion": "1999-01-01",
                "capabilities": {},
                "clientInfo": {"name": "c", "version": "0"}
            }),
        ),
    )
    .await
    .unwrap();
    assert_eq!(reply["error"]["code"], -32602);
    assert!(
        reply["error"]["data"]["supported"]
            .as_array()
            .unwrap()
            .contains(&json!("2025-06-18"))
    );

    // Still uninitialized: normal methods are rejected, not dispatched.
    let reply = call(&server, &session, request(2, "ping", json!({})))
        .await
        .unwrap();
    assert_eq!(reply["error"]["code"], -32600);
}

#[tokio::test]
async fn test_requests_before_initialize_are_invalid() {
    let server = build_server(Arc::new(InMemorySessionStorage::new()));
    let session = server.resolve_session(true, None).await.unwrap();

    let reply = call(&server, &session, request(1, "tools/list", json!({})))
        .await
        .unwrap();
    assert_eq!(reply["error"]["code"], -32600);
}

#[tokio::test]
async fn test_second_initialize_is_rejected() {
    let server = build_server(Arc::new(InMemorySessionStorage::new()));
    let session = initialized_session(&server).await;

    let reply = call(
        &server,
        &session,
        request(
            9,
            "initialize",
            json!({
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "clientInfo": {"name": "c", "version": "0"}
            }),
        ),
    )
    .await
    .unwrap();
    assert_eq!(reply["error"]["code"], -32600);
}

#[tokio::test]
async fn test_tool_call_round_trip() {
    let server = build_server(Arc::new(InMemorySessionStorage::new()));
    let session = initialized_session(&server).await;

    let reply = call(
        &server,
        &session,
        request(2, "tools/call", json!({"name": "echo", "arguments": {"text": "hi"}})),
    )
    .await
    .unwrap();
    assert_eq!(reply["result"]["content"][0]["text"], "hi");
}

#[tokio::test]
async fn test_tool_input_validation_failure() {
    let server = build_server(Arc::new(InMemorySessionStorage::new()));
    let session = initialized_session(&server).await;

    let reply = call(
        &server,
        &session,
        request(2, "tools/call", json!({"name": "echo", "arguments": {}})),
    )
    .await
    .unwrap();
    assert_eq!(reply["error"]["code"], -32602);
    assert!(
        reply["error"]["data"]["errors"][0]
            .as_str()
            .unwrap()
            .contains("text")
    );
}

#[tokio::test]
async fn test_output_schema_violation_is_execution_error() {
    let server = build_server(Arc::new(InMemorySessionStorage::new()));
    let session = initialized_session(&server).await;

    let good = call(
        &server,
        &session,
        request(2, "tools/call", json!({"name": "structured", "arguments": {"valid": true}})),
    )
    .await
    .unwrap();
    assert_eq!(good["result"]["structuredContent"]["count"], 3);

    let bad = call(
        &server,
        &session,
        request(3, "tools/call", json!({"name": "structured", "arguments": {"valid": false}})),
    )
    .await
    .unwrap();
    assert_eq!(bad["error"]["code"], -32000);
    assert_eq!(bad["error"]["data"]["tool_name"], "structured");
}

#[tokio::test]
async fn test_capability_gate_blocks_unadvertised_methods() {
    let server = build_server(Arc::new(InMemorySessionStorage::new()));
    let session = initialized_session(&server).await;

    // No prompts registered, so prompts/* was never advertised.
    let reply = call(&server, &session, request(2, "prompts/list", json!({})))
        .await
        .unwrap();
    assert_eq!(reply["error"]["code"], -32601);
}

#[tokio::test]
async fn test_unknown_tool_is_method_not_found() {
    let server = build_server(Arc::new(InMemorySessionStorage::new()));
    let session = initialized_session(&server).await;

    let reply = call(
        &server,
        &session,
        request(2, "tools/call", json!({"name": "bogus", "arguments": {}})),
    )
    .await
    .unwrap();
    assert_eq!(reply["error"]["code"], -32601);
}

#[tokio::test]
async fn test_pagination_walk_is_complete_and_duplicate_free() {
    let storage = Arc::new(InMemorySessionStorage::new());
    let server = McpServerBuilder::new("paged", "0.1.0")
        .storage(storage)
        .pagination_limit(2)
        .tool(EchoTool::new())
        .tool(StructuredTool::new())
        .tool(WriteTool::new())
        .tool(WaitForCancelTool {
            schema: ToolSchema::object(),
        })
        .tool(ChattyTool {
            schema: ToolSchema::object(),
        })
        .build();
    let session = initialized_session(&server).await;

    let mut names = Vec::new();
    let mut cursor: Option<String> = None;
    let mut id = 10;
    loop {
        let params = match &cursor {
            Some(cursor) => json!({"cursor": cursor}),
            None => json!({}),
        };
        let reply = call(&server, &session, request(id, "tools/list", params))
            .await
            .unwrap();
        id += 1;

        for tool in reply["result"]["tools"].as_array().unwrap() {
            names.push(tool["name"].as_str().unwrap().to_string());
        }
        match reply["result"]["nextCursor"].as_str() {
            Some(next) => cursor = Some(next.to_string()),
            None => break,
        }
    }

    let mut unique = names.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(names.len(), 5);
    assert_eq!(unique.len(), 5);
    assert!(names.contains(&"echo".to_string()));
}

#[tokio::test]
async fn test_scoped_tool_requires_matching_scope() {
    let server = build_server(Arc::new(InMemorySessionStorage::new()));
    let session = initialized_session(&server).await;

    // No token at all.
    let reply = call(
        &server,
        &session,
        request(2, "tools/call", json!({"name": "write_data", "arguments": {}})),
    )
    .await
    .unwrap();
    assert_eq!(reply["error"]["code"], -32001);

    // Token with the wrong scope.
    let reply = server
        .handle_frame(
            &session,
            request(3, "tools/call", json!({"name": "write_data", "arguments": {}})),
            Some("reader"),
        )
        .await
        .unwrap()
        .map(|frame| serde_json::to_value(frame).unwrap())
        .unwrap();
    assert_eq!(reply["error"]["code"], -32001);
    assert!(
        reply["error"]["data"]["wwwAuthenticate"]
            .as_str()
            .unwrap()
            .contains("mcp")
    );

    // Token with the right scope.
    let reply = server
        .handle_frame(
            &session,
            request(4, "tools/call", json!({"name": "write_data", "arguments": {}})),
            Some("writer"),
        )
        .await
        .unwrap()
        .map(|frame| serde_json::to_value(frame).unwrap())
        .unwrap();
    assert_eq!(reply["result"]["content"][0]["text"], "written");
}

#[tokio::test]
async fn test_invalid_token_is_unauthorized() {
    let server = build_server(Arc::new(InMemorySessionStorage::new()));
    let session = initialized_session(&server).await;

    let reply = server
        .handle_frame(
            &session,
            request(2, "ping", json!({})),
            Some("forged"),
        )
        .await
        .unwrap()
        .map(|frame| serde_json::to_value(frame).unwrap())
        .unwrap();
    assert_eq!(reply["error"]["code"], -32001);
}

#[tokio::test]
async fn test_cancellation_suppresses_response() {
    let server = build_server(Arc::new(InMemorySessionStorage::new()));
    let session = initialized_session(&server).await;

    let server_for_call = server.clone();
    let session_for_call = session.clone();
    let in_flight = tokio::spawn(async move {
        server_for_call
            .handle_frame(
                &session_for_call,
                request(42, "tools/call", json!({"name": "wait", "arguments": {}})),
                None,
            )
            .await
    });

    // Let the handler start blocking the mailbox, then cancel it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let ack = server
        .handle_frame(
            &session,
            notification(
                "notifications/cancelled",
                json!({"requestId": 42, "reason": "cancelled"}),
            ),
            None,
        )
        .await
        .unwrap();
    assert!(ack.is_none());

    // No response frame is ever emitted for the cancelled id.
    let outcome = in_flight.await.unwrap().unwrap();
    assert!(outcome.is_none());
}

#[tokio::test]
async fn test_cancellation_before_dispatch_drops_request() {
    let server = build_server(Arc::new(InMemorySessionStorage::new()));
    let session = initialized_session(&server).await;

    let ack = server
        .handle_frame(
            &session,
            notification(
                "notifications/cancelled",
                json!({"requestId": 77, "reason": "cancelled"}),
            ),
            None,
        )
        .await
        .unwrap();
    assert!(ack.is_none());

    let outcome = call(
        &server,
        &session,
        request(77, "tools/call", json!({"name": "echo", "arguments": {"text": "x"}})),
    )
    .await;
    assert!(outcome.is_none());
}

#[tokio::test]
async fn test_log_level_filters_session_messages() {
    let storage = Arc::new(InMemorySessionStorage::new());
    let server = build_server(storage.clone());
    let session = initialized_session(&server).await;

    let reply = call(
        &server,
        &session,
        request(2, "logging/setLevel", json!({"level": "warning"})),
    )
    .await
    .unwrap();
    assert_eq!(reply["result"], json!({}));

    call(
        &server,
        &session,
        request(3, "tools/call", json!({"name": "chatty", "arguments": {}})),
    )
    .await
    .unwrap();

    let events = storage.events_after(&session, 0).await.unwrap();
    let logs: Vec<&Value> = events
        .iter()
        .map(|event| &event.data)
        .filter(|data| data["method"] == "notifications/message")
        .collect();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["params"]["level"], "error");
}

#[tokio::test]
async fn test_resource_read_exact_and_templated() {
    let server = build_server(Arc::new(InMemorySessionStorage::new()));
    let session = initialized_session(&server).await;

    let reply = call(
        &server,
        &session,
        request(2, "resources/read", json!({"uri": "memo://status"})),
    )
    .await
    .unwrap();
    assert_eq!(reply["result"]["contents"][0]["text"], "all good");

    let reply = call(
        &server,
        &session,
        request(3, "resources/read", json!({"uri": "db://users/42"})),
    )
    .await
    .unwrap();
    assert_eq!(reply["result"]["contents"][0]["text"], "user 42");

    let reply = call(
        &server,
        &session,
        request(4, "resources/read", json!({"uri": "db://groups/42"})),
    )
    .await
    .unwrap();
    assert_eq!(reply["error"]["code"], -32002);
}

#[tokio::test]
async fn test_subscribe_requires_known_resource() {
    let server = build_server(Arc::new(InMemorySessionStorage::new()));
    let session = initialized_session(&server).await;

    let reply = call(
        &server,
        &session,
        request(2, "resources/subscribe", json!({"uri": "memo://status"})),
    )
    .await
    .unwrap();
    assert_eq!(reply["result"], json!({}));

    let reply = call(
        &server,
        &session,
        request(3, "resources/subscribe", json!({"uri": "memo://nothing"})),
    )
    .await
    .unwrap();
    assert_eq!(reply["error"]["code"], -32002);
}

#[tokio::test]
async fn test_roots_request_round_trip() {
    let storage = Arc::new(InMemorySessionStorage::new());
    let server = build_server(storage.clone());
    let session =
        initialized_session_with_capabilities(&server, json!({"roots": {}})).await;

    let server_for_request = server.clone();
    let session_for_request = session.clone();
    let pending = tokio::spawn(async move {
        server_for_request
            .list_roots(&session_for_request, Duration::from_secs(2))
            .await
    });

    // The request frame must show up on the session's event log.
    let mut roots_request_id = None;
    for _ in 0..100 {
        let events = storage.events_after(&session, 0).await.unwrap();
        if let Some(event) = events
            .iter()
            .find(|event| event.data["method"] == "roots/list")
        {
            roots_request_id = event.data["id"].as_i64();
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let roots_request_id = roots_request_id.expect("roots/list emitted");

    // Client answers over POST; the session correlates by id.
    let reply = server
        .handle_frame(
            &session,
            JsonRpcResponse::new(
                RequestId::Number(roots_request_id),
                json!({"roots": [{"uri": "file:///workspace"}]}),
            )
            .into(),
            None,
        )
        .await
        .unwrap();
    assert!(reply.is_none());

    let roots = pending.await.unwrap().unwrap();
    assert_eq!(roots["roots"][0]["uri"], "file:///workspace");
}

#[tokio::test]
async fn test_roots_request_times_out_and_cancels() {
    let storage = Arc::new(InMemorySessionStorage::new());
    let server = build_server(storage.clone());
    let session =
        initialized_session_with_capabilities(&server, json!({"roots": {}})).await;

    let outcome = server
        .list_roots(&session, Duration::from_millis(100))
        .await;
    assert!(matches!(outcome, Err(McpError::Timeout)));

    // The abandonment is announced to the client.
    let mut cancelled = false;
    for _ in 0..100 {
        let events = storage.events_after(&session, 0).await.unwrap();
        if events
            .iter()
            .any(|event| event.data["method"] == "notifications/cancelled")
        {
            cancelled = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(cancelled);
}

#[tokio::test]
async fn test_sampling_gated_on_client_capability() {
    let server = build_server(Arc::new(InMemorySessionStorage::new()));
    // Client did not advertise sampling.
    let session = initialized_session(&server).await;

    let outcome = server
        .create_message(&session, json!({"messages": []}), Duration::from_secs(1))
        .await;
    assert!(matches!(outcome, Err(McpError::MethodNotFound { .. })));
}

#[tokio::test]
async fn test_session_eviction_after_ttl() {
    let storage = Arc::new(InMemorySessionStorage::new());
    let server = McpServerBuilder::new("short", "0.1.0")
        .storage(storage.clone())
        .session_ttl(0)
        .tool(EchoTool::new())
        .build();
    let session = initialized_session(&server).await;

    // TTL zero: anything older than "now" is expired.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let evicted = server.registry().evict_expired().await;
    assert!(evicted.contains(&session));
    assert!(!server.session_exists(&session).await);
}

#[tokio::test]
async fn test_terminated_session_rejects_frames() {
    let server = build_server(Arc::new(InMemorySessionStorage::new()));
    let session = initialized_session(&server).await;

    server.terminate_session(&session).await.unwrap();

    let outcome = server
        .handle_frame(&session, request(5, "ping", json!({})), None)
        .await;
    assert!(outcome.is_err());
    assert!(!server.session_exists(&session).await);
}

#[tokio::test]
async fn test_echo_via_tool_content() {
    // Round-trip law: a schema-valid payload reaches the tool handler as-is.
    let server = build_server(Arc::new(InMemorySessionStorage::new()));
    let session = initialized_session(&server).await;

    let reply = call(
        &server,
        &session,
        request(2, "tools/call", json!({"name": "echo", "arguments": {"text": "round trip"}})),
    )
    .await
    .unwrap();
    let content: Vec<ToolContent> =
        serde_json::from_value(reply["result"]["content"].clone()).unwrap();
    assert_eq!(content, vec![ToolContent::text("round trip")]);
}
