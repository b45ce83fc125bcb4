//! Routing behaviour of the single MCP endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use serde_json::{Value, json};
use tokio::sync::Mutex;

use kestrel_http_mcp_server::{
    McpHttpHandler, McpService, ServerConfig, ServiceError, StreamManager,
};
use kestrel_mcp_json_rpc::{JsonRpcFrame, JsonRpcResponse};
use kestrel_mcp_session_storage::{InMemorySessionStorage, SessionSnapshot, SessionStorage};

/// Echo service: answers every request with `{"echoed": <method>}` and
/// records terminations.
struct EchoService {
    storage: Arc<InMemorySessionStorage>,
    terminated: Mutex<Vec<String>>,
}

impl EchoService {
    fn new(storage: Arc<InMemorySessionStorage>) -> Self {
        Self {
            storage,
            terminated: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl McpService for EchoService {
    async fn resolve_session(
        &self,
        contains_initialize: bool,
        header_session_id: Option<&str>,
    ) -> Result<String, ServiceError> {
        match header_session_id {
            Some(id) => {
                if self.storage.load(id).await.unwrap().found().is_none() {
                    return Err(ServiceError::UnknownSession(id.to_string()));
                }
                Ok(id.to_string())
            }
            None if contains_initialize => {
                let snapshot = SessionSnapshot::new(1800);
                let id = snapshot.session_id.clone();
                self.storage.save(snapshot).await.unwrap();
                Ok(id)
            }
            None => Err(ServiceError::Internal("no session".to_string())),
        }
    }

    async fn handle_frame(
        &self,
        _session_id: &str,
        frame: JsonRpcFrame,
        _bearer_token: Option<&str>,
    ) -> Result<Option<JsonRpcFrame>, ServiceError> {
        match frame {
            JsonRpcFrame::Request(request) => Ok(Some(
                JsonRpcResponse::new(request.id, json!({"echoed": request.method})).into(),
            )),
            _ => Ok(None),
        }
    }

    async fn session_exists(&self, session_id: &str) -> bool {
        self.storage.load(session_id).await.unwrap().found().is_some()
    }

    async fn terminate_session(&self, session_id: &str) -> Result<(), ServiceError> {
        self.storage.delete(session_id).await.unwrap();
        self.terminated.lock().await.push(session_id.to_string());
        Ok(())
    }
}

struct Fixture {
    handler: McpHttpHandler,
    storage: Arc<InMemorySessionStorage>,
    stream_manager: Arc<StreamManager>,
}

fn fixture() -> Fixture {
    let storage = Arc::new(InMemorySessionStorage::new());
    let stream_manager = Arc::new(StreamManager::new(storage.clone()));
    let service = Arc::new(EchoService::new(storage.clone()));
    let handler = McpHttpHandler::new(
        Arc::new(ServerConfig::default()),
        service,
        stream_manager.clone(),
    );
    Fixture {
        handler,
        storage,
        stream_manager,
    }
}

async fn seeded_session(storage: &InMemorySessionStorage) -> String {
    let snapshot = SessionSnapshot::new(1800);
    let id = snapshot.session_id.clone();
    storage.save(snapshot).await.unwrap();
    id
}

fn post(body: Value, session: Option<&str>, accept: &str) -> Request<Full<Bytes>> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/mcp")
        .header("accept", accept)
        .header("content-type", "application/json");
    if let Some(session) = session {
        builder = builder.header("mcp-session-id", session);
    }
    builder.body(Full::new(Bytes::from(body.to_string()))).unwrap()
}

async fn body_json(
    response: http::Response<kestrel_http_mcp_server::BoxBody>,
) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_post_request_inline_json() {
    let fixture = fixture();
    let session = seeded_session(&fixture.storage).await;

    let request = post(
        json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}),
        Some(&session),
        "application/json",
    );
    let response = fixture.handler.handle(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], 1);
    assert_eq!(body["result"]["echoed"], "ping");
}

#[tokio::test]
async fn test_post_request_with_sse_accept_returns_202_and_routes_to_stream() {
    let fixture = fixture();
    let session = seeded_session(&fixture.storage).await;

    let request = post(
        json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call"}),
        Some(&session),
        "application/json, text/event-stream",
    );
    let response = fixture.handler.handle(request).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await, json!({}));

    // The reply lands in the event log for the (future) GET stream.
    let mut events = Vec::new();
    for _ in 0..50 {
        events = fixture.storage.events_after(&session, 0).await.unwrap();
        if !events.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].data["id"], 7);
    assert_eq!(events[0].data["result"]["echoed"], "tools/call");
}

#[tokio::test]
async fn test_notifications_only_returns_202() {
    let fixture = fixture();
    let session = seeded_session(&fixture.storage).await;

    let request = post(
        json!([{"jsonrpc": "2.0", "method": "notifications/initialized"}]),
        Some(&session),
        "application/json",
    );
    let response = fixture.handler.handle(request).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await, json!({}));
}

#[tokio::test]
async fn test_post_without_session_header_is_rejected() {
    let fixture = fixture();

    let request = post(
        json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}),
        None,
        "application/json",
    );
    let response = fixture.handler.handle(request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32600);
    assert_eq!(body["id"], 1);
}

#[tokio::test]
async fn test_initialize_without_header_mints_session() {
    let fixture = fixture();

    let request = post(
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize",
               "params": {"protocolVersion": "2025-06-18"}}),
        None,
        "application/json",
    );
    let response = fixture.handler.handle(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let minted = response
        .headers()
        .get("mcp-session-id")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .expect("session header");
    assert!(fixture.storage.load(&minted).await.unwrap().found().is_some());
}

#[tokio::test]
async fn test_malformed_json_returns_parse_error() {
    let fixture = fixture();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/mcp")
        .header("accept", "application/json")
        .body(Full::new(Bytes::from_static(b"{nope")))
        .unwrap();

    let response = fixture.handler.handle(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["id"], Value::Null);
}

#[tokio::test]
async fn test_batch_inline_responses_preserve_order() {
    let fixture = fixture();
    let session = seeded_session(&fixture.storage).await;

    let request = post(
        json!([
            {"jsonrpc": "2.0", "id": 1, "method": "ping"},
            {"jsonrpc": "2.0", "method": "notifications/progress"},
            {"jsonrpc": "2.0", "id": 2, "method": "tools/list"}
        ]),
        Some(&session),
        "application/json",
    );
    let response = fixture.handler.handle(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let replies = body.as_array().unwrap();
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0]["id"], 1);
    assert_eq!(replies[1]["id"], 2);
}

#[tokio::test]
async fn test_get_without_event_stream_accept_is_406() {
    let fixture = fixture();
    let request = Request::builder()
        .method(Method::GET)
        .uri("/mcp")
        .header("accept", "application/json")
        .header("mcp-session-id", "whatever")
        .body(Full::new(Bytes::new()))
        .unwrap();

    let response = fixture.handler.handle(request).await;
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn test_get_opens_stream_with_sse_headers() {
    let fixture = fixture();
    let session = seeded_session(&fixture.storage).await;

    let request = Request::builder()
        .method(Method::GET)
        .uri("/mcp")
        .header("accept", "text/event-stream")
        .header("mcp-session-id", &session)
        .body(Full::new(Bytes::new()))
        .unwrap();

    let response = fixture.handler.handle(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );
    assert!(fixture.stream_manager.has_writer(&session).await);
}

#[tokio::test]
async fn test_delete_tears_down_session_and_writer() {
    let fixture = fixture();
    let session = seeded_session(&fixture.storage).await;

    // Open a stream first so there is a writer to clean up.
    let get = Request::builder()
        .method(Method::GET)
        .uri("/mcp")
        .header("accept", "text/event-stream")
        .header("mcp-session-id", &session)
        .body(Full::new(Bytes::new()))
        .unwrap();
    let _stream = fixture.handler.handle(get).await;

    let delete = Request::builder()
        .method(Method::DELETE)
        .uri("/mcp")
        .header("mcp-session-id", &session)
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = fixture.handler.handle(delete).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({}));
    assert!(!fixture.stream_manager.has_writer(&session).await);
    assert!(fixture.storage.load(&session).await.unwrap().found().is_none());

    // Subsequent POST against the dead session fails with a
    // method-not-found-class error.
    let request = post(
        json!({"jsonrpc": "2.0", "id": 9, "method": "ping"}),
        Some(&session),
        "application/json",
    );
    let response = fixture.handler.handle(request).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32601);
}

#[tokio::test]
async fn test_unknown_http_method_is_405() {
    let fixture = fixture();
    let request = Request::builder()
        .method(Method::PUT)
        .uri("/mcp")
        .body(Full::new(Bytes::new()))
        .unwrap();

    let response = fixture.handler.handle(request).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], -32601);
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let fixture = fixture();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/other")
        .header("accept", "application/json")
        .body(Full::new(Bytes::new()))
        .unwrap();

    let response = fixture.handler.handle(request).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
