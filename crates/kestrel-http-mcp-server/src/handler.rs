//! Request routing for the single MCP endpoint.

use std::sync::Arc;

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use serde_json::{Value, json};
use tracing::{debug, error, warn};

use kestrel_mcp_json_rpc::{CodecError, JsonRpcError, JsonRpcFrame, RequestId, decode};

use crate::config::ServerConfig;
use crate::context::RequestContext;
use crate::service::{McpService, ServiceError};
use crate::stream_manager::{StreamError, StreamManager};
use crate::BoxBody;

/// Routes POST/GET/DELETE on the MCP endpoint into the session layer.
#[derive(Clone)]
pub struct McpHttpHandler {
    config: Arc<ServerConfig>,
    service: Arc<dyn McpService>,
    stream_manager: Arc<StreamManager>,
}

impl McpHttpHandler {
    pub fn new(
        config: Arc<ServerConfig>,
        service: Arc<dyn McpService>,
        stream_manager: Arc<StreamManager>,
    ) -> Self {
        Self {
            config,
            service,
            stream_manager,
        }
    }

    pub fn stream_manager(&self) -> &Arc<StreamManager> {
        &self.stream_manager
    }

    /// Handle one HTTP request.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<BoxBody>
    where
        B: http_body::Body + Send + 'static,
        B::Data: Send,
        B::Error: std::fmt::Display,
    {
        if req.uri().path() != self.config.endpoint_path {
            return plain_response(StatusCode::NOT_FOUND, json!({"error": "unknown path"}), None);
        }

        let context = RequestContext::from_headers(req.headers(), &self.config.session_header);

        match req.method().as_str() {
            "POST" => self.handle_post(req, context).await,
            "GET" => self.handle_get(context).await,
            "DELETE" => self.handle_delete(context).await,
            _ => {
                let error = JsonRpcError::new(
                    None,
                    kestrel_mcp_json_rpc::JsonRpcErrorObject::method_not_found(
                        req.method().as_str(),
                    ),
                );
                error_response(StatusCode::METHOD_NOT_ALLOWED, error, context.session_id.as_deref())
            }
        }
    }

    /// POST: inbound JSON-RPC, single message or batch.
    async fn handle_post<B>(&self, req: Request<B>, context: RequestContext) -> Response<BoxBody>
    where
        B: http_body::Body + Send + 'static,
        B::Data: Send,
        B::Error: std::fmt::Display,
    {
        if !context.accepts_json {
            let error = JsonRpcError::invalid_request(None);
            return error_response(StatusCode::BAD_REQUEST, error, context.session_id.as_deref());
        }

        let body = match tokio::time::timeout(
            self.config.request_timeout,
            req.into_body().collect(),
        )
        .await
        {
            Ok(Ok(collected)) => collected.to_bytes(),
            Ok(Err(err)) => {
                warn!(error = %err, "failed to read POST body");
                return error_response(
                    StatusCode::BAD_REQUEST,
                    JsonRpcError::parse_error(),
                    context.session_id.as_deref(),
                );
            }
            Err(_) => {
                warn!("POST body read timed out");
                return error_response(
                    StatusCode::BAD_REQUEST,
                    JsonRpcError::parse_error(),
                    context.session_id.as_deref(),
                );
            }
        };

        let text = String::from_utf8_lossy(&body);
        let is_batch = text.trim_start().starts_with('[');
        let frames = match decode(&text) {
            Ok(frames) => frames,
            Err(CodecError::Parse(err)) => {
                debug!(error = %err, "malformed POST payload");
                return error_response(
                    StatusCode::BAD_REQUEST,
                    JsonRpcError::parse_error(),
                    context.session_id.as_deref(),
                );
            }
            Err(CodecError::InvalidFrame { id, reason }) => {
                debug!(reason, "invalid frame in POST payload");
                return error_response(
                    StatusCode::BAD_REQUEST,
                    JsonRpcError::invalid_request(id),
                    context.session_id.as_deref(),
                );
            }
        };

        let contains_initialize = frames.iter().any(JsonRpcFrame::is_initialize);
        if !contains_initialize && context.session_id.is_none() {
            let error = JsonRpcError::new(
                best_known_id(&frames),
                kestrel_mcp_json_rpc::JsonRpcErrorObject::invalid_request(Some(
                    json!({"reason": "missing session header"}),
                )),
            );
            return error_response(StatusCode::BAD_REQUEST, error, None);
        }

        let session_id = match self
            .service
            .resolve_session(contains_initialize, context.session_id.as_deref())
            .await
        {
            Ok(id) => id,
            Err(err) => return self.service_error_response(err, best_known_id(&frames)),
        };

        let has_requests = frames.iter().any(JsonRpcFrame::is_request);

        if !has_requests {
            // Notifications (and client replies to server requests) only.
            for frame in frames {
                if let Err(err) = self
                    .service
                    .handle_frame(&session_id, frame, context.bearer_token.as_deref())
                    .await
                {
                    warn!(session_id, error = %err, "notification handling failed");
                }
            }
            return plain_response(StatusCode::ACCEPTED, json!({}), Some(&session_id));
        }

        if context.accepts_sse {
            // Reply goes out over the session's SSE stream; acknowledge now.
            let service = Arc::clone(&self.service);
            let stream_manager = Arc::clone(&self.stream_manager);
            let bearer = context.bearer_token.clone();
            let background_session = session_id.clone();

            tokio::spawn(async move {
                for frame in frames {
                    match service
                        .handle_frame(&background_session, frame, bearer.as_deref())
                        .await
                    {
                        Ok(Some(reply)) => {
                            let data = match serde_json::to_value(&reply) {
                                Ok(data) => data,
                                Err(err) => {
                                    error!(session_id = %background_session, error = %err, "reply serialization failed");
                                    continue;
                                }
                            };
                            if let Err(err) =
                                stream_manager.send_message(&background_session, data).await
                            {
                                warn!(session_id = %background_session, error = %err, "SSE routing failed");
                            }
                        }
                        Ok(None) => {}
                        Err(err) => {
                            warn!(session_id = %background_session, error = %err, "background dispatch failed");
                        }
                    }
                }
            });

            return plain_response(StatusCode::ACCEPTED, json!({}), Some(&session_id));
        }

        // Inline JSON path.
        let mut replies = Vec::new();
        for frame in frames {
            match self
                .service
                .handle_frame(&session_id, frame, context.bearer_token.as_deref())
                .await
            {
                Ok(Some(reply)) => match serde_json::to_value(&reply) {
                    Ok(value) => replies.push(value),
                    Err(err) => {
                        error!(session_id, error = %err, "reply serialization failed");
                    }
                },
                Ok(None) => {}
                Err(err) => return self.service_error_response(err, None),
            }
        }

        let payload = if is_batch {
            Value::Array(replies)
        } else {
            replies.into_iter().next().unwrap_or(json!({}))
        };
        plain_response(StatusCode::OK, payload, Some(&session_id))
    }

    /// GET: open the session's SSE stream.
    async fn handle_get(&self, context: RequestContext) -> Response<BoxBody> {
        if !context.accepts_sse {
            return plain_response(
                StatusCode::NOT_ACCEPTABLE,
                json!({"error": "Accept must include text/event-stream"}),
                context.session_id.as_deref(),
            );
        }

        let Some(session_id) = context.session_id else {
            return plain_response(
                StatusCode::BAD_REQUEST,
                json!({"error": "missing session header"}),
                None,
            );
        };

        match self
            .stream_manager
            .open_stream(&session_id, context.last_event_id)
            .await
        {
            Ok(mut response) => {
                if let Ok(value) = session_id.parse() {
                    response.headers_mut().insert("mcp-session-id", value);
                }
                response
            }
            Err(StreamError::SessionNotFound(_)) => plain_response(
                StatusCode::NOT_FOUND,
                json!({"error": "unknown session"}),
                Some(&session_id),
            ),
            Err(err) => {
                error!(session_id, error = %err, "failed to open SSE stream");
                plain_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": "stream setup failed"}),
                    Some(&session_id),
                )
            }
        }
    }

    /// DELETE: explicit session termination.
    async fn handle_delete(&self, context: RequestContext) -> Response<BoxBody> {
        let Some(session_id) = context.session_id else {
            return plain_response(
                StatusCode::BAD_REQUEST,
                json!({"error": "missing session header"}),
                None,
            );
        };

        self.stream_manager.unregister(&session_id).await;
        match self.service.terminate_session(&session_id).await {
            Ok(()) => plain_response(StatusCode::OK, json!({}), Some(&session_id)),
            Err(err) => self.service_error_response(err, None),
        }
    }

    fn service_error_response(
        &self,
        err: ServiceError,
        id: Option<RequestId>,
    ) -> Response<BoxBody> {
        match err {
            ServiceError::UnknownSession(session_id) => {
                debug!(session_id, "request against unknown session");
                let error = JsonRpcError::new(
                    id,
                    kestrel_mcp_json_rpc::JsonRpcErrorObject::method_not_found("session"),
                );
                error_response(StatusCode::NOT_FOUND, error, None)
            }
            ServiceError::Overloaded(session_id) => {
                warn!(session_id, "session mailbox saturated; shedding load");
                plain_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({"error": "server overloaded, retry later"}),
                    None,
                )
            }
            ServiceError::Internal(message) => {
                error!(message, "service failure");
                let error = JsonRpcError::internal_error(id, Some(message));
                error_response(StatusCode::INTERNAL_SERVER_ERROR, error, None)
            }
        }
    }
}

fn best_known_id(frames: &[JsonRpcFrame]) -> Option<RequestId> {
    frames.iter().find_map(|frame| frame.id().cloned())
}

fn plain_response(
    status: StatusCode,
    payload: Value,
    session_id: Option<&str>,
) -> Response<BoxBody> {
    let body = Full::new(Bytes::from(payload.to_string())).boxed_unsync();
    let mut builder = Response::builder()
        .status(status)
        .header("content-type", "application/json");
    if let Some(session_id) = session_id {
        builder = builder.header("mcp-session-id", session_id);
    }
    builder.body(body).expect("static response headers are valid")
}

fn error_response(
    status: StatusCode,
    error: JsonRpcError,
    session_id: Option<&str>,
) -> Response<BoxBody> {
    let payload = serde_json::to_value(&error).unwrap_or_else(|_| {
        json!({"jsonrpc": "2.0", "id": null, "error": {"code": -32603, "message": "Internal error"}})
    });
    plain_response(status, payload, session_id)
}
