//! JSON-RPC client over one [`Transport`].
//!
//! A background reader task owns the receive side. Outgoing requests park a
//! oneshot sender under their id; the reader completes it when the matching
//! response arrives, so concurrent calls on one connection never mix results.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rust_mcp_schema::schema_utils::{
    NotificationFromClient, RequestFromClient, ServerJsonrpcRequest, ServerMessage,
};
use rust_mcp_schema::{CallToolResult, InitializeResult, ListToolsResult, RequestId, RpcError, Tool};
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use relaybot_core::config::TransportKind;

use crate::error::McpError;
use crate::protocol::{
    call_tool_request, encode_error, encode_notification, encode_request, initialize_request,
    list_tools_request, parse_result, ping_reply,
};
use crate::transport::Transport;

type Pending = Arc<Mutex<HashMap<RequestId, oneshot::Sender<Result<Value, McpError>>>>>;

pub struct McpClient {
    server: String,
    transport: Arc<dyn Transport>,
    pending: Pending,
    next_id: AtomicI64,
    alive: Arc<AtomicBool>,
    request_timeout: Duration,
    reader: JoinHandle<()>,
}

impl McpClient {
    /// Start the reader task. No messages are exchanged until [`initialize`](Self::initialize).
    pub fn start(server: &str, transport: Arc<dyn Transport>, request_timeout: Duration) -> Self {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let alive = Arc::new(AtomicBool::new(true));

        let reader = tokio::spawn(read_loop(
            server.to_string(),
            transport.clone(),
            pending.clone(),
            alive.clone(),
        ));

        Self {
            server: server.to_string(),
            transport,
            pending,
            next_id: AtomicI64::new(1),
            alive,
            request_timeout,
            reader,
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// False once the stream has ended or the client was closed.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// `initialize` handshake followed by `notifications/initialized`.
    pub async fn initialize(&self) -> Result<InitializeResult, McpError> {
        let value = self.request(initialize_request()).await?;
        let result: InitializeResult = parse_result("initialize", value)?;
        self.notify(NotificationFromClient::InitializedNotification(None))
            .await?;

        debug!(
            server = %self.server,
            server_name = %result.server_info.name,
            protocol = %result.protocol_version,
            "Tool-server initialized"
        );
        Ok(result)
    }

    /// Every tool the server advertises, following pagination cursors.
    pub async fn list_tools(&self) -> Result<Vec<Tool>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let value = self.request(list_tools_request(cursor.clone())).await?;
            let page: ListToolsResult = parse_result("tools/list", value)?;

            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                _ => break,
            }
        }

        Ok(tools)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        let value = self.request(call_tool_request(name, arguments)).await?;
        parse_result("tools/call", value)
    }

    /// Send a request and wait for its `result`, bounded by the request timeout.
    pub async fn request(&self, request: RequestFromClient) -> Result<Value, McpError> {
        if !self.is_alive() {
            return Err(McpError::Closed(self.server.clone()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = encode_request(id, request)?;
        let method = message
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let key = RequestId::Integer(id);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(key.clone(), tx);
        // The reader may have drained `pending` between the check above and the insert.
        if !self.is_alive() {
            self.pending.lock().await.remove(&key);
            return Err(McpError::Closed(self.server.clone()));
        }

        if let Err(e) = self.transport.send(&message).await {
            self.pending.lock().await.remove(&key);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(McpError::Closed(self.server.clone())),
            Err(_) => {
                self.pending.lock().await.remove(&key);
                Err(McpError::Timeout {
                    method,
                    secs: self.request_timeout.as_secs(),
                })
            }
        }
    }

    pub async fn notify(&self, notification: NotificationFromClient) -> Result<(), McpError> {
        let message = encode_notification(notification)?;
        self.transport.send(&message).await
    }

    /// Close the transport and fail every outstanding request.
    pub async fn close(&self) -> Result<(), McpError> {
        self.alive.store(false, Ordering::SeqCst);
        let result = self.transport.close().await;
        self.reader.abort();
        fail_pending(&self.server, &self.pending).await;
        result
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    server: String,
    transport: Arc<dyn Transport>,
    pending: Pending,
    alive: Arc<AtomicBool>,
) {
    loop {
        let value = match transport.receive().await {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!(server = %server, "Tool-server stream ended");
                break;
            }
            Err(e) => {
                warn!(server = %server, error = %e, "Tool-server receive failed");
                break;
            }
        };

        let message = match serde_json::from_value::<ServerMessage>(value) {
            Ok(message) => message,
            Err(e) => {
                warn!(server = %server, error = %e, "Unparseable message");
                continue;
            }
        };

        match message {
            ServerMessage::Response(response) => {
                let result = serde_json::to_value(&response.result)
                    .map_err(|e| McpError::Protocol(e.to_string()));
                complete(&server, &pending, &response.id, result).await;
            }
            ServerMessage::Error(error) => {
                let Some(id) = error.id.as_ref() else {
                    warn!(server = %server, code = error.error.code, message = %error.error.message, "Error without id");
                    continue;
                };
                let failure = McpError::Server {
                    code: error.error.code,
                    message: error.error.message.clone(),
                };
                complete(&server, &pending, id, Err(failure)).await;
            }
            ServerMessage::Request(request) => {
                answer_server_request(&server, transport.as_ref(), &request).await;
            }
            ServerMessage::Notification(_) => {
                debug!(server = %server, "Server notification");
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
    fail_pending(&server, &pending).await;
}

async fn complete(server: &str, pending: &Pending, id: &RequestId, result: Result<Value, McpError>) {
    match pending.lock().await.remove(id) {
        Some(tx) => {
            let _ = tx.send(result);
        }
        None => debug!(server = %server, id = ?id, "Late response dropped"),
    }
}

/// Servers may ping; everything else they ask for is unsupported.
async fn answer_server_request(server: &str, transport: &dyn Transport, request: &ServerJsonrpcRequest) {
    let id = request.request_id().clone();
    let reply = if request.method() == "ping" {
        Ok(ping_reply(&id))
    } else {
        let reason = format!("method not supported: {}", request.method());
        encode_error(id, RpcError::method_not_found().with_message(&reason))
    };

    match reply {
        Ok(value) => {
            if let Err(e) = transport.send(&value).await {
                warn!(server = %server, error = %e, "Failed to answer server request");
            }
        }
        Err(e) => warn!(server = %server, error = %e, "Failed to encode response"),
    }
}

async fn fail_pending(server: &str, pending: &Pending) {
    for (_, tx) in pending.lock().await.drain() {
        let _ = tx.send(Err(McpError::Closed(server.to_string())));
    }
}
