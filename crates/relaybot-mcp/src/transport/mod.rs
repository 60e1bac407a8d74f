//! Transports carry JSON-RPC messages between Relaybot and one tool-server.
//!
//! - [`stdio::StdioTransport`]: child process, newline-delimited JSON on stdin/stdout
//! - [`sse::SseTransport`]: server-sent event stream for replies, HTTP POST for requests

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use relaybot_core::config::{McpServerConfig, TransportKind};

use crate::error::McpError;

pub mod sse;
pub mod stdio;

pub use sse::SseTransport;
pub use stdio::StdioTransport;

/// One bidirectional message channel to a tool-server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Write one JSON-RPC message.
    async fn send(&self, message: &Value) -> Result<(), McpError>;

    /// Next JSON-RPC message from the server; `None` once the stream ends.
    async fn receive(&self) -> Result<Option<Value>, McpError>;

    /// Release the underlying process or stream. Idempotent.
    async fn close(&self) -> Result<(), McpError>;

    fn kind(&self) -> TransportKind;
}

/// Opens transports. The manager takes this as a seam so tests can connect
/// to in-memory servers.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn open(&self, server: &str, config: &McpServerConfig)
        -> Result<Arc<dyn Transport>, McpError>;
}

/// Check the fields each transport kind requires before anything is spawned.
pub fn validate_config(server: &str, config: &McpServerConfig) -> Result<(), McpError> {
    let missing = |field: &str| McpError::Config {
        server: server.to_string(),
        reason: format!("{} transport requires `{}`", config.kind, field),
    };
    match config.kind {
        TransportKind::Pipe => {
            if config.command.as_deref().map_or(true, |c| c.trim().is_empty()) {
                return Err(missing("command"));
            }
        }
        TransportKind::EventStream => {
            if config.base_url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                return Err(missing("baseUrl"));
            }
        }
    }
    Ok(())
}

/// Opens real child processes and SSE streams.
#[derive(Debug, Clone)]
pub struct DefaultTransportFactory {
    /// Bounds the wait for the SSE `endpoint` event.
    connect_timeout: Duration,
}

impl DefaultTransportFactory {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for DefaultTransportFactory {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl TransportFactory for DefaultTransportFactory {
    async fn open(
        &self,
        server: &str,
        config: &McpServerConfig,
    ) -> Result<Arc<dyn Transport>, McpError> {
        validate_config(server, config)?;
        match config.kind {
            TransportKind::Pipe => Ok(Arc::new(StdioTransport::spawn(server, config)?)),
            TransportKind::EventStream => Ok(Arc::new(
                SseTransport::connect(server, config, self.connect_timeout).await?,
            )),
        }
    }
}

// ─── In-memory server for tests ─────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use serde_json::json;
    use tokio::sync::{mpsc, Mutex};

    use rust_mcp_schema::LATEST_PROTOCOL_VERSION;

    fn success(id: Value, result: Value) -> Value {
        json!({ "jsonrpc": "2.0", "id": id, "result": result })
    }

    fn failure(id: Value, code: i64, message: impl Into<String>) -> Value {
        json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message.into() } })
    }

    /// Scripted tool-server behaviour shared by every transport opened to it.
    ///
    /// Tools: `echo` returns its arguments as text, `mixed` returns a text and
    /// an image block, `boom` returns `isError`, `hang` never answers and
    /// `crash` ends the stream.
    #[derive(Default)]
    pub struct MockServer {
        pub tools: StdMutex<Vec<Value>>,
        pub fail_list: AtomicBool,
        pub fail_initialize: AtomicBool,
        pub calls: AtomicUsize,
        pub closed: AtomicUsize,
    }

    impl MockServer {
        pub fn with_tools(names: &[&str]) -> Arc<Self> {
            let server = Self::default();
            server.set_tools(names);
            Arc::new(server)
        }

        pub fn set_tools(&self, names: &[&str]) {
            let tools = names
                .iter()
                .map(|name| {
                    json!({
                        "name": name,
                        "description": format!("{name} tool"),
                        "inputSchema": {
                            "type": "object",
                            "properties": { "x": { "type": "integer", "default": 1 } }
                        }
                    })
                })
                .collect();
            if let Ok(mut guard) = self.tools.lock() {
                *guard = tools;
            }
        }

        fn respond(&self, id: Value, method: &str, params: Option<Value>) -> Option<Value> {
            let response = match method {
                "initialize" if self.fail_initialize.load(Ordering::SeqCst) => {
                    failure(id, -32603, "init refused")
                }
                "initialize" => success(
                    id,
                    json!({
                        "protocolVersion": LATEST_PROTOCOL_VERSION,
                        "capabilities": { "tools": {} },
                        "serverInfo": { "name": "mock", "version": "0.0.0" }
                    }),
                ),
                "tools/list" if self.fail_list.load(Ordering::SeqCst) => {
                    failure(id, -32603, "listing failed")
                }
                "tools/list" => {
                    let tools = self.tools.lock().map(|t| t.clone()).unwrap_or_default();
                    success(id, json!({ "tools": tools }))
                }
                "tools/call" => {
                    self.calls.fetch_add(1, Ordering::SeqCst);
                    let params = params.unwrap_or_default();
                    let args = params.get("arguments").cloned().unwrap_or_default();
                    match params.get("name").and_then(Value::as_str).unwrap_or_default() {
                        "echo" => success(
                            id,
                            json!({ "content": [{ "type": "text", "text": args.to_string() }] }),
                        ),
                        "mixed" => success(
                            id,
                            json!({ "content": [
                                { "type": "text", "text": "caption" },
                                { "type": "image", "data": "aGk=", "mimeType": "image/png" }
                            ] }),
                        ),
                        "boom" => success(
                            id,
                            json!({ "content": [{ "type": "text", "text": "boom" }], "isError": true }),
                        ),
                        "hang" | "crash" => return None,
                        other => failure(id, -32602, format!("no tool {other}")),
                    }
                }
                _ => failure(id, -32601, "method not found"),
            };
            Some(response)
        }
    }

    pub struct MockTransport {
        server: Arc<MockServer>,
        tx: mpsc::UnboundedSender<Value>,
        rx: Mutex<mpsc::UnboundedReceiver<Value>>,
        closed: AtomicBool,
    }

    impl MockTransport {
        pub fn new(server: Arc<MockServer>) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            Self {
                server,
                tx,
                rx: Mutex::new(rx),
                closed: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, message: &Value) -> Result<(), McpError> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(McpError::connection("mock", "closed"));
            }
            let method = message.get("method").and_then(Value::as_str).unwrap_or_default();
            let Some(id) = message.get("id").cloned() else {
                return Ok(()); // notification
            };
            let is_crash = method == "tools/call"
                && message.pointer("/params/name").and_then(Value::as_str) == Some("crash");
            if is_crash {
                // Null marks end-of-stream for `receive`.
                let _ = self.tx.send(Value::Null);
                return Ok(());
            }
            if let Some(reply) = self.server.respond(id, method, message.get("params").cloned()) {
                let _ = self.tx.send(reply);
            }
            Ok(())
        }

        async fn receive(&self) -> Result<Option<Value>, McpError> {
            let mut rx = self.rx.lock().await;
            match rx.recv().await {
                Some(Value::Null) | None => Ok(None),
                Some(value) => Ok(Some(value)),
            }
        }

        async fn close(&self) -> Result<(), McpError> {
            if !self.closed.swap(true, Ordering::SeqCst) {
                self.server.closed.fetch_add(1, Ordering::SeqCst);
                let _ = self.tx.send(Value::Null);
            }
            Ok(())
        }

        fn kind(&self) -> TransportKind {
            TransportKind::Pipe
        }
    }

    /// Factory resolving server names to [`MockServer`]s; unknown names fail
    /// to connect.
    #[derive(Default)]
    pub struct MockFactory {
        pub servers: StdMutex<HashMap<String, Arc<MockServer>>>,
        pub opened: AtomicUsize,
    }

    impl MockFactory {
        pub fn with(servers: &[(&str, Arc<MockServer>)]) -> Arc<Self> {
            let factory = Self::default();
            if let Ok(mut map) = factory.servers.lock() {
                for (name, server) in servers {
                    map.insert(name.to_string(), server.clone());
                }
            }
            Arc::new(factory)
        }
    }

    #[async_trait]
    impl TransportFactory for MockFactory {
        async fn open(
            &self,
            server: &str,
            _config: &McpServerConfig,
        ) -> Result<Arc<dyn Transport>, McpError> {
            let found = self.servers.lock().ok().and_then(|m| m.get(server).cloned());
            match found {
                Some(mock) => {
                    self.opened.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(MockTransport::new(mock)))
                }
                None => Err(McpError::connection(server, "connection refused")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(kind: TransportKind) -> McpServerConfig {
        McpServerConfig {
            enabled: true,
            kind,
            ..Default::default()
        }
    }

    #[test]
    fn test_pipe_requires_command() {
        let err = validate_config("fs", &config(TransportKind::Pipe)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid config for server 'fs': stdio transport requires `command`"
        );

        let mut cfg = config(TransportKind::Pipe);
        cfg.command = Some("npx".into());
        assert!(validate_config("fs", &cfg).is_ok());
    }

    #[test]
    fn test_event_stream_requires_base_url() {
        let mut cfg = config(TransportKind::EventStream);
        cfg.command = Some("ignored".into());
        let err = validate_config("web", &cfg).unwrap_err();
        assert!(err.to_string().contains("`baseUrl`"));

        cfg.base_url = Some("http://localhost:9000/sse".into());
        assert!(validate_config("web", &cfg).is_ok());
    }

    #[tokio::test]
    async fn test_default_factory_fails_fast_without_command() {
        let factory = DefaultTransportFactory::default();
        let err = factory.open("fs", &config(TransportKind::Pipe)).await.err().unwrap();
        assert!(matches!(err, McpError::Config { .. }));
    }
}
