//! Event-stream transport.
//!
//! The client opens a long-lived `GET` on `baseUrl` that answers with
//! `text/event-stream`. The first `endpoint` event names the URL requests are
//! POSTed to; every later `message` event carries one JSON-RPC message.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Url;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use relaybot_core::config::{McpServerConfig, TransportKind};

use super::Transport;
use crate::error::McpError;

pub struct SseTransport {
    server: String,
    client: reqwest::Client,
    endpoint: Url,
    headers: HeaderMap,
    inbox: Mutex<mpsc::UnboundedReceiver<Value>>,
    reader: JoinHandle<()>,
}

impl SseTransport {
    /// Open the event stream and wait (up to `timeout`) for the `endpoint` event.
    pub async fn connect(
        server: &str,
        config: &McpServerConfig,
        timeout: Duration,
    ) -> Result<Self, McpError> {
        let base_url = config.base_url.as_deref().ok_or_else(|| McpError::Config {
            server: server.to_string(),
            reason: "sse transport requires `baseUrl`".into(),
        })?;
        let base = Url::parse(base_url).map_err(|e| McpError::Config {
            server: server.to_string(),
            reason: format!("invalid baseUrl '{base_url}': {e}"),
        })?;

        let mut headers = HeaderMap::new();
        for (key, value) in config.header_pairs() {
            match (HeaderName::from_bytes(key.as_bytes()), HeaderValue::from_str(&value)) {
                (Ok(name), Ok(val)) => {
                    headers.insert(name, val);
                }
                _ => warn!(server = %server, header = %key, "Skipping invalid header"),
            }
        }

        let client = reqwest::Client::new();
        let response = client
            .get(base.clone())
            .headers(headers.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| McpError::connection(server, e))?;

        if !response.status().is_success() {
            return Err(McpError::connection(
                server,
                format!("event stream returned {}", response.status()),
            ));
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !is_event_stream_content_type(content_type) {
            return Err(McpError::connection(
                server,
                format!("expected text/event-stream, got '{content_type}'"),
            ));
        }

        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let reader = tokio::spawn(read_events(
            server.to_string(),
            response,
            endpoint_tx,
            inbox_tx,
        ));

        let endpoint = match tokio::time::timeout(timeout, endpoint_rx).await {
            Ok(Ok(path)) => base.join(&path).map_err(|e| {
                McpError::Protocol(format!("invalid endpoint '{path}': {e}"))
            }),
            Ok(Err(_)) => Err(McpError::connection(server, "stream ended before endpoint event")),
            Err(_) => Err(McpError::Timeout {
                method: "endpoint".into(),
                secs: timeout.as_secs(),
            }),
        };
        let endpoint = match endpoint {
            Ok(url) => url,
            Err(e) => {
                reader.abort();
                return Err(e);
            }
        };

        debug!(server = %server, endpoint = %endpoint, "Event stream connected");

        Ok(Self {
            server: server.to_string(),
            client,
            endpoint,
            headers,
            inbox: Mutex::new(inbox_rx),
            reader,
        })
    }

    /// The URL requests are POSTed to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn send(&self, message: &Value) -> Result<(), McpError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .json(message)
            .send()
            .await
            .map_err(|e| McpError::connection(&self.server, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::connection(
                &self.server,
                format!("POST returned {status}: {body}"),
            ));
        }
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Value>, McpError> {
        Ok(self.inbox.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), McpError> {
        self.reader.abort();
        Ok(())
    }

    fn kind(&self) -> TransportKind {
        TransportKind::EventStream
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Pump the event stream until it ends.
async fn read_events(
    server: String,
    response: reqwest::Response,
    endpoint_tx: oneshot::Sender<String>,
    inbox: mpsc::UnboundedSender<Value>,
) {
    let mut stream = response.bytes_stream();
    let mut lines = SseLineBuffer::default();
    let mut decoder = SseEventDecoder::default();
    let mut endpoint_tx = Some(endpoint_tx);

    let mut dispatch = |event: SseEvent| match event.name.as_str() {
        "endpoint" => {
            if let Some(tx) = endpoint_tx.take() {
                let _ = tx.send(event.data.trim().to_string());
            }
        }
        "message" => match serde_json::from_str::<Value>(&event.data) {
            Ok(value) => {
                let _ = inbox.send(value);
            }
            Err(e) => warn!(server = %server, error = %e, "Dropping malformed event payload"),
        },
        other => debug!(server = %server, event = %other, "Ignoring event"),
    };

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(server = %server, error = %e, "Event stream failed");
                break;
            }
        };
        for line in lines.push(&chunk) {
            if let Some(event) = decoder.feed(&line) {
                dispatch(event);
            }
        }
    }
    for line in lines.finish() {
        if let Some(event) = decoder.feed(&line) {
            dispatch(event);
        }
    }
    if let Some(event) = decoder.finish() {
        dispatch(event);
    }
    debug!(server = %server, "Event stream ended");
}

pub fn is_event_stream_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(str::trim)
        .is_some_and(|value| value.eq_ignore_ascii_case("text/event-stream"))
}

/// Splits a byte stream into lines across chunk boundaries. Line endings
/// (`\n` or `\r\n`) are removed; blank lines are kept because they end events.
#[derive(Default)]
pub struct SseLineBuffer {
    buffer: Vec<u8>,
}

impl SseLineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        self.drain_lines(false)
    }

    pub fn finish(&mut self) -> Vec<String> {
        self.drain_lines(true)
    }

    fn drain_lines(&mut self, flush: bool) -> Vec<String> {
        let mut lines = Vec::new();
        let mut start = 0;

        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let newline = start + offset;
            push_line(&mut lines, &self.buffer[start..newline]);
            start = newline + 1;
        }

        if flush {
            if start < self.buffer.len() {
                push_line(&mut lines, &self.buffer[start..]);
            }
            self.buffer.clear();
        } else if start > 0 {
            self.buffer.drain(..start);
        }

        lines
    }
}

fn push_line(lines: &mut Vec<String>, bytes: &[u8]) {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => lines.push(text.to_string()),
        Err(e) => warn!(error = %e, "Dropping non-UTF-8 event line"),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub name: String,
    pub data: String,
}

/// Assembles lines into events. `data:` lines accumulate until a blank line
/// and are joined with `\n`; an event without an `event:` field is a
/// `message`. Comments and other fields are ignored.
#[derive(Default)]
pub struct SseEventDecoder {
    name: Option<String>,
    data: Vec<String>,
}

impl SseEventDecoder {
    pub fn feed(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.name = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    /// Dispatch whatever is buffered when the stream ends without a
    /// trailing blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        self.dispatch()
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let name = self.name.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            name: name.filter(|n| !n.is_empty()).unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}
