//! Request builders and result helpers on top of `rust_mcp_schema`.
//!
//! Envelopes and payloads come from the schema crate; this module only
//! assembles the few requests Relaybot sends and flattens tool results.

use rust_mcp_schema::schema_utils::{
    ClientMessage, FromMessage, MessageFromClient, NotificationFromClient, RequestFromClient,
};
use rust_mcp_schema::{
    CallToolRequestParams, CallToolResult, ClientCapabilities, ContentBlock, Implementation,
    InitializeRequestParams, PaginatedRequestParams, RequestId, RpcError, Tool,
    LATEST_PROTOCOL_VERSION,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::McpError;

pub const CLIENT_NAME: &str = "relaybot";

pub fn initialize_request() -> RequestFromClient {
    RequestFromClient::InitializeRequest(InitializeRequestParams {
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: CLIENT_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: Some("Relaybot".to_string()),
            description: None,
            icons: Vec::new(),
            website_url: None,
        },
        meta: None,
        protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
    })
}

pub fn list_tools_request(cursor: Option<String>) -> RequestFromClient {
    RequestFromClient::ListToolsRequest(cursor.map(|cursor| PaginatedRequestParams {
        cursor: Some(cursor),
        meta: None,
    }))
}

/// Non-object arguments are sent as no arguments at all.
pub fn call_tool_request(name: &str, arguments: Value) -> RequestFromClient {
    let mut params = CallToolRequestParams::new(name);
    if let Value::Object(arguments) = arguments {
        params = params.with_arguments(arguments);
    }
    RequestFromClient::CallToolRequest(params)
}

/// Wire form of a client request with numeric id `id`.
pub fn encode_request(id: i64, request: RequestFromClient) -> Result<Value, McpError> {
    encode(MessageFromClient::RequestFromClient(request), Some(RequestId::Integer(id)))
}

pub fn encode_notification(notification: NotificationFromClient) -> Result<Value, McpError> {
    encode(MessageFromClient::NotificationFromClient(notification), None)
}

pub fn encode_error(id: RequestId, error: RpcError) -> Result<Value, McpError> {
    encode(MessageFromClient::Error(error), Some(id))
}

/// Empty result answering a server `ping`.
pub fn ping_reply(id: &RequestId) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": {} })
}

fn encode(message: MessageFromClient, id: Option<RequestId>) -> Result<Value, McpError> {
    let message = ClientMessage::from_message(message, id)
        .map_err(|e| McpError::Protocol(e.to_string()))?;
    serde_json::to_value(&message).map_err(|e| McpError::Protocol(e.to_string()))
}

/// Decode a response `result` into the payload type `method` returns.
pub fn parse_result<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, McpError> {
    serde_json::from_value(value)
        .map_err(|e| McpError::Protocol(format!("invalid {method} result: {e}")))
}

/// A tool's input schema as plain JSON.
pub fn tool_input_schema(tool: &Tool) -> Value {
    serde_json::to_value(&tool.input_schema).unwrap_or_else(|_| json!({ "type": "object" }))
}

/// Reading a `tools/call` result the way the model sees it.
pub trait ToolOutput {
    /// `text` blocks verbatim, other blocks as JSON, joined with newlines.
    /// With no content blocks, the structured content as JSON.
    fn to_text(&self) -> String;

    /// The server flagged the call as failed (`isError`).
    fn failed(&self) -> bool;
}

impl ToolOutput for CallToolResult {
    fn to_text(&self) -> String {
        if self.content.is_empty() {
            return self
                .structured_content
                .as_ref()
                .and_then(|structured| serde_json::to_string(structured).ok())
                .unwrap_or_default();
        }
        self.content
            .iter()
            .map(|block| match block {
                ContentBlock::TextContent(text) => text.text.clone(),
                other => serde_json::to_string(other).unwrap_or_default(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn failed(&self) -> bool {
        self.is_error.unwrap_or(false)
    }
}
