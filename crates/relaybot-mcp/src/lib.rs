//! Remote tool-servers for Relaybot.
//!
//! # Architecture
//!
//! - [`protocol`]: request builders and tool-result helpers over `rust_mcp_schema`
//! - [`transport`]: [`Transport`] trait with pipe (child process) and SSE implementations
//! - [`client::McpClient`]: request/response correlation over one transport
//! - [`manager::McpManager`]: connection registry and remote tool index

pub mod client;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod transport;

pub use client::McpClient;
pub use error::McpError;
pub use manager::{
    is_remote_tool, real_tool_name, remote_tool_name, BatchResult, ConnectionState, HealthReport,
    HealthStatus, McpManager, PromptContext, RemoteTool, ServerHealth, ServerInfo,
    REMOTE_TOOL_PREFIX,
};
pub use protocol::ToolOutput;
pub use rust_mcp_schema::CallToolResult;
pub use transport::{DefaultTransportFactory, Transport, TransportFactory};
